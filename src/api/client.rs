use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::api::ApiState;
use crate::replication::{HealthSnapshot, NodeError};
use crate::store::VectorClock;
use crate::util::{OpKind, Operation, ReplicateAck};

pub struct RouterBuilder;

impl RouterBuilder {
    pub fn with_state(state: ApiState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/alumnos", post(create_record).get(list_records))
            .route("/alumnos/:key", put(update_record).get(get_record))
            .route("/replicate", post(replicate))
            .route("/log", get(view_log))
            .route("/queue", get(view_queue))
            .route("/ping", get(ping))
            .route("/metrics", get(metrics))
            .with_state(state)
    }
}

#[derive(Deserialize)]
pub struct CreateBody {
    pub key: String,
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
pub struct UpdateBody {
    pub payload: serde_json::Value,
}

#[derive(Serialize)]
pub struct WriteResp {
    pub key: String,
    pub vc: VectorClock,
}

#[derive(Serialize)]
struct RecordResp {
    key: String,
    payload: serde_json::Value,
    vc_written: VectorClock,
}

#[derive(Serialize)]
struct ListResp {
    node_id: String,
    total: usize,
    records: Vec<RecordResp>,
}

#[derive(Serialize)]
struct LogResp {
    node_id: String,
    log_size: usize,
    log: Vec<Operation>,
}

#[derive(Serialize)]
struct QueueResp {
    node_id: String,
    queue_size: usize,
    queue: Vec<Operation>,
}

async fn health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.node.health().await)
}

async fn create_record(
    State(state): State<ApiState>,
    Json(body): Json<CreateBody>,
) -> Result<Json<WriteResp>, NodeError> {
    match state
        .node
        .local_write(OpKind::Create, body.key, body.payload)
        .await
    {
        Ok(receipt) => {
            state.metrics.writes.with_label_values(&["create"]).inc();
            state.metrics.requests.with_label_values(&["POST", "/alumnos", "200"]).inc();
            Ok(Json(WriteResp {
                key: receipt.key,
                vc: receipt.vc,
            }))
        }
        Err(err) => {
            state.metrics.errors.with_label_values(&[err.kind()]).inc();
            Err(err)
        }
    }
}

async fn update_record(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<WriteResp>, NodeError> {
    match state
        .node
        .local_write(OpKind::Update, key, body.payload)
        .await
    {
        Ok(receipt) => {
            state.metrics.writes.with_label_values(&["update"]).inc();
            state.metrics.requests.with_label_values(&["PUT", "/alumnos/:key", "200"]).inc();
            Ok(Json(WriteResp {
                key: receipt.key,
                vc: receipt.vc,
            }))
        }
        Err(err) => {
            state.metrics.errors.with_label_values(&[err.kind()]).inc();
            Err(err)
        }
    }
}

async fn get_record(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<RecordResp>, NodeError> {
    match state.node.record(&key).await {
        Some(record) => Ok(Json(RecordResp {
            key,
            payload: record.payload,
            vc_written: record.vc_written,
        })),
        None => {
            state.metrics.errors.with_label_values(&["not_found"]).inc();
            Err(NodeError::NotFound { key })
        }
    }
}

async fn list_records(State(state): State<ApiState>) -> Json<ListResp> {
    let records: Vec<RecordResp> = state
        .node
        .records()
        .await
        .into_iter()
        .map(|(key, record)| RecordResp {
            key,
            payload: record.payload,
            vc_written: record.vc_written,
        })
        .collect();
    Json(ListResp {
        node_id: state.node.node_id().to_string(),
        total: records.len(),
        records,
    })
}

async fn replicate(
    State(state): State<ApiState>,
    Json(op): Json<Operation>,
) -> Result<Json<ReplicateAck>, NodeError> {
    match state.node.apply_replica(op).await {
        Ok(outcome) => {
            let label = if outcome.delivered_now { "delivered" } else { "held" };
            state.metrics.replications.with_label_values(&[label]).inc();
            Ok(Json(ReplicateAck {
                accepted: true,
                delivered_now: outcome.delivered_now,
            }))
        }
        Err(err) => {
            state.metrics.errors.with_label_values(&[err.kind()]).inc();
            Err(err)
        }
    }
}

async fn view_log(State(state): State<ApiState>) -> Json<LogResp> {
    let log = state.node.log_snapshot().await;
    Json(LogResp {
        node_id: state.node.node_id().to_string(),
        log_size: log.len(),
        log,
    })
}

async fn view_queue(State(state): State<ApiState>) -> Json<QueueResp> {
    let queue = state.node.queue_snapshot().await;
    Json(QueueResp {
        node_id: state.node.node_id().to_string(),
        queue_size: queue.len(),
        queue,
    })
}

async fn ping() -> Response {
    (axum::http::StatusCode::OK, "pong").into_response()
}

async fn metrics(State(state): State<ApiState>) -> Response {
    let mut buffer = Vec::new();
    let enc = TextEncoder::new();
    enc.encode(&state.metrics.registry.gather(), &mut buffer).unwrap();
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, enc.format_type().to_string())],
        buffer,
    )
        .into_response()
}
