use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::replication::NodeError;

/// Wire shape of every client-facing error.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = match &self {
            NodeError::Validation { .. } => StatusCode::BAD_REQUEST,
            NodeError::AlreadyExists { .. } => StatusCode::CONFLICT,
            NodeError::NotFound { .. } => StatusCode::NOT_FOUND,
            NodeError::Protocol { .. } => StatusCode::BAD_REQUEST,
        };
        let body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
