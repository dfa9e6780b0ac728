use prometheus::{IntCounterVec, Registry};

#[derive(Debug, Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub writes: IntCounterVec,
    pub replications: IntCounterVec,
    pub requests: IntCounterVec,
    pub errors: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let writes = IntCounterVec::new(
            prometheus::Opts::new("writes", "Local write operations"),
            &["kind"],
        ).unwrap();
        let replications = IntCounterVec::new(
            prometheus::Opts::new("replications", "Inbound replication deliveries"),
            &["outcome"],
        ).unwrap();
        let requests = IntCounterVec::new(
            prometheus::Opts::new("requests", "Total API Requests"),
            &["method", "path", "status"],
        ).unwrap();
        let errors = IntCounterVec::new(
            prometheus::Opts::new("errors", "Total API Errors"),
            &["kind"],
        ).unwrap();

        registry.register(Box::new(writes.clone())).unwrap();
        registry.register(Box::new(replications.clone())).unwrap();
        registry.register(Box::new(requests.clone())).unwrap();
        registry.register(Box::new(errors.clone())).unwrap();

        Self { registry, writes, replications, requests, errors }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
