use {
    crate::domain::{callback::CallbackPayload, error::CorrelationError, provider::CallbackSink},
    std::sync::Arc,
};

/// Logs correlation anomalies. Always installed; the Postgres sink is added
/// on top when a database is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl CallbackSink for TracingSink {
    fn record(&self, anomaly: &CorrelationError, payload: Option<&CallbackPayload>) {
        let result_code = payload.map(|p| p.result_code());
        let kind = payload.map(|p| p.kind().as_str());
        match anomaly {
            CorrelationError::Orphan(id) => tracing::warn!(
                correlation_id = %id,
                ?kind,
                ?result_code,
                "callback with no pending transaction, retained as orphan"
            ),
            CorrelationError::DuplicateResolve(id) => tracing::info!(
                correlation_id = %id,
                ?kind,
                ?result_code,
                "duplicate callback ignored"
            ),
            CorrelationError::Timeout(id) => {
                tracing::warn!(correlation_id = %id, "transaction timed out")
            }
            other => tracing::warn!(anomaly = %other, "correlation anomaly"),
        }
    }
}

pub struct FanoutSink {
    sinks: Vec<Arc<dyn CallbackSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn CallbackSink>>) -> Self {
        Self { sinks }
    }
}

impl CallbackSink for FanoutSink {
    fn record(&self, anomaly: &CorrelationError, payload: Option<&CallbackPayload>) {
        for sink in &self.sinks {
            sink.record(anomaly, payload);
        }
    }
}
