use {
    super::callback::CallbackPayload,
    super::error::CorrelationError,
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

pub struct NewAuditEntry {
    pub id: Uuid,
    pub correlation_id: String,
    pub kind: Option<String>,
    pub action: String,
    pub result_code: Option<i64>,
    pub detail: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl NewAuditEntry {
    pub fn from_anomaly(anomaly: &CorrelationError, payload: Option<&CallbackPayload>) -> Self {
        let (correlation_id, action) = match anomaly {
            CorrelationError::Orphan(id) => (id.as_str(), "orphaned"),
            CorrelationError::DuplicateResolve(id) => (id.as_str(), "duplicate"),
            CorrelationError::Timeout(id) => (id.as_str(), "timed_out"),
            CorrelationError::AlreadyRegistered(id) => (id.as_str(), "already_registered"),
            CorrelationError::Closed => ("", "closed"),
        };

        let detail = match payload {
            Some(p) => serde_json::json!({
                "result_desc": p.result_desc(),
                "metadata": p.metadata(),
            }),
            None => serde_json::json!({}),
        };

        Self {
            id: Uuid::now_v7(),
            correlation_id: correlation_id.to_string(),
            kind: payload.map(|p| p.kind().as_str().to_string()),
            action: action.to_string(),
            result_code: payload.map(|p| p.result_code()),
            detail,
            recorded_at: Utc::now(),
        }
    }
}
