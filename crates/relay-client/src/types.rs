use serde::Deserialize;

/// Resolution of a listener wait, as surfaced to initiating UI code.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenOutcome {
    /// The worker reported success; the result payload, if any, is attached.
    Success(Option<serde_json::Value>),
    /// The worker reported a business failure.
    Failure {
        reason: String,
        result: Option<serde_json::Value>,
    },
    /// No terminal event arrived in time. Unknown outcome — the action may
    /// still complete; check the status query later. Never render as failed.
    TimedOut,
}

/// 202 response body from the trigger endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAccepted {
    pub correlation_id: String,
    pub action_request_id: i64,
}
