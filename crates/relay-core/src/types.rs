use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

/// Closed set of actions an operator can trigger against a CRM entity.
/// The business logic behind each one lives in the external worker; this
/// service only tracks the attempt and relays the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    SendMessage,
    GenerateQuote,
    ConvertEntity,
    RequestAnalysis,
}

impl ActionType {
    pub fn all() -> &'static [ActionType] {
        &[
            ActionType::SendMessage,
            ActionType::GenerateQuote,
            ActionType::ConvertEntity,
            ActionType::RequestAnalysis,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::SendMessage => "send-message",
            ActionType::GenerateQuote => "generate-quote",
            ActionType::ConvertEntity => "convert-entity",
            ActionType::RequestAnalysis => "request-analysis",
        }
    }

    /// Default client-visible wait for a worker callback, per action type.
    /// Message sends come back fast; AI analysis can take a couple minutes.
    pub fn default_delivery_timeout_secs(self) -> u64 {
        match self {
            ActionType::SendMessage => 30,
            ActionType::GenerateQuote => 60,
            ActionType::ConvertEntity => 45,
            ActionType::RequestAnalysis => 120,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = crate::error::RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send-message" => Ok(ActionType::SendMessage),
            "generate-quote" => Ok(ActionType::GenerateQuote),
            "convert-entity" => Ok(ActionType::ConvertEntity),
            "request-analysis" => Ok(ActionType::RequestAnalysis),
            other => Err(crate::error::RelayError::InvalidActionType(
                other.to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle of an [`ActionRequest`]. `Pending` is the only non-terminal
/// status; the partial unique index in the store keys off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::Succeeded => "SUCCEEDED",
            ActionStatus::Failed => "FAILED",
            ActionStatus::TimedOut => "TIMED_OUT",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = crate::error::RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ActionStatus::Pending),
            "SUCCEEDED" => Ok(ActionStatus::Succeeded),
            "FAILED" => Ok(ActionStatus::Failed),
            "TIMED_OUT" => Ok(ActionStatus::TimedOut),
            other => Err(crate::error::RelayError::InvalidStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// Reference to the CRM entity an action targets. The entity itself lives in
/// the CRUD layer; the orchestrator only needs the (type, id) pair for the
/// idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

// ---------------------------------------------------------------------------
// ActionRequest
// ---------------------------------------------------------------------------

/// One durable record per triggered action attempt. The store exclusively
/// owns the authoritative status; the realtime hub never is the system of
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub id: i64,
    /// Join key across trigger → dispatch → callback → delivery.
    pub correlation_id: String,
    pub action_type: ActionType,
    #[serde(flatten)]
    pub entity: EntityRef,
    /// Free-form payload for the external worker; validated only at the edges.
    pub payload: serde_json::Value,
    pub status: ActionStatus,
    /// Result payload from the worker callback, if any.
    pub result: Option<serde_json::Value>,
    /// Error detail for FAILED requests (dispatch or business failure).
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ActionRequest {
    /// How long this request has been pending. Included in conflict
    /// responses so the UI can render "in progress for 12s" instead of a
    /// generic error.
    pub fn pending_for(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

// ---------------------------------------------------------------------------
// Outcome / OutcomeEvent
// ---------------------------------------------------------------------------

/// Terminal outcome reported by the external worker on the callback
/// endpoint. Maps to `SUCCEEDED` / `FAILED` in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

impl std::str::FromStr for Outcome {
    type Err = crate::error::RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "error" => Ok(Outcome::Error),
            other => Err(crate::error::RelayError::InvalidOutcome(other.to_string())),
        }
    }
}

/// Status carried by a hub event. Unlike [`Outcome`] this includes the
/// synthetic `timeout` the hub emits when a subscription expires before the
/// worker calls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Error,
    Timeout,
}

impl From<Outcome> for EventStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => EventStatus::Success,
            Outcome::Error => EventStatus::Error,
        }
    }
}

/// The single event delivered to every live subscriber of a correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEvent {
    pub status: EventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_payload: Option<serde_json::Value>,
}

impl OutcomeEvent {
    pub fn from_outcome(outcome: Outcome, result_payload: Option<serde_json::Value>) -> Self {
        Self {
            status: outcome.into(),
            result_payload,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status: EventStatus::Timeout,
            result_payload: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerRequest
// ---------------------------------------------------------------------------

/// Inbound trigger as originated by the CRUD UI. The correlation id is
/// normally client-generated; callers that omit it get a server-minted
/// UUID v4 back in the 202 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub action_type: ActionType,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
