use crate::types::ActionRequest;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("an action of this type is already in progress for this entity")]
    ConflictInProgress { existing: Box<ActionRequest> },

    #[error("dispatch to worker failed: {0}")]
    DispatchFailed(String),

    #[error("unknown correlation id: {0}")]
    UnknownCorrelation(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("invalid action type: {0}")]
    InvalidActionType(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid outcome '{0}': expected 'success' or 'error'")]
    InvalidOutcome(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
