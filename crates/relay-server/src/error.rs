use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::RelayError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 404 Not Found errors
// ---------------------------------------------------------------------------

/// Private sentinel error type used to carry an explicit HTTP 404 through
/// the `anyhow::Error` chain without touching the `RelayError` enum.
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

/// Private sentinel error type for explicit HTTP 400 responses.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    /// Construct a 404 Not Found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Check for explicit sentinel types before falling through to RelayError.
        if let Some(n) = self.0.downcast_ref::<NotFoundError>() {
            let body = serde_json::json!({ "error": n.0.clone() });
            return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
        }
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        if let Some(e) = self.0.downcast_ref::<RelayError>() {
            // Conflicts carry the existing pending request so the UI can
            // render "in progress since …" instead of a generic error.
            if let RelayError::ConflictInProgress { existing } = e {
                let body = serde_json::json!({
                    "error": e.to_string(),
                    "existingRequest": existing,
                });
                return (StatusCode::CONFLICT, axum::Json(body)).into_response();
            }

            let status = match e {
                RelayError::ConflictInProgress { .. } => StatusCode::CONFLICT,
                RelayError::UnknownCorrelation(_) => StatusCode::NOT_FOUND,
                RelayError::EmptyField(_)
                | RelayError::InvalidActionType(_)
                | RelayError::InvalidStatus(_)
                | RelayError::InvalidOutcome(_) => StatusCode::BAD_REQUEST,
                RelayError::DispatchFailed(_) => StatusCode::BAD_GATEWAY,
                RelayError::Task(_)
                | RelayError::Io(_)
                | RelayError::Sqlite(_)
                | RelayError::Json(_)
                | RelayError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = serde_json::json!({ "error": e.to_string() });
            return (status, axum::Json(body)).into_response();
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
