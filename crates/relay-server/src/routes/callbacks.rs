use axum::extract::State;
use axum::Json;
use relay_core::{CallbackAck, Outcome};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest {
    pub correlation_id: String,
    /// "success" or "error", as reported by the worker.
    pub outcome: String,
    #[serde(default)]
    pub result_payload: Option<serde_json::Value>,
}

/// POST /api/callbacks — terminal outcome reported by the external worker.
///
/// Callbacks are at-least-once: a duplicate for an already-resolved
/// correlation id is acknowledged with 2xx so naive workers don't retry,
/// and the store is left untouched. 404 only when the correlation id was
/// never issued.
pub async fn receive_callback(
    State(app): State<AppState>,
    Json(body): Json<CallbackRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome: Outcome = body.outcome.parse()?;
    let ack = app
        .orchestrator
        .receive_callback(&body.correlation_id, outcome, body.result_payload)
        .await?;

    let status = match ack {
        CallbackAck::Applied => "applied",
        CallbackAck::Duplicate => "duplicate",
    };
    info!(correlation_id = %body.correlation_id, status, "callback acknowledged");
    Ok(Json(serde_json::json!({ "status": status })))
}
