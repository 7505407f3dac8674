use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use relay_core::{ActionType, EntityRef, TriggerRequest};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// POST /api/actions — trigger an action against an entity.
///
/// Returns 202 with the correlation id once the record is persisted and the
/// worker accepted the job; 409 with the existing request when the
/// idempotency guard rejects; 502 when the dispatch call itself failed (the
/// key is already released by then).
pub async fn trigger(
    State(app): State<AppState>,
    Json(body): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let request = app.orchestrator.trigger(body).await?;
    info!(
        correlation_id = %request.correlation_id,
        action_type = %request.action_type,
        "action accepted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "correlationId": request.correlation_id,
            "actionRequestId": request.id,
        })),
    ))
}

// ---------------------------------------------------------------------------
// Status queries
// ---------------------------------------------------------------------------

/// GET /api/actions/{correlation_id} — snapshot of one action request.
pub async fn get_action(
    Path(correlation_id): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<relay_core::ActionRequest>, AppError> {
    let store = app.store();
    let request = tokio::task::spawn_blocking(move || store.get_by_correlation(&correlation_id))
        .await??
        .ok_or_else(|| AppError::not_found("no action request for this correlation id"))?;
    Ok(Json(request))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyQuery {
    pub entity_type: String,
    pub entity_id: String,
    pub action_type: String,
}

/// GET /api/actions?entityType=&entityId=&actionType= — most recent request
/// for an idempotency key. The reconciliation path for clients that missed
/// the live event.
pub async fn lookup_action(
    Query(query): Query<KeyQuery>,
    State(app): State<AppState>,
) -> Result<Json<relay_core::ActionRequest>, AppError> {
    let action_type: ActionType = query.action_type.parse()?;
    let entity = EntityRef::new(query.entity_type, query.entity_id);
    let store = app.store();
    let request = tokio::task::spawn_blocking(move || store.latest_by_key(&entity, action_type))
        .await??
        .ok_or_else(|| AppError::not_found("no action request for this key"))?;
    Ok(Json(request))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleQuery {
    #[serde(default = "default_older_than_secs")]
    pub older_than_secs: i64,
}

fn default_older_than_secs() -> i64 {
    300
}

/// GET /api/actions/stale?olderThanSecs= — PENDING requests older than the
/// given age, for an external reconciliation sweep.
pub async fn stale_actions(
    Query(query): Query<StaleQuery>,
    State(app): State<AppState>,
) -> Result<Json<Vec<relay_core::ActionRequest>>, AppError> {
    let older_than = chrono::Duration::seconds(query.older_than_secs);
    let store = app.store();
    let stale = tokio::task::spawn_blocking(move || store.stale_pending(older_than)).await??;
    Ok(Json(stale))
}
