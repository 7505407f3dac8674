use axum::extract::{Query, State};
use axum::Json;
use relay_core::{EntityRef, Notification};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityQuery {
    pub entity_type: String,
    pub entity_id: String,
}

/// GET /api/notifications?entityType=&entityId= — notification history for
/// one entity, newest first. This is the audit trail a client re-reads when
/// it was not listening at callback time.
pub async fn list_notifications(
    Query(query): Query<EntityQuery>,
    State(app): State<AppState>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let entity = EntityRef::new(query.entity_type, query.entity_id);
    let store = app.store();
    let notifications =
        tokio::task::spawn_blocking(move || store.notifications_for_entity(&entity)).await??;
    Ok(Json(notifications))
}
