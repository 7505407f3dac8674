use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/actions/{correlation_id}/events — SSE stream that emits at most
/// one terminal `outcome` event, then closes.
///
/// Subscribing to an already-resolved request delivers the stored outcome
/// immediately; subscribing to an unknown correlation id is a 404. The
/// synthetic `timeout` event from hub expiry arrives on this stream too.
pub async fn subscribe_events(
    Path(correlation_id): Path<String>,
    State(app): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    info!(correlation_id = %correlation_id, "SSE subscribe");
    let rx = app.orchestrator.subscribe(&correlation_id).await?;

    let stream = BroadcastStream::new(rx)
        .filter_map(|msg| {
            msg.ok()
                .and_then(|event| serde_json::to_string(&event).ok())
                .map(|data| Ok::<Event, Infallible>(Event::default().event("outcome").data(data)))
        })
        .take(1);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
