pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use relay_core::RelayConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Trigger + status queries
        .route(
            "/api/actions",
            post(routes::actions::trigger).get(routes::actions::lookup_action),
        )
        .route("/api/actions/stale", get(routes::actions::stale_actions))
        .route(
            "/api/actions/{correlation_id}",
            get(routes::actions::get_action),
        )
        // Realtime delivery (SSE)
        .route(
            "/api/actions/{correlation_id}/events",
            get(routes::events::subscribe_events),
        )
        // Worker callback
        .route("/api/callbacks", post(routes::callbacks::receive_callback))
        // Notifications
        .route(
            "/api/notifications",
            get(routes::notifications::list_notifications),
        )
        // Health
        .route("/api/health", get(routes::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the relay orchestration server.
pub async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let port = config.port;
    let app_state = state::AppState::new(config)?;
    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("relay server listening on http://localhost:{port}");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so
/// the caller can read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(
    config: RelayConfig,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app_state = state::AppState::new(config)?;
    let app = build_router(app_state);

    tracing::info!("relay server listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
