use axum::{
    extract::{ws::rejection::WebSocketUpgradeRejection, Request, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::error::RelayResult;
use crate::state::AppState;
use crate::ws;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub clients: usize,
}

/// Build the HTTP router
///
/// `/` upgrades too, since browser clients connect to the bare host. Plain requests to `/` get
/// the static index when a static directory is configured.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/", get(root))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health));

    if let Some(dir) = &state.config.static_dir {
        tracing::info!(dir = %dir.display(), "Serving static files");
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root(
    State(state): State<Arc<AppState>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Response {
    let rejection = match upgrade {
        Ok(ws) => return ws::upgrade(ws, state),
        Err(rejection) => rejection,
    };

    match &state.config.static_dir {
        Some(dir) => match ServeDir::new(dir).oneshot(request).await {
            Ok(response) => response.into_response(),
            Err(never) => match never {},
        },
        None => rejection.into_response(),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        clients: state.registry.len().await,
    })
}

/// Bind to the configured address and serve until Ctrl-C
pub async fn serve(state: Arc<AppState>) -> RelayResult<()> {
    let listener = TcpListener::bind(state.config.socket_addr()).await?;
    serve_on(listener, state).await
}

/// Serve on an already bound listener
pub async fn serve_on(listener: TcpListener, state: Arc<AppState>) -> RelayResult<()> {
    tracing::info!("Listening on ws://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
