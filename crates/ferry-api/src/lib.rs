pub mod handlers;

use std::future::Future;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// Public control channel: a single WebSocket endpoint.
pub fn control_router(state: ApiState) -> Router {
    Router::new()
        .route("/ws", get(handlers::handle_ws))
        .with_state(state)
}

/// Operator API, nested under /api.
pub fn admin_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/shares", get(handlers::handle_shares))
        .route(
            "/shares/{id}",
            get(handlers::handle_share_inspect).delete(handlers::handle_share_end),
        )
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve_control(state: ApiState, bind_addr: &str, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind((bind_addr, port)).await?;
    tracing::info!(addr = %bind_addr, port, "control channel listening");
    serve_control_on(listener, state).await
}

pub async fn serve_control_on(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let shutdown = shutdown_signal(&state);
    axum::serve(listener, control_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn serve_admin(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    serve_admin_on(listener, state).await
}

pub async fn serve_admin_on(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    let shutdown = shutdown_signal(&state);
    axum::serve(listener, admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn shutdown_signal(state: &ApiState) -> impl Future<Output = ()> {
    let mut rx = state.shutdown_tx.subscribe();
    async move {
        let _ = rx.recv().await;
    }
}
