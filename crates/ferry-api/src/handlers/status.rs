//! /status and /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::shares::{summarize, ShareSummary};
use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub connections: usize,
    pub share_count: usize,
    pub shares: Vec<ShareSummary>,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let shares: Vec<ShareSummary> = state
        .hub
        .registry()
        .snapshot()
        .iter()
        .map(summarize)
        .collect();

    Json(StatusResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        connections: state.hub.notifier().len(),
        share_count: shares.len(),
        shares,
    })
}

// ── /daemon/shutdown ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
