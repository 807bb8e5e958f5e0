//! HTTP handlers for the WebSocket control channel and the JSON admin API.

pub mod shares;
pub mod status;
pub mod ws;

use std::time::Instant;

use axum::http::StatusCode;

use ferry_core::ShareId;
use ferry_services::ControlHub;

#[derive(Clone)]
pub struct ApiState {
    pub hub: ControlHub,
    pub started_at: Instant,
    /// Fires once to stop every server task.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl ApiState {
    pub fn new(hub: ControlHub, shutdown_tx: tokio::sync::broadcast::Sender<()>) -> Self {
        Self {
            hub,
            started_at: Instant::now(),
            shutdown_tx,
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Parse a hex-encoded share id.
fn parse_share_id(text: &str) -> Result<ShareId, (StatusCode, String)> {
    text.parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid share id: {e}")))
}

// Re-export handler functions for use in router setup.
pub use shares::{handle_share_end, handle_share_inspect, handle_shares};
pub use status::{handle_shutdown, handle_status};
pub use ws::handle_ws;
