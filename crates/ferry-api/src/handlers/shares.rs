//! /shares handlers: listing, inspection and operator teardown.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use ferry_core::FileMetadata;
use ferry_services::ShareSession;

use super::{parse_share_id, ApiState};

/// Told to receivers when an operator ends their share.
pub const OPERATOR_CLOSED: &str = "Share closed by operator";

#[derive(Serialize)]
pub struct ShareSummary {
    pub share_id: String,
    pub owner: String,
    pub file_name: Option<String>,
    pub size: Option<u64>,
    pub receivers: usize,
    pub age_secs: u64,
}

pub(crate) fn summarize(session: &ShareSession) -> ShareSummary {
    ShareSummary {
        share_id: session.share_id.to_string(),
        owner: session.owner.to_string(),
        file_name: session.metadata.as_ref().map(|m| m.name.clone()),
        size: session.metadata.as_ref().map(|m| m.size),
        receivers: session.receivers.len(),
        age_secs: session.created_instant.elapsed().as_secs(),
    }
}

// ── /shares ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SharesResponse {
    pub shares: Vec<ShareSummary>,
}

pub async fn handle_shares(State(state): State<ApiState>) -> Json<SharesResponse> {
    let shares = state
        .hub
        .registry()
        .snapshot()
        .iter()
        .map(summarize)
        .collect();
    Json(SharesResponse { shares })
}

// ── /shares/:id (GET) ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShareInspectResponse {
    pub share_id: String,
    pub owner: String,
    pub metadata: Option<FileMetadata>,
    pub receivers: Vec<String>,
    pub age_secs: u64,
}

pub async fn handle_share_inspect(
    State(state): State<ApiState>,
    Path(share_id): Path<String>,
) -> Result<Json<ShareInspectResponse>, (StatusCode, String)> {
    let id = parse_share_id(&share_id)?;

    let session = state
        .hub
        .registry()
        .lookup(&id)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;

    Ok(Json(ShareInspectResponse {
        share_id: session.share_id.to_string(),
        owner: session.owner.to_string(),
        metadata: session.metadata,
        receivers: session.receivers.iter().map(|r| r.to_string()).collect(),
        age_secs: session.created_instant.elapsed().as_secs(),
    }))
}

// ── /shares/:id (DELETE) ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShareEndResponse {
    pub share_id: String,
    pub ended: bool,
}

pub async fn handle_share_end(
    State(state): State<ApiState>,
    Path(share_id): Path<String>,
) -> Result<Json<ShareEndResponse>, (StatusCode, String)> {
    let id = parse_share_id(&share_id)?;
    let ended = state.hub.registry().end_share(&id, OPERATOR_CLOSED).is_some();

    if ended {
        tracing::info!(share_id = %share_id, "share ended via API");
    }

    Ok(Json(ShareEndResponse { share_id, ended }))
}
