//! Daemon status and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};
use super::shares::{print_share, ShareSummary};

#[derive(Deserialize)]
struct StatusResponse {
    uptime_secs: u64,
    connections: usize,
    share_count: usize,
    shares: Vec<ShareSummary>,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Ferry Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Uptime        : {}s", resp.uptime_secs);
    println!("  Connections   : {}", resp.connections);
    println!("  Active shares : {}", resp.share_count);

    if resp.shares.is_empty() {
        println!("\n  No active shares.");
    } else {
        println!("\n  Shares:");
        for s in &resp.shares {
            print_share(s);
        }
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
