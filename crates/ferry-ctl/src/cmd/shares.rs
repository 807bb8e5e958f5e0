//! Share listing, inspection and teardown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, delete_json, get_json};
use super::{format_size, short};

#[derive(Deserialize)]
pub struct ShareSummary {
    share_id: String,
    owner: String,
    file_name: Option<String>,
    size: Option<u64>,
    receivers: usize,
    age_secs: u64,
}

#[derive(Deserialize)]
struct SharesResponse {
    shares: Vec<ShareSummary>,
}

#[derive(Deserialize)]
struct Metadata {
    name: String,
    size: u64,
    #[serde(rename = "type", default)]
    mime_type: String,
}

pub fn print_share(s: &ShareSummary) {
    println!("  ┌─ {}", short(&s.share_id));
    println!("  │  owner     : {}", short(&s.owner));
    match (&s.file_name, s.size) {
        (Some(name), Some(size)) => println!("  │  file      : {} ({})", name, format_size(size)),
        _ => println!("  │  file      : (not published)"),
    }
    println!("  │  receivers : {}", s.receivers);
    println!("  └─ age       : {}s", s.age_secs);
}

pub async fn cmd_shares(port: u16) -> Result<()> {
    let resp: SharesResponse = get_json(&format!("{}/shares", base_url(port))).await?;

    if resp.shares.is_empty() {
        println!("No active shares.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Active Shares ({})", resp.shares.len());
    println!("═══════════════════════════════════════");
    for s in &resp.shares {
        print_share(s);
    }

    Ok(())
}

pub async fn cmd_share_inspect(port: u16, share_id: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct InspectResponse {
        share_id: String,
        owner: String,
        metadata: Option<Metadata>,
        receivers: Vec<String>,
        age_secs: u64,
    }

    let resp: InspectResponse =
        get_json(&format!("{}/shares/{}", base_url(port), share_id)).await?;

    println!("═══════════════════════════════════════");
    println!("  Share Details");
    println!("═══════════════════════════════════════");
    println!("  ID        : {}", resp.share_id);
    println!("  Owner     : {}", resp.owner);
    match &resp.metadata {
        Some(m) => {
            println!("  File      : {}", m.name);
            println!("  Size      : {}", format_size(m.size));
            if !m.mime_type.is_empty() {
                println!("  Type      : {}", m.mime_type);
            }
        }
        None => println!("  File      : (not published)"),
    }
    println!("  Age       : {}s", resp.age_secs);
    println!("  Receivers : {}", resp.receivers.len());
    for r in &resp.receivers {
        println!("    · {}", r);
    }

    Ok(())
}

pub async fn cmd_share_end(port: u16, share_id: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct EndResponse {
        share_id: String,
        ended: bool,
    }

    let resp: EndResponse = delete_json(&format!("{}/shares/{}", base_url(port), share_id)).await?;

    if resp.ended {
        println!("✓ Share ended: {}...", short(&resp.share_id));
    } else {
        println!("Share not found: {}", share_id);
    }

    Ok(())
}
