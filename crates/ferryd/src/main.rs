//! ferryd: Ferry rendezvous daemon.
//!
//! Brokers share sessions and relays negotiation signals between browsers
//! or other clients. File bytes never pass through here.

use std::time::Duration;

use anyhow::Result;

use ferry_core::config::FerryConfig;
use ferry_services::{new_connection_table, ControlHub, SessionRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = FerryConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = FerryConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        FerryConfig::default()
    });
    tracing::info!(
        bind = %config.network.bind_addr,
        port = config.network.port,
        api_port = config.network.api_port,
        chunk_size = config.transfer.chunk_size,
        "ferryd starting"
    );

    // Shared state
    let connections = new_connection_table();
    let hub = ControlHub::new(connections);

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let state = ferry_api::ApiState::new(hub.clone(), shutdown_tx.clone());

    let control_task = {
        let state = state.clone();
        let bind_addr = config.network.bind_addr.clone();
        let port = config.network.port;
        tokio::spawn(async move { ferry_api::serve_control(state, &bind_addr, port).await })
    };

    let admin_task = {
        let port = config.network.api_port;
        tokio::spawn(ferry_api::serve_admin(state, port))
    };

    let snapshot_printer = tokio::spawn(snapshot_loop(
        hub.registry().clone(),
        config.relay.snapshot_interval_secs,
    ));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()   => tracing::info!("shutting down"),
        r = control_task         => tracing::error!("control channel exited: {:?}", r),
        r = admin_task           => tracing::error!("admin API exited: {:?}", r),
        r = snapshot_printer     => tracing::error!("snapshot printer exited: {:?}", r),
    }

    Ok(())
}

/// Periodically log the share table. An interval of 0 disables it.
async fn snapshot_loop(registry: SessionRegistry, interval_secs: u64) {
    if interval_secs == 0 {
        return std::future::pending().await;
    }
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        tracing::info!(count = registry.len(), "share table snapshot");
        for s in registry.snapshot() {
            tracing::info!(
                share = %s.share_id.short(),
                owner = %s.owner.short(),
                receivers = s.receivers.len(),
                file = s.metadata.as_ref().map(|m| m.name.as_str()).unwrap_or("-"),
                "  share"
            );
        }
    }
}
