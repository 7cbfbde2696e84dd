//! Foreground watch mode for continuous gateway polling
//!
//! This module wires the presence coordinator to the terminal:
//! - Runs the first refresh (fatal on any failure)
//! - Reconciles each published snapshot into tracked devices
//! - Handles graceful shutdown via SIGTERM/SIGINT

use anyhow::{Context, Result};
use hubwatch_core::{
    CoordinatorError, EntityReconciler, HttpGatewayClient, PresenceCoordinator, config,
};
use parking_lot::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run the watch loop until interrupted or authentication expires
pub async fn run_watch(interval_override: Option<u64>) -> Result<()> {
    let mut cfg = config::load_config()?;
    if let Some(secs) = interval_override {
        cfg.poll_interval = Duration::from_secs(secs);
    }

    tracing::info!(
        "Starting watch: gateway {} every {}s, consider-home {}s, policy {:?}",
        cfg.gateway_host,
        cfg.poll_interval.as_secs(),
        cfg.consider_home.as_secs(),
        cfg.policy
    );

    let client =
        HttpGatewayClient::with_timeout(&cfg.gateway_host, &cfg.password, cfg.request_timeout)
            .context("Failed to build gateway client")?;
    let coordinator = PresenceCoordinator::new(client, cfg.poll_interval, cfg.consider_home);

    let reconciler = Mutex::new(EntityReconciler::new(cfg.policy.clone()));
    let _listener = coordinator.add_listener(move |snapshot| {
        let delta = reconciler.lock().reconcile(snapshot);
        for mac in &delta.added {
            let name = snapshot
                .get(mac)
                .and_then(|h| h.name.as_deref().or(h.hostname.as_deref()))
                .unwrap_or("-");
            tracing::info!("Tracking new device {mac} ({name})");
        }
        for mac in &delta.removed {
            tracing::info!("Device {mac} left the gateway, no longer tracked");
        }

        let active = snapshot.hosts().filter(|h| h.active).count();
        tracing::debug!(
            "Snapshot at {}: {} hosts, {} active",
            snapshot.fetched_at().to_rfc3339(),
            snapshot.len(),
            active
        );
    });

    // The very first refresh has no stale snapshot to fall back on, so
    // any failure aborts setup.
    let snapshot = coordinator
        .first_refresh()
        .await
        .context("Initial gateway refresh failed")?;
    tracing::info!("Initial refresh complete: {} hosts", snapshot.len());

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    match coordinator.run(shutdown).await {
        Ok(()) => {
            tracing::info!("Watch stopped");
            Ok(())
        }
        Err(CoordinatorError::AuthenticationExpired) => {
            eprintln!("Gateway rejected the configured credentials.");
            eprintln!("Update the password and run 'hubwatch check' to verify.");
            std::process::exit(1);
        }
    }
}

/// Set up SIGTERM and SIGINT handlers for graceful shutdown
fn setup_signal_handlers(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let term_token = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM");
            term_token.cancel();
        });

        let int_token = shutdown;
        tokio::spawn(async move {
            let mut sigint =
                signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");
            sigint.recv().await;
            tracing::info!("Received SIGINT");
            int_token.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C");
                shutdown.cancel();
            }
        });
    }
}
