//! Hubwatch Core Library
//!
//! This crate provides the core functionality for hubwatch agents:
//! - Gateway polling (HTTP client, failure taxonomy)
//! - Presence coordination (scheduled refresh, snapshot publishing,
//!   listener fan-out)
//! - Presence smoothing (consider-home grace window)
//! - Entity reconciliation (add-only / add-remove / static allowlist)
//!
//! # Example
//!
//! ```no_run
//! use hubwatch_core::{HttpGatewayClient, PresenceCoordinator, config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = config::load_config()?;
//!     let client = HttpGatewayClient::with_timeout(
//!         &cfg.gateway_host,
//!         &cfg.password,
//!         cfg.request_timeout,
//!     )?;
//!     let coordinator =
//!         PresenceCoordinator::new(client, cfg.poll_interval, cfg.consider_home);
//!
//!     // The first refresh is fatal on any failure.
//!     let snapshot = coordinator.first_refresh().await?;
//!     println!("Gateway reports {} hosts", snapshot.len());
//!
//!     let _handle = coordinator.add_listener(|snapshot| {
//!         println!("refreshed: {} hosts", snapshot.len());
//!     });
//!
//!     // Poll until cancelled or credentials expire.
//!     coordinator.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod gateway;
pub mod presence;
pub mod reconcile;

// Re-export commonly used types
pub use config::{AgentConfig, ConfigSource};
pub use coordinator::{
    CoordinatorError, ListenerHandle, PresenceCoordinator, RefreshOutcome, SetupError,
};
pub use gateway::{GatewayClient, GatewayError, Host, HttpGatewayClient, Snapshot};
pub use presence::PresenceSmoother;
pub use reconcile::{EntityReconciler, ReconcileDelta, ReconcilePolicy};
