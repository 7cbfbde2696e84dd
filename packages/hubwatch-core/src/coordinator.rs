//! Refresh scheduling and presence coordination.
//!
//! One coordinator per gateway. It owns the polling cadence, the latest
//! good snapshot, the per-device presence smoother, and the listener
//! fan-out. Failures are classified: transient network trouble keeps the
//! stale snapshot and waits for the next tick, while rejected
//! credentials stop the loop with a distinct terminal signal.

use crate::gateway::{GatewayClient, GatewayError, Snapshot, normalize_mac};
use crate::presence::PresenceSmoother;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// A fetch failure on the very first refresh, with no cached snapshot to
/// fall back on. Always fatal to setup.
#[derive(Debug, Error)]
#[error("initial gateway refresh failed: {0}")]
pub struct SetupError(#[source] pub GatewayError);

/// Terminal outcomes of the polling loop.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The gateway rejected the configured credentials. The loop has
    /// stopped; re-supply credentials and start a new coordinator.
    #[error("gateway authentication expired, reauthentication required")]
    AuthenticationExpired,
}

/// Outcome of a single refresh cycle.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// New snapshot published; listeners were notified.
    Updated(Arc<Snapshot>),
    /// Transient failure; the previous snapshot remains authoritative
    /// and no listener fired.
    Stale(GatewayError),
    /// Credentials rejected; the coordinator is now in its terminal
    /// reauthentication state. The cached snapshot is kept.
    AuthExpired(GatewayError),
}

type ListenerFn = Box<dyn Fn(&Snapshot) + Send + Sync>;

struct RegisteredListener {
    id: u64,
    callback: ListenerFn,
}

struct ListenerRegistry {
    entries: Mutex<Vec<Arc<RegisteredListener>>>,
    next_id: AtomicU64,
}

/// Deregisters its listener when dropped.
pub struct ListenerHandle {
    registry: Weak<ListenerRegistry>,
    id: u64,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.entries.lock().retain(|entry| entry.id != self.id);
        }
    }
}

pub struct PresenceCoordinator<C: GatewayClient> {
    client: C,
    poll_interval: Duration,
    /// Replaced wholesale on every successful refresh so readers always
    /// hold a consistent snapshot instance.
    snapshot: Mutex<Option<Arc<Snapshot>>>,
    smoother: Mutex<PresenceSmoother>,
    listeners: Arc<ListenerRegistry>,
    /// Single-flight guard: overlapping refresh requests collapse to one
    /// in-progress fetch per coordinator.
    refresh_gate: tokio::sync::Mutex<()>,
    needs_reauth: AtomicBool,
}

impl<C: GatewayClient> PresenceCoordinator<C> {
    pub fn new(client: C, poll_interval: Duration, consider_home: Duration) -> Self {
        Self {
            client,
            poll_interval,
            snapshot: Mutex::new(None),
            smoother: Mutex::new(PresenceSmoother::new(consider_home)),
            listeners: Arc::new(ListenerRegistry {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            needs_reauth: AtomicBool::new(false),
        }
    }

    /// Run the first refresh. Any failure is fatal: there is no cached
    /// snapshot to fall back on.
    pub async fn first_refresh(&self) -> Result<Arc<Snapshot>, SetupError> {
        match self.refresh_once().await {
            RefreshOutcome::Updated(snapshot) => Ok(snapshot),
            RefreshOutcome::Stale(err) | RefreshOutcome::AuthExpired(err) => Err(SetupError(err)),
        }
    }

    /// Run one fetch-and-publish cycle.
    ///
    /// Invokes the gateway client exactly once. On success the new
    /// snapshot replaces the cached one, the smoother records active
    /// sightings, and every registered listener is called synchronously
    /// with the fresh snapshot.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let _gate = self.refresh_gate.lock().await;

        if self.needs_reauth.load(Ordering::Relaxed) {
            return RefreshOutcome::AuthExpired(GatewayError::Authentication(
                "reauthentication required".to_string(),
            ));
        }

        match self.client.fetch_hosts().await {
            Ok(hosts) => {
                let snapshot = Arc::new(Snapshot::from_hosts(hosts));
                self.smoother.lock().record(&snapshot);
                *self.snapshot.lock() = Some(snapshot.clone());
                tracing::debug!("refresh complete: {} hosts", snapshot.len());
                self.notify(&snapshot);
                RefreshOutcome::Updated(snapshot)
            }
            Err(err @ GatewayError::Authentication(_)) => {
                // Keep the cached snapshot; it is stale but still valid.
                self.needs_reauth.store(true, Ordering::SeqCst);
                tracing::error!("gateway rejected credentials: {err}");
                RefreshOutcome::AuthExpired(err)
            }
            Err(err @ GatewayError::Communication(_)) => {
                tracing::warn!("gateway unreachable, keeping previous snapshot: {err}");
                RefreshOutcome::Stale(err)
            }
            Err(err @ GatewayError::Unclassified(_)) => {
                // Retried like a communication failure, but logged at
                // error level so misclassification stays visible.
                tracing::error!("unclassified gateway failure, keeping previous snapshot: {err}");
                RefreshOutcome::Stale(err)
            }
        }
    }

    /// Drive the polling loop until cancelled or authentication expires.
    ///
    /// Cycles are strictly sequential: a slow fetch delays the next tick
    /// instead of overlapping it, and listener notification for one
    /// cycle completes before the next fetch starts. No listener is
    /// invoked after `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), CoordinatorError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick fires immediately; swallow it when first_refresh
        // already published a snapshot.
        if self.snapshot().is_some() {
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, stopping refresh loop");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            // Abort the in-flight fetch at the await
                            // boundary; no listener fires for this cycle.
                            tracing::info!("shutdown requested mid-cycle, aborting fetch");
                            return Ok(());
                        }
                        outcome = self.refresh_once() => match outcome {
                            RefreshOutcome::Updated(snapshot) => {
                                tracing::debug!(
                                    "published snapshot with {} hosts",
                                    snapshot.len()
                                );
                            }
                            RefreshOutcome::Stale(_) => {
                                // Already logged; retry on the next tick.
                            }
                            RefreshOutcome::AuthExpired(_) => {
                                return Err(CoordinatorError::AuthenticationExpired);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Register a callback invoked synchronously after each successful
    /// refresh. Dropping the returned handle deregisters the callback.
    pub fn add_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.entries.lock().push(Arc::new(RegisteredListener {
            id,
            callback: Box::new(callback),
        }));
        ListenerHandle {
            registry: Arc::downgrade(&self.listeners),
            id,
        }
    }

    fn notify(&self, snapshot: &Snapshot) {
        // Clone the entry list out of the lock so callbacks may register
        // or deregister listeners without deadlocking.
        let entries: Vec<Arc<RegisteredListener>> = self.listeners.entries.lock().clone();
        for entry in entries {
            (entry.callback)(snapshot);
        }
    }

    /// Latest successfully published snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.lock().clone()
    }

    /// Presence decision for one device against the latest snapshot,
    /// with the consider-home grace window applied.
    pub fn is_present(&self, mac: &str) -> bool {
        let Some(snapshot) = self.snapshot() else {
            return false;
        };
        self.smoother.lock().is_present(&normalize_mac(mac), &snapshot)
    }

    /// True once the gateway has rejected the configured credentials.
    pub fn needs_reauth(&self) -> bool {
        self.needs_reauth.load(Ordering::Relaxed)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Host;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    const MAC: &str = "aa:bb:cc:dd:ee:ff";

    fn host(mac: &str, active: bool) -> Host {
        Host {
            mac_address: mac.to_string(),
            name: None,
            hostname: None,
            ip_address: None,
            active,
        }
    }

    /// Gateway client returning a scripted sequence of fetch results.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<Vec<Host>, GatewayError>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<Vec<Host>, GatewayError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }

        fn remaining(&self) -> usize {
            self.responses.lock().len()
        }
    }

    impl GatewayClient for ScriptedClient {
        async fn fetch_hosts(&self) -> Result<Vec<Host>, GatewayError> {
            self.responses
                .lock()
                .pop_front()
                .expect("no scripted response left")
        }
    }

    fn coordinator(
        responses: Vec<Result<Vec<Host>, GatewayError>>,
    ) -> PresenceCoordinator<ScriptedClient> {
        PresenceCoordinator::new(
            ScriptedClient::new(responses),
            DEFAULT_POLL_INTERVAL,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_first_refresh_publishes_snapshot() {
        let coordinator = coordinator(vec![Ok(vec![host(MAC, true)])]);

        let snapshot = coordinator.first_refresh().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(coordinator.snapshot().is_some());
        assert!(coordinator.is_present(MAC));
    }

    #[tokio::test]
    async fn test_first_refresh_auth_failure_is_fatal() {
        let coordinator = coordinator(vec![Err(GatewayError::Authentication(
            "401".to_string(),
        ))]);

        let err = coordinator.first_refresh().await.unwrap_err();
        assert!(matches!(err.0, GatewayError::Authentication(_)));
        assert!(coordinator.snapshot().is_none());
        assert!(coordinator.needs_reauth());
    }

    #[tokio::test]
    async fn test_first_refresh_comms_failure_is_fatal() {
        let coordinator = coordinator(vec![Err(GatewayError::Communication(
            "timeout".to_string(),
        ))]);

        assert!(coordinator.first_refresh().await.is_err());
        assert!(coordinator.snapshot().is_none());
        // Communication failures are not terminal.
        assert!(!coordinator.needs_reauth());
    }

    #[tokio::test]
    async fn test_comms_failure_keeps_stale_snapshot_and_skips_listeners() {
        let coordinator = coordinator(vec![
            Ok(vec![host(MAC, true)]),
            Err(GatewayError::Communication("unreachable".to_string())),
        ]);
        let notifications = Arc::new(AtomicUsize::new(0));
        let count = notifications.clone();
        let _handle = coordinator.add_listener(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let first = coordinator.first_refresh().await.unwrap();
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        let outcome = coordinator.refresh_once().await;
        assert!(matches!(outcome, RefreshOutcome::Stale(_)));
        // Stale-but-valid: the exposed snapshot is unchanged and no
        // listener fired for the failed cycle.
        assert!(Arc::ptr_eq(&coordinator.snapshot().unwrap(), &first));
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unclassified_failure_is_retried_like_comms() {
        let coordinator = coordinator(vec![
            Ok(vec![host(MAC, true)]),
            Err(GatewayError::Unclassified("surprise".to_string())),
            Ok(vec![]),
        ]);

        coordinator.first_refresh().await.unwrap();
        assert!(matches!(
            coordinator.refresh_once().await,
            RefreshOutcome::Stale(GatewayError::Unclassified(_))
        ));
        // The next cycle still reaches the gateway.
        assert!(matches!(
            coordinator.refresh_once().await,
            RefreshOutcome::Updated(_)
        ));
    }

    #[tokio::test]
    async fn test_auth_failure_is_terminal_and_keeps_snapshot() {
        let coordinator = coordinator(vec![
            Ok(vec![host(MAC, true)]),
            Err(GatewayError::Authentication("403".to_string())),
            Ok(vec![]),
        ]);

        coordinator.first_refresh().await.unwrap();
        assert!(matches!(
            coordinator.refresh_once().await,
            RefreshOutcome::AuthExpired(_)
        ));
        assert!(coordinator.snapshot().is_some());

        // No further gateway call with the same credentials.
        assert!(matches!(
            coordinator.refresh_once().await,
            RefreshOutcome::AuthExpired(_)
        ));
        assert_eq!(coordinator.client.remaining(), 1);
    }

    #[tokio::test]
    async fn test_grace_window_covers_momentary_absence() {
        // Device active at t=0, gone from the next scan: still present.
        let coordinator = coordinator(vec![Ok(vec![host(MAC, true)]), Ok(vec![])]);

        coordinator.first_refresh().await.unwrap();
        assert!(coordinator.is_present(MAC));

        coordinator.refresh_once().await;
        assert_eq!(coordinator.snapshot().unwrap().len(), 0);
        assert!(coordinator.is_present(MAC));
        assert!(!coordinator.is_present("11:22:33:44:55:66"));
    }

    #[tokio::test]
    async fn test_dropped_listener_handle_deregisters() {
        let coordinator = coordinator(vec![Ok(vec![]), Ok(vec![])]);
        let notifications = Arc::new(AtomicUsize::new(0));
        let count = notifications.clone();

        let handle = coordinator.add_listener(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.refresh_once().await;
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        drop(handle);
        coordinator.refresh_once().await;
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_auth_expiry() {
        let coordinator = Arc::new(coordinator(vec![Err(GatewayError::Authentication(
            "401".to_string(),
        ))]));

        let err = coordinator.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AuthenticationExpired));
    }

    #[tokio::test]
    async fn test_run_honors_cancellation() {
        let coordinator = Arc::new(coordinator(vec![Ok(vec![host(MAC, true)])]));
        coordinator.first_refresh().await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        // Already cancelled: the loop exits before the swallowed first
        // tick can reach the (exhausted) scripted client.
        assert!(coordinator.run(token).await.is_ok());
    }
}
