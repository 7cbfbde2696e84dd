//! Entity reconciliation: deciding which devices get a tracked
//! representation as snapshots come and go.
//!
//! One policy is chosen per deployment. Auto-discovery either only ever
//! adds devices or mirrors the latest snapshot exactly; the static
//! allowlist binds a fixed set of MACs against the first snapshot.

use crate::gateway::{Snapshot, normalize_mac};
use std::collections::BTreeSet;

/// How the tracked set follows successive snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Track every device ever seen; never remove.
    AddOnly,
    /// Keep the tracked set equal to the latest snapshot's key set.
    AddAndRemove,
    /// Track only allowlisted devices present in the first snapshot.
    /// Devices appearing later are ignored; devices never seen get no
    /// representation at all.
    StaticAllowlist(Vec<String>),
}

/// Devices added and removed by one reconciliation pass, sorted by MAC.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug)]
pub struct EntityReconciler {
    policy: ReconcilePolicy,
    tracked: BTreeSet<String>,
    /// Set once the static allowlist has bound against a snapshot.
    bound: bool,
}

impl EntityReconciler {
    pub fn new(policy: ReconcilePolicy) -> Self {
        let policy = match policy {
            ReconcilePolicy::StaticAllowlist(macs) => ReconcilePolicy::StaticAllowlist(
                macs.iter().map(|m| normalize_mac(m)).collect(),
            ),
            other => other,
        };
        Self {
            policy,
            tracked: BTreeSet::new(),
            bound: false,
        }
    }

    /// Diff the snapshot against the tracked set per the configured policy.
    ///
    /// Idempotent: reconciling the same snapshot twice yields an empty
    /// delta the second time.
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> ReconcileDelta {
        match &self.policy {
            ReconcilePolicy::StaticAllowlist(allow) => {
                if self.bound {
                    return ReconcileDelta::default();
                }
                self.bound = true;
                let mut delta = ReconcileDelta::default();
                for mac in allow {
                    if snapshot.contains(mac) && self.tracked.insert(mac.clone()) {
                        delta.added.push(mac.clone());
                    }
                }
                delta.added.sort();
                delta
            }
            ReconcilePolicy::AddOnly => {
                let mut delta = ReconcileDelta::default();
                for mac in snapshot.macs() {
                    if self.tracked.insert(mac.to_string()) {
                        delta.added.push(mac.to_string());
                    }
                }
                delta.added.sort();
                delta
            }
            ReconcilePolicy::AddAndRemove => {
                let latest: BTreeSet<String> = snapshot.macs().map(str::to_string).collect();
                let delta = ReconcileDelta {
                    added: latest.difference(&self.tracked).cloned().collect(),
                    removed: self.tracked.difference(&latest).cloned().collect(),
                };
                self.tracked = latest;
                delta
            }
        }
    }

    pub fn is_tracked(&self, mac: &str) -> bool {
        self.tracked.contains(mac)
    }

    /// Currently tracked MACs, sorted.
    pub fn tracked(&self) -> impl Iterator<Item = &str> {
        self.tracked.iter().map(String::as_str)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Host;

    fn host(mac: &str) -> Host {
        Host {
            mac_address: mac.to_string(),
            name: None,
            hostname: None,
            ip_address: None,
            active: true,
        }
    }

    fn snapshot(macs: &[&str]) -> Snapshot {
        Snapshot::from_hosts(macs.iter().map(|m| host(m)).collect())
    }

    #[test]
    fn test_add_only_never_shrinks() {
        let mut reconciler = EntityReconciler::new(ReconcilePolicy::AddOnly);

        let delta = reconciler.reconcile(&snapshot(&["aa:aa", "bb:bb"]));
        assert_eq!(delta.added, vec!["aa:aa", "bb:bb"]);
        assert!(delta.removed.is_empty());

        // Both devices vanish; the tracked set must not shrink.
        let delta = reconciler.reconcile(&snapshot(&[]));
        assert!(delta.is_empty());
        assert_eq!(reconciler.tracked_count(), 2);

        let delta = reconciler.reconcile(&snapshot(&["cc:cc"]));
        assert_eq!(delta.added, vec!["cc:cc"]);
        assert_eq!(reconciler.tracked_count(), 3);
    }

    #[test]
    fn test_add_and_remove_mirrors_snapshot() {
        let mut reconciler = EntityReconciler::new(ReconcilePolicy::AddAndRemove);

        reconciler.reconcile(&snapshot(&["aa:aa", "bb:bb"]));
        let delta = reconciler.reconcile(&snapshot(&["bb:bb", "cc:cc"]));

        assert_eq!(delta.added, vec!["cc:cc"]);
        assert_eq!(delta.removed, vec!["aa:aa"]);
        assert_eq!(reconciler.tracked().collect::<Vec<_>>(), vec!["bb:bb", "cc:cc"]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        for policy in [
            ReconcilePolicy::AddOnly,
            ReconcilePolicy::AddAndRemove,
            ReconcilePolicy::StaticAllowlist(vec!["aa:aa".to_string()]),
        ] {
            let mut reconciler = EntityReconciler::new(policy);
            let snap = snapshot(&["aa:aa", "bb:bb"]);

            reconciler.reconcile(&snap);
            let second = reconciler.reconcile(&snap);
            assert!(second.is_empty(), "second pass must be a no-op");
        }
    }

    #[test]
    fn test_static_allowlist_binds_to_first_snapshot() {
        let mut reconciler = EntityReconciler::new(ReconcilePolicy::StaticAllowlist(vec![
            "AA:AA".to_string(),
            "bb:bb".to_string(),
        ]));

        // bb:bb is allowlisted but absent from the first snapshot.
        let delta = reconciler.reconcile(&snapshot(&["aa:aa", "cc:cc"]));
        assert_eq!(delta.added, vec!["aa:aa"]);

        // It appears later; static tracking ignores it.
        let delta = reconciler.reconcile(&snapshot(&["aa:aa", "bb:bb"]));
        assert!(delta.is_empty());
        assert!(!reconciler.is_tracked("bb:bb"));
    }

    #[test]
    fn test_static_allowlist_never_tracks_unlisted_macs() {
        let mut reconciler =
            EntityReconciler::new(ReconcilePolicy::StaticAllowlist(vec!["aa:aa".to_string()]));

        for _ in 0..3 {
            reconciler.reconcile(&snapshot(&["aa:aa", "dd:dd"]));
        }
        assert!(reconciler.is_tracked("aa:aa"));
        assert!(!reconciler.is_tracked("dd:dd"));
    }
}
