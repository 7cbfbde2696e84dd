//! Presence smoothing over raw gateway snapshots.
//!
//! A single missed scan should not flip a device to away. Every active
//! sighting advances a per-device last-seen instant; the device keeps
//! counting as home until the consider-home window since that instant
//! has elapsed.

use crate::gateway::Snapshot;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default grace window before an unseen device is reported away.
pub const DEFAULT_CONSIDER_HOME: Duration = Duration::from_secs(180);

#[derive(Debug)]
pub struct PresenceSmoother {
    consider_home: Duration,
    last_seen: HashMap<String, Instant>,
}

impl PresenceSmoother {
    pub fn new(consider_home: Duration) -> Self {
        Self {
            consider_home,
            last_seen: HashMap::new(),
        }
    }

    /// Advance last-seen for every host the snapshot reports active.
    ///
    /// Inactive or absent devices are left untouched; their timers keep
    /// aging toward the edge of the grace window.
    pub fn record(&mut self, snapshot: &Snapshot) {
        self.record_at(snapshot, Instant::now());
    }

    pub fn record_at(&mut self, snapshot: &Snapshot, now: Instant) {
        for host in snapshot.hosts() {
            if host.active {
                // Last-seen only ever advances.
                let seen = self
                    .last_seen
                    .entry(host.mac_address.clone())
                    .or_insert(now);
                *seen = (*seen).max(now);
            }
        }
    }

    /// Presence decision for one device against one snapshot.
    pub fn is_present(&self, mac: &str, snapshot: &Snapshot) -> bool {
        self.is_present_at(mac, snapshot, Instant::now())
    }

    /// Like [`is_present`](Self::is_present) with an injected clock.
    ///
    /// True if the snapshot reports the device active, or if it was last
    /// seen active less than the consider-home window ago. A device the
    /// gateway has never reported active is away.
    pub fn is_present_at(&self, mac: &str, snapshot: &Snapshot, now: Instant) -> bool {
        if snapshot.get(mac).is_some_and(|h| h.active) {
            return true;
        }
        match self.last_seen.get(mac) {
            Some(seen) => now.duration_since(*seen) < self.consider_home,
            None => false,
        }
    }

    pub fn last_seen(&self, mac: &str) -> Option<Instant> {
        self.last_seen.get(mac).copied()
    }

    pub fn consider_home(&self) -> Duration {
        self.consider_home
    }
}
