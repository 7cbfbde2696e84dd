//! Gateway client module.
//!
//! Defines the host data model, the snapshot produced by one fetch, the
//! gateway failure taxonomy, and the client trait the coordinator polls.

mod http;

pub use http::HttpGatewayClient;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A client device as reported by the gateway in one fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Stable unique key. Normalized to lowercase when the snapshot is built.
    pub mac_address: String,
    /// Display name assigned by the gateway, if any.
    pub name: Option<String>,
    /// Hostname the device announced, if any.
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    /// True if the gateway currently sees this device connected.
    pub active: bool,
}

/// Normalize a MAC address for use as a snapshot key.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase()
}

/// The host set from one successful fetch, keyed by normalized MAC address.
///
/// Rebuilt wholesale every refresh cycle and never mutated afterwards.
/// Consumers hold it behind an `Arc` and always see a consistent view.
#[derive(Debug, Clone)]
pub struct Snapshot {
    hosts: HashMap<String, Host>,
    fetched_at: chrono::DateTime<chrono::Utc>,
}

impl Snapshot {
    /// Build a snapshot from a fetched host list.
    ///
    /// If the gateway returns the same MAC twice, the later entry wins.
    pub fn from_hosts(hosts: Vec<Host>) -> Self {
        let mut map = HashMap::with_capacity(hosts.len());
        for mut host in hosts {
            host.mac_address = normalize_mac(&host.mac_address);
            map.insert(host.mac_address.clone(), host);
        }
        Self {
            hosts: map,
            fetched_at: chrono::Utc::now(),
        }
    }

    pub fn get(&self, mac: &str) -> Option<&Host> {
        self.hosts.get(mac)
    }

    pub fn contains(&self, mac: &str) -> bool {
        self.hosts.contains_key(mac)
    }

    /// MAC addresses present in this snapshot, in no particular order.
    pub fn macs(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Wall-clock time this snapshot was built (for display only).
    pub fn fetched_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.fetched_at
    }
}

/// Gateway fetch failures, classified for the coordinator's retry policy.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credentials rejected. Fatal for the current configuration; the
    /// coordinator stops retrying until new credentials are supplied.
    #[error("gateway rejected credentials: {0}")]
    Authentication(String),

    /// Transient network or protocol problem. Retried on the next tick.
    #[error("gateway communication failed: {0}")]
    Communication(String),

    /// Anything that did not match a known failure mode. Retried like a
    /// communication failure but reported distinctly.
    #[error("unexpected gateway failure: {0}")]
    Unclassified(String),
}

/// One-fetch capability the coordinator polls.
///
/// Implementations must classify their failures: credential rejection as
/// [`GatewayError::Authentication`], everything network-shaped as
/// [`GatewayError::Communication`].
pub trait GatewayClient: Send + Sync {
    /// Fetch the current host list from the gateway.
    fn fetch_hosts(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Host>, GatewayError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(mac: &str, active: bool) -> Host {
        Host {
            mac_address: mac.to_string(),
            name: None,
            hostname: None,
            ip_address: None,
            active,
        }
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(normalize_mac("  aa:bb:cc:dd:ee:ff "), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_snapshot_keys_are_normalized() {
        let snapshot = Snapshot::from_hosts(vec![host("AA:BB:CC:DD:EE:FF", true)]);
        assert!(snapshot.contains("aa:bb:cc:dd:ee:ff"));
        assert_eq!(
            snapshot.get("aa:bb:cc:dd:ee:ff").unwrap().mac_address,
            "aa:bb:cc:dd:ee:ff"
        );
    }

    #[test]
    fn test_duplicate_macs_last_entry_wins() {
        let mut first = host("aa:bb:cc:dd:ee:ff", false);
        first.name = Some("old".to_string());
        let mut second = host("AA:BB:CC:DD:EE:FF", true);
        second.name = Some("new".to_string());

        let snapshot = Snapshot::from_hosts(vec![first, second]);
        assert_eq!(snapshot.len(), 1);
        let kept = snapshot.get("aa:bb:cc:dd:ee:ff").unwrap();
        assert!(kept.active);
        assert_eq!(kept.name.as_deref(), Some("new"));
    }
}
