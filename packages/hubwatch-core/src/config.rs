//! Agent configuration.
//!
//! Load priority:
//! 1. Environment variables (`HUBWATCH_GATEWAY`, `HUBWATCH_PASSWORD`)
//! 2. Config file (`~/.config/hubwatch/config.toml`)
//! 3. Default values

use crate::coordinator::DEFAULT_POLL_INTERVAL;
use crate::presence::DEFAULT_CONSIDER_HOME;
use crate::reconcile::ReconcilePolicy;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default gateway address on a home network.
const DEFAULT_GATEWAY_HOST: &str = "192.168.1.1";

/// Default per-request timeout for gateway fetches.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable overriding the gateway address.
const ENV_GATEWAY_HOST: &str = "HUBWATCH_GATEWAY";
/// Environment variable overriding the gateway password.
const ENV_GATEWAY_PASSWORD: &str = "HUBWATCH_PASSWORD";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    gateway: Option<GatewaySection>,
    tracking: Option<TrackingSection>,
}

#[derive(Debug, Deserialize, Default)]
struct GatewaySection {
    /// Gateway address (e.g. "192.168.1.1")
    host: Option<String>,
    /// Gateway admin password
    password: Option<String>,
    poll_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingSection {
    consider_home_secs: Option<u64>,
    /// "add-only", "add-remove" or "static"
    policy: Option<String>,
    /// MAC allowlist, required for the "static" policy
    allowlist: Option<Vec<String>>,
}

/// Where the gateway address came from (for logging)
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Default,
    Environment,
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Runtime agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub gateway_host: String,
    pub password: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub consider_home: Duration,
    pub policy: ReconcilePolicy,
    pub source: ConfigSource,
}

/// Get the path to the configuration file
pub fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("hubwatch").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

fn parse_policy(name: &str, allowlist: Option<Vec<String>>) -> Result<ReconcilePolicy> {
    match name {
        "add-only" => Ok(ReconcilePolicy::AddOnly),
        "add-remove" => Ok(ReconcilePolicy::AddAndRemove),
        "static" => {
            let allowlist =
                allowlist.context("policy \"static\" requires a tracking.allowlist")?;
            if allowlist.is_empty() {
                bail!("policy \"static\" requires a non-empty tracking.allowlist");
            }
            Ok(ReconcilePolicy::StaticAllowlist(allowlist))
        }
        other => bail!(
            "unknown tracking policy {other:?} (expected \"add-only\", \"add-remove\" or \"static\")"
        ),
    }
}

/// Load the agent configuration.
///
/// The gateway address and password may come from the environment; the
/// remaining settings come from the config file or defaults. Fails if no
/// password is configured anywhere.
pub fn load_config() -> Result<AgentConfig> {
    let file = load_config_file().unwrap_or_default();
    let gateway = file.gateway.unwrap_or_default();
    let tracking = file.tracking.unwrap_or_default();

    let (gateway_host, source) = match std::env::var(ENV_GATEWAY_HOST) {
        Ok(host) if !host.trim().is_empty() => {
            tracing::info!("Using gateway address from environment variable: {}", host.trim());
            (host.trim().to_string(), ConfigSource::Environment)
        }
        _ => match gateway.host {
            Some(host) if !host.trim().is_empty() => {
                (host.trim().to_string(), ConfigSource::ConfigFile)
            }
            _ => {
                tracing::debug!("Using default gateway address: {}", DEFAULT_GATEWAY_HOST);
                (DEFAULT_GATEWAY_HOST.to_string(), ConfigSource::Default)
            }
        },
    };

    let password = match std::env::var(ENV_GATEWAY_PASSWORD) {
        Ok(password) if !password.is_empty() => password,
        _ => gateway.password.with_context(|| {
            format!(
                "gateway password not configured (set {} or gateway.password in {})",
                ENV_GATEWAY_PASSWORD,
                get_config_file_path_string()
            )
        })?,
    };

    let policy = match tracking.policy {
        Some(name) => parse_policy(&name, tracking.allowlist)?,
        None => ReconcilePolicy::AddOnly,
    };

    Ok(AgentConfig {
        gateway_host,
        password,
        poll_interval: gateway
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL),
        request_timeout: gateway
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        consider_home: tracking
            .consider_home_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONSIDER_HOME),
        policy,
        source,
    })
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/hubwatch/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Hubwatch Agent Configuration
# Place this file at: ~/.config/hubwatch/config.toml

[gateway]
# Gateway address on the local network
# Default: 192.168.1.1
# host = "192.168.1.1"

# Gateway admin password (or set HUBWATCH_PASSWORD)
# password = "secret"

# Seconds between refresh cycles (default: 30)
# poll_interval_secs = 30

# Per-request timeout in seconds (default: 10)
# request_timeout_secs = 10

[tracking]
# Seconds a device stays "home" after its last active sighting (default: 180)
# consider_home_secs = 180

# Reconciliation policy: "add-only", "add-remove" or "static"
# Default: add-only
# policy = "add-only"

# MAC allowlist, required when policy = "static"
# allowlist = ["aa:bb:cc:dd:ee:ff"]
"#
    .to_string()
}
