// Shared types between the reconciler and its collaborators

//! Shared data structures
//!
//! This module defines the tunnel status model, the per-status address sets
//! and the configuration structures deserialized from the config file.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Tunnel status as reported by a status source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TunnelStatus {
    /// Status could not be determined (initial value)
    #[default]
    Unknown,
    /// Tunnel is up
    Up,
    /// Tunnel is down
    Down,
}

impl TunnelStatus {
    /// Lowercase label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelStatus::Unknown => "unknown",
            TunnelStatus::Up => "up",
            TunnelStatus::Down => "down",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wanted ListenAddress values for every tunnel status
///
/// Immutable once built. An empty `unknown` set means the sshd config is left
/// untouched while the tunnel status is indeterminate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSets {
    up: Vec<String>,
    down: Vec<String>,
    unknown: Vec<String>,
}

impl AddressSets {
    /// Create address sets from the three per-status lists
    pub fn new(up: Vec<String>, down: Vec<String>, unknown: Vec<String>) -> Self {
        Self { up, down, unknown }
    }

    /// Addresses wanted for the given status
    pub fn for_status(&self, status: TunnelStatus) -> &[String] {
        match status {
            TunnelStatus::Up => &self.up,
            TunnelStatus::Down => &self.down,
            TunnelStatus::Unknown => &self.unknown,
        }
    }
}

impl From<&Config> for AddressSets {
    fn from(config: &Config) -> Self {
        Self::new(
            config.listen_addresses_up.clone(),
            config.listen_addresses_down.clone(),
            config.listen_addresses_unknown.clone(),
        )
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Addresses sshd listens on while the tunnel is up
    #[serde(rename = "up")]
    pub listen_addresses_up: Vec<String>,
    /// Addresses sshd listens on while the tunnel is down
    #[serde(rename = "down", default = "default_listen_addresses_down")]
    pub listen_addresses_down: Vec<String>,
    /// Addresses sshd listens on while the status is unknown (empty: leave as is)
    #[serde(rename = "unknown", default)]
    pub listen_addresses_unknown: Vec<String>,
    #[serde(default = "default_sshd_config_file")]
    pub sshd_config_file: PathBuf,
    /// WireGuard interface whose status is tracked
    #[serde(rename = "wg", default = "default_wireguard_interface")]
    pub wireguard_interface: String,
    #[serde(default = "default_ssh_service_name")]
    pub ssh_service_name: String,
    /// Prometheus textfile path, empty disables the metrics writer
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound for a single status query or service call (seconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
}

/// Default metrics file, a missing parent directory only disables metrics for this path
pub const DEFAULT_METRICS_FILE: &str = "/var/lib/node_exporter/ssh_aegis.prom";

// Default values for configuration
fn default_listen_addresses_down() -> Vec<String> {
    vec!["0.0.0.0".to_string()]
}

fn default_sshd_config_file() -> PathBuf {
    PathBuf::from("/etc/ssh/sshd_config")
}

fn default_wireguard_interface() -> String {
    "wg0".to_string()
}

fn default_ssh_service_name() -> String {
    "sshd".to_string()
}

fn default_metrics_file() -> String {
    DEFAULT_METRICS_FILE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_command_timeout() -> u64 {
    10
}
