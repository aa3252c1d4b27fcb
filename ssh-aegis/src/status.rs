// WireGuard tunnel status source

//! Tunnel status detection
//!
//! This module defines the [`StatusSource`] capability queried on every poll
//! tick and its WireGuard implementation, which asks the kernel for the
//! interface's device state over netlink.

use crate::types::TunnelStatus;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use wireguard_control::{Backend, Device, InterfaceName};

/// Source of the current tunnel status
///
/// Implementations never fail: when the status cannot be determined they
/// report `Down` or `Unknown`. They must return well within one poll interval.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Current tunnel status
    async fn status(&self) -> TunnelStatus;
}

/// Validates that `name` is a usable kernel interface name.
/// Only allows alphanumeric characters, hyphens, and underscores.
///
/// # Errors
///
/// Returns an error if the name is empty or contains any other character.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Interface name cannot be empty");
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!(
            "Interface name contains invalid characters: '{}'. Only alphanumeric, hyphens, and underscores are allowed",
            name
        );
    }

    Ok(())
}

fn parse_interface_name(name: &str) -> Result<InterfaceName> {
    name.parse()
        .with_context(|| format!("Invalid interface name: {}", name))
}

/// Status of a kernel WireGuard interface
pub struct WgStatus {
    interface: String,
    timeout: Duration,
}

impl WgStatus {
    /// Create a status source for the given interface
    ///
    /// # Errors
    ///
    /// Returns an error if the interface name is invalid.
    pub fn new(interface: &str, timeout: Duration) -> Result<Self> {
        validate_interface_name(interface)?;
        parse_interface_name(interface)?;

        Ok(Self {
            interface: interface.to_string(),
            timeout,
        })
    }

    /// Query the device, returning its peer count
    async fn query(&self) -> Result<usize> {
        let iface = parse_interface_name(&self.interface)?;

        // Netlink calls are synchronous
        let query = tokio::task::spawn_blocking(move || {
            let device = Device::get(&iface, Backend::Kernel)
                .context("Failed to get WireGuard device info")?;
            Ok::<usize, anyhow::Error>(device.peers.len())
        });

        tokio::time::timeout(self.timeout, query)
            .await
            .with_context(|| format!("WireGuard query timed out after {:?}", self.timeout))?
            .context("Netlink task panicked")?
    }
}

#[async_trait]
impl StatusSource for WgStatus {
    async fn status(&self) -> TunnelStatus {
        match self.query().await {
            Ok(peers) => {
                log::debug!("WireGuard interface {} present with {} peer(s)", self.interface, peers);
                TunnelStatus::Up
            }
            Err(e) => {
                log::debug!("WireGuard interface {} unavailable: {:#}", self.interface, e);
                TunnelStatus::Down
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_interface_name_valid() {
        assert!(validate_interface_name("wg0").is_ok());
        assert!(validate_interface_name("my-vpn").is_ok());
        assert!(validate_interface_name("my_vpn").is_ok());
        assert!(validate_interface_name("WireGuard-VPN_123").is_ok());
    }

    #[test]
    fn test_validate_interface_name_invalid_chars() {
        assert!(validate_interface_name("wg 0").is_err());
        assert!(validate_interface_name("wg0.1").is_err());
        assert!(validate_interface_name("wg0/test").is_err());
        assert!(validate_interface_name("wg0\n").is_err());
        assert!(validate_interface_name("wg:0").is_err());
    }

    #[test]
    fn test_validate_interface_name_empty() {
        assert!(validate_interface_name("").is_err());
    }

    #[test]
    fn test_wg_status_creation() {
        assert!(WgStatus::new("wg0", Duration::from_secs(1)).is_ok());
        assert!(WgStatus::new("wg 0", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_wg_status_rejects_overlong_name() {
        // Kernel interface names are limited to 15 bytes
        assert!(WgStatus::new("wireguard-interface-0", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_missing_interface_is_down() {
        let source = WgStatus::new("sshaegis-none", Duration::from_secs(5)).unwrap();
        assert_eq!(source.status().await, TunnelStatus::Down);
    }
}
