// Configuration file parser

//! Configuration file parsing and validation
//!
//! This module loads the daemon configuration from a TOML or JSON file and
//! validates the listen address sets, paths and names it contains.

use crate::status::validate_interface_name;
use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::net::IpAddr;
use std::path::Path;

/// Load configuration from a TOML file, or JSON when the extension is `.json`
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).context("Failed to read config file")?;

    let config = parse_config(path, &contents)?;

    validate_config(&config)?;
    Ok(config)
}

fn parse_config(path: &Path, contents: &str) -> Result<Config> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(contents).context("Failed to parse JSON config file")
    } else {
        toml::from_str(contents).context("Failed to parse config file")
    }
}

/// Validate configuration values
pub fn validate_config(config: &Config) -> Result<()> {
    if config.listen_addresses_up == config.listen_addresses_down {
        anyhow::bail!("addresses for up and down are equal");
    }

    if config.listen_addresses_up.is_empty() {
        anyhow::bail!("no addresses configured for tunnel status 'up'");
    }

    if config.listen_addresses_down.is_empty() {
        anyhow::bail!("no addresses configured for tunnel status 'down'");
    }

    for addr in config
        .listen_addresses_up
        .iter()
        .chain(&config.listen_addresses_down)
        .chain(&config.listen_addresses_unknown)
    {
        validate_address(addr)?;
    }

    if !config.sshd_config_file.exists() {
        anyhow::bail!(
            "sshd config file does not exist: {}",
            config.sshd_config_file.display()
        );
    }

    if config.ssh_service_name.is_empty() {
        anyhow::bail!("empty ssh service name provided");
    }

    validate_interface_name(&config.wireguard_interface)
        .context("Invalid WireGuard interface name")?;

    if config.command_timeout == 0 {
        anyhow::bail!("command_timeout must be > 0");
    }

    Ok(())
}

/// Check that `addr` is an IPv4 or IPv6 literal
pub fn validate_address(addr: &str) -> Result<()> {
    addr.parse::<IpAddr>()
        .map(|_| ())
        .with_context(|| format!("invalid address supplied: {}", addr))
}

/// Log the effective configuration at startup
pub fn log_config(config: &Config) {
    log::info!("WireGuard interface: {}", config.wireguard_interface);
    log::info!("sshd config: {}", config.sshd_config_file.display());
    log::info!("SSH service: {}", config.ssh_service_name);
    log::info!("Addresses for status up: {:?}", config.listen_addresses_up);
    log::info!("Addresses for status down: {:?}", config.listen_addresses_down);
    if !config.listen_addresses_unknown.is_empty() {
        log::info!(
            "Addresses for status unknown: {:?}",
            config.listen_addresses_unknown
        );
    }
    if config.metrics_file.is_empty() {
        log::info!("Metrics: disabled");
    } else {
        log::info!("Metrics file: {}", config.metrics_file);
    }
}
