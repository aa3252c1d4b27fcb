// Listen-address reconciler

//! Reconciliation of sshd ListenAddress directives with the tunnel status
//!
//! The [`Reconciler`] is polled by the main loop. It only does work when the
//! observed tunnel status differs from the previous one: it then compares the
//! configured addresses with the wanted set, rewrites the sshd config when
//! they differ and asks the service manager to restart sshd.
//!
//! The config read in [`Reconciler::is_update_needed`] and the
//! read-modify-write in [`Reconciler::apply_addresses`] are not atomic together.
//! A single poller must own the reconciler.

use crate::metrics::{unix_now, Metrics};
use crate::service::ServiceControl;
use crate::sshd_config::{self, ConfigStore};
use crate::status::StatusSource;
use crate::types::{AddressSets, TunnelStatus};
use anyhow::Result;

/// Keeps sshd's ListenAddress lines in line with the tunnel status
pub struct Reconciler {
    config_store: Box<dyn ConfigStore>,
    status_source: Box<dyn StatusSource>,
    service: Box<dyn ServiceControl>,
    addresses: AddressSets,
    previous: TunnelStatus,
    metrics: Metrics,
}

impl Reconciler {
    /// Create a reconciler; the previous status starts out as `Unknown`
    pub fn new(
        config_store: Box<dyn ConfigStore>,
        status_source: Box<dyn StatusSource>,
        service: Box<dyn ServiceControl>,
        addresses: AddressSets,
    ) -> Self {
        Self {
            config_store,
            status_source,
            service,
            addresses,
            previous: TunnelStatus::Unknown,
            metrics: Metrics::default(),
        }
    }

    /// Last status seen by [`Reconciler::check`]
    pub fn previous_status(&self) -> TunnelStatus {
        self.previous
    }

    /// Current metrics snapshot
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Poll the tunnel status and reconcile on a transition
    ///
    /// Never fails: errors are logged and reflected in the metrics counters.
    pub async fn check(&mut self) {
        let status = self.status_source.status().await;
        self.metrics.status = status;

        if status == self.previous {
            log::debug!("Status unchanged: {}", status);
            return;
        }

        log::info!("Status changed: {} -> {}", self.previous, status);
        self.previous = status;
        self.metrics.last_status_change = Some(unix_now());

        if let Err(e) = self.upsert(status).await {
            log::error!("Could not reconcile ListenAddress for status {}: {:#}", status, e);
        }
    }

    /// Bring the sshd config in line with the addresses wanted for `status`
    pub async fn upsert(&mut self, status: TunnelStatus) -> Result<()> {
        let wanted = self.addresses.for_status(status).to_vec();

        if status == TunnelStatus::Unknown && wanted.is_empty() {
            log::debug!("Ignoring status 'unknown'");
            return Ok(());
        }

        if !self.is_update_needed(&wanted)? {
            log::info!("No updates needed");
            return Ok(());
        }

        log::info!("Updating ListenAddress configuration: {:?}", wanted);
        self.apply_addresses(&wanted)?;

        // The written config stays in place even when the restart fails
        if let Err(e) = self.service.restart_ssh().await {
            self.metrics.restart_ssh_errors += 1;
            log::error!("Failed to restart ssh service: {}", e);
        }

        Ok(())
    }

    /// Whether the configured addresses differ from `wanted`
    ///
    /// Addresses are compared as sets: same count and every wanted address
    /// present in the config.
    pub fn is_update_needed(&mut self, wanted: &[String]) -> Result<bool> {
        let lines = self.read_config()?;
        let configured = sshd_config::listen_addresses(&lines);

        if configured.len() != wanted.len() {
            return Ok(true);
        }

        Ok(!wanted.iter().all(|addr| configured.contains(addr)))
    }

    /// Replace all ListenAddress lines in the sshd config with `wanted`
    pub fn apply_addresses(&mut self, wanted: &[String]) -> Result<()> {
        let lines = self.read_config()?;

        log::debug!(
            "Replacing ListenAddress lines at {:?}",
            sshd_config::listen_address_indices(&lines)
        );
        let patched = sshd_config::patch_listen_addresses(&lines, wanted);

        if let Err(e) = self.config_store.write_lines(&patched) {
            self.metrics.write_config_errors += 1;
            return Err(e.context("Failed to write sshd config"));
        }

        Ok(())
    }

    fn read_config(&mut self) -> Result<Vec<String>> {
        self.config_store.read_lines().map_err(|e| {
            self.metrics.read_config_errors += 1;
            e.context("Failed to read sshd config")
        })
    }
}
