// systemd service control via D-Bus

//! SSH service control
//!
//! This module defines the [`ServiceControl`] capability used to check for and
//! restart the SSH unit, and its implementation on top of systemd's D-Bus API.

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{Stream, StreamExt};
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use thiserror::Error;
use zbus::{proxy, Connection};

/// Errors reported by service control
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The unit is not known to the service manager
    #[error("Unit {unit} not found (load state: {load_state})")]
    NotFound { unit: String, load_state: String },

    /// The restart request was rejected
    #[error("Failed to restart {unit}: {source}")]
    Restart {
        unit: String,
        #[source]
        source: zbus::Error,
    },

    /// The restart job finished without the unit coming back up
    #[error("Restart of {unit} finished with result '{result}'")]
    RestartFailed { unit: String, result: String },

    /// The service manager did not answer in time
    #[error("{action} of {unit} timed out after {timeout:?}")]
    Timeout {
        unit: String,
        action: &'static str,
        timeout: Duration,
    },

    /// Communication with the service manager failed
    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),
}

/// Control over the SSH service unit
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Check that the SSH unit exists, failing with `NotFound` otherwise
    async fn unit_exists(&self) -> Result<(), ServiceError>;

    /// Restart the SSH unit and wait for the restart to finish
    async fn restart_ssh(&self) -> Result<(), ServiceError>;
}

/// D-Bus proxy for the systemd manager
#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
trait SystemdManager {
    /// Load a unit by name and return its object path
    fn load_unit(&self, name: &str) -> zbus::Result<zbus::zvariant::OwnedObjectPath>;

    /// Enable job and unit signals for this client
    fn subscribe(&self) -> zbus::Result<()>;

    /// Queue a restart job for a unit
    fn restart_unit(&self, name: &str, mode: &str)
        -> zbus::Result<zbus::zvariant::OwnedObjectPath>;

    /// Emitted when a job finishes; `result` is "done" on success
    #[zbus(signal)]
    fn job_removed(
        &self,
        id: u32,
        job: zbus::zvariant::OwnedObjectPath,
        unit: String,
        result: String,
    ) -> zbus::Result<()>;
}

/// D-Bus proxy for a systemd unit
#[proxy(
    interface = "org.freedesktop.systemd1.Unit",
    default_service = "org.freedesktop.systemd1"
)]
trait SystemdUnit {
    /// Load state, "loaded" for units with a unit file
    #[zbus(property)]
    fn load_state(&self) -> zbus::Result<String>;
}

/// Unit name used when none is configured
pub const DEFAULT_UNIT_NAME: &str = "sshd";

/// Normalize a unit name, appending `.service` when no unit type is given
pub fn unit_name(name: &str) -> String {
    let name = if name.is_empty() { DEFAULT_UNIT_NAME } else { name };

    if name.contains('.') {
        name.to_string()
    } else {
        format!("{}.service", name)
    }
}

/// Wait for the `(job path, result)` event of `job`
///
/// Returns `None` when the events end before the job is reported.
async fn wait_for_job<S>(events: S, job: &str) -> Option<String>
where
    S: Stream<Item = (String, String)>,
{
    let mut events = pin!(events);

    while let Some((path, result)) = events.next().await {
        if path == job {
            return Some(result);
        }
    }

    None
}

/// Map a finished job's result to the restart outcome
fn restart_outcome(unit: &str, result: &str) -> Result<(), ServiceError> {
    if result == "done" {
        return Ok(());
    }

    Err(ServiceError::RestartFailed {
        unit: unit.to_string(),
        result: result.to_string(),
    })
}

/// SSH unit managed by systemd
pub struct Systemd {
    unit: String,
    connection: Connection,
    timeout: Duration,
}

impl Systemd {
    /// Connect to the system bus for managing `unit`
    pub async fn new(unit: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let connection = Connection::system().await?;

        Ok(Self {
            unit: unit_name(unit),
            connection,
            timeout,
        })
    }

    /// Full unit name, including the type suffix
    pub fn unit(&self) -> &str {
        &self.unit
    }

    async fn bounded<T>(
        &self,
        action: &'static str,
        fut: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ServiceError::Timeout {
                unit: self.unit.clone(),
                action,
                timeout: self.timeout,
            })?
    }

    async fn load_state(&self) -> Result<String, ServiceError> {
        let manager = SystemdManagerProxy::new(&self.connection).await?;
        let path = manager.load_unit(&self.unit).await?;

        let unit = SystemdUnitProxy::builder(&self.connection)
            .path(&path)?
            .build()
            .await?;

        Ok(unit.load_state().await?)
    }

    async fn restart(&self) -> Result<(), ServiceError> {
        let manager = SystemdManagerProxy::new(&self.connection).await?;

        // Listen for job completion before queueing the job
        manager.subscribe().await?;
        let removed = manager.receive_job_removed().await?;

        let job = manager
            .restart_unit(&self.unit, "replace")
            .await
            .map_err(|source| ServiceError::Restart {
                unit: self.unit.clone(),
                source,
            })?;

        log::debug!("Queued restart job {} for {}", job.as_str(), self.unit);

        let events = removed.filter_map(|signal| {
            future::ready(
                signal
                    .args()
                    .ok()
                    .map(|args| (args.job().as_str().to_string(), args.result().to_string())),
            )
        });

        let result = wait_for_job(events, job.as_str())
            .await
            .unwrap_or_else(|| "no job completion signal".to_string());

        restart_outcome(&self.unit, &result)
    }
}

#[async_trait]
impl ServiceControl for Systemd {
    async fn unit_exists(&self) -> Result<(), ServiceError> {
        let load_state = self.bounded("Lookup", self.load_state()).await?;

        if load_state != "loaded" {
            return Err(ServiceError::NotFound {
                unit: self.unit.clone(),
                load_state,
            });
        }

        Ok(())
    }

    async fn restart_ssh(&self) -> Result<(), ServiceError> {
        log::info!("Restarting {}", self.unit);
        self.bounded("Restart", self.restart()).await
    }
}
