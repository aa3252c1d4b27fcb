// SSH Aegis Daemon

use anyhow::{Context, Result};
use clap::Parser;
use ssh_aegis::{
    config::{self, load_config},
    metrics::{self, MetricsWriter},
    reconciler::Reconciler,
    service::{ServiceControl, Systemd},
    sshd_config::SshdConfigFile,
    status::WgStatus,
    types::AddressSets,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Interval between tunnel status checks (seconds)
/// The first check runs immediately at startup
const CHECK_INTERVAL_SECS: u64 = 15;

#[derive(Parser)]
#[command(name = "ssh-aegis", version)]
#[command(about = "Keeps sshd ListenAddress in sync with a WireGuard tunnel", long_about = None)]
struct Args {
    /// Path to configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, default_value = "/etc/ssh-aegis/config.toml")]
    config: PathBuf,

    /// Print debug logs
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    // Reconciliation is strictly sequential, a single thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .thread_name("ssh-aegis")
        .enable_time()
        .enable_io()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else {
        config.log_level.as_str()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("Starting ssh-aegis {}", env!("CARGO_PKG_VERSION"));
    config::log_config(&config);

    let timeout = Duration::from_secs(config.command_timeout);

    // Initialize components
    let status_source = WgStatus::new(&config.wireguard_interface, timeout)
        .context("Failed to create WireGuard status source")?;

    let service = Systemd::new(&config.ssh_service_name, timeout)
        .await
        .context("Failed to connect to systemd")?;

    log::info!("Checking if ssh service unit {} exists", service.unit());
    service
        .unit_exists()
        .await
        .context("Unit for ssh does not exist")?;

    let metrics_writer =
        metrics::build_metrics_writer(&config).context("Could not build metrics writer")?;

    let mut reconciler = Reconciler::new(
        Box::new(SshdConfigFile::new(&config.sshd_config_file)),
        Box::new(status_source),
        Box::new(service),
        AddressSets::from(&config),
    );

    // Set up signal handlers for graceful shutdown
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to set up SIGHUP handler")?;
    let mut sigquit = signal(SignalKind::quit()).context("Failed to set up SIGQUIT handler")?;

    let mut check_timer = check_timer();

    log::info!("Daemon started successfully");

    let mut metrics_failing = false;

    // Main event loop
    loop {
        tokio::select! {
            // Shutdown signals
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT");
                break;
            }
            _ = sighup.recv() => {
                log::info!("Received SIGHUP");
                break;
            }
            _ = sigquit.recv() => {
                log::info!("Received SIGQUIT");
                break;
            }

            _ = check_timer.tick() => {
                reconciler.check().await;

                if let Some(writer) = &metrics_writer {
                    dump_metrics(writer, &reconciler, &mut metrics_failing);
                }
            }
        }
    }

    log::info!("Bye");
    Ok(())
}

/// Poll timer; the first tick fires immediately
fn check_timer() -> Interval {
    let mut timer = interval(Duration::from_secs(CHECK_INTERVAL_SECS));
    // A slow check pushes the next one back instead of bursting
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Write the metrics file, warning once per streak of failures
fn dump_metrics(writer: &MetricsWriter, reconciler: &Reconciler, failing: &mut bool) {
    match writer.dump(reconciler.metrics()) {
        Ok(()) => {
            if *failing {
                log::info!("Metrics file {} writable again", writer.path().display());
            }
            *failing = false;
        }
        Err(e) => {
            if !*failing {
                log::warn!("Can not write metrics data: {:#}", e);
            }
            *failing = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_timer_delays_missed_ticks() {
        let timer = check_timer();
        assert_eq!(timer.missed_tick_behavior(), MissedTickBehavior::Delay);
        assert_eq!(timer.period(), Duration::from_secs(CHECK_INTERVAL_SECS));
    }
}
