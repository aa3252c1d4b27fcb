// Metrics snapshot and textfile writer

//!
//! The reconciler owns a [`Metrics`] snapshot; the poll loop periodically
//! renders it in Prometheus text exposition format and writes it to a file
//! for node_exporter's textfile collector.

use crate::atomic_file;
use crate::types::{Config, TunnelStatus, DEFAULT_METRICS_FILE};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Counters and gauges updated by the reconciler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Last observed tunnel status
    pub status: TunnelStatus,
    /// Unix timestamp of the last status transition
    pub last_status_change: Option<u64>,
    pub restart_ssh_errors: u64,
    pub read_config_errors: u64,
    pub write_config_errors: u64,
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Metrics {
    /// Render the snapshot in Prometheus text exposition format
    pub fn render(&self, now: u64) -> String {
        let status = |s: TunnelStatus| u8::from(s == self.status);

        format!(
            "# HELP ssh_aegis_timestamp_seconds the timestamp of the invocation
# TYPE ssh_aegis_timestamp_seconds gauge
ssh_aegis_timestamp_seconds {now}
# HELP ssh_aegis_status represents the status of the tunnel
# TYPE ssh_aegis_status gauge
ssh_aegis_status{{status=\"up\"}} {up}
ssh_aegis_status{{status=\"down\"}} {down}
ssh_aegis_status{{status=\"unknown\"}} {unknown}
# HELP ssh_aegis_last_status_change_timestamp_seconds timestamp of the last tunnel status change
# TYPE ssh_aegis_last_status_change_timestamp_seconds gauge
ssh_aegis_last_status_change_timestamp_seconds {last_change}
# HELP ssh_aegis_restart_ssh_errors Number of SSH restart errors encountered.
# TYPE ssh_aegis_restart_ssh_errors counter
ssh_aegis_restart_ssh_errors {restart_errors}
# HELP ssh_aegis_read_config_errors Number of errors encountered while reading the config.
# TYPE ssh_aegis_read_config_errors counter
ssh_aegis_read_config_errors {read_errors}
# HELP ssh_aegis_write_config_errors Number of errors encountered while writing the config.
# TYPE ssh_aegis_write_config_errors counter
ssh_aegis_write_config_errors {write_errors}
",
            up = status(TunnelStatus::Up),
            down = status(TunnelStatus::Down),
            unknown = status(TunnelStatus::Unknown),
            last_change = self.last_status_change.unwrap_or(0),
            restart_errors = self.restart_ssh_errors,
            read_errors = self.read_config_errors,
            write_errors = self.write_config_errors,
        )
    }
}

/// Writes metrics snapshots to a textfile
#[derive(Debug)]
pub struct MetricsWriter {
    path: PathBuf,
}

impl MetricsWriter {
    /// Create a writer for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render `metrics` and atomically replace the metrics file
    pub fn dump(&self, metrics: &Metrics) -> Result<()> {
        let contents = metrics.render(unix_now());
        atomic_file::write_atomic(&self.path, contents.as_bytes())
            .with_context(|| format!("Failed to write metrics to {}", self.path.display()))
    }
}

/// Build the metrics writer for a config
///
/// Returns `None` when metrics are disabled, or when the parent directory of
/// the default metrics file does not exist. A missing directory for a
/// user-provided path is an error.
pub fn build_metrics_writer(config: &Config) -> Result<Option<MetricsWriter>> {
    if config.metrics_file.is_empty() {
        return Ok(None);
    }

    let path = Path::new(&config.metrics_file);
    let base = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    if !base.is_dir() {
        if config.metrics_file == DEFAULT_METRICS_FILE {
            log::warn!(
                "Disabling metrics writer, path does not exist: {}",
                base.display()
            );
            return Ok(None);
        }
        anyhow::bail!(
            "Base path for writing metrics does not exist: {}",
            base.display()
        );
    }

    Ok(Some(MetricsWriter::new(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_config(metrics_file: &str) -> Config {
        toml::from_str::<Config>(r#"up = ["10.0.0.1"]"#)
            .map(|mut c| {
                c.metrics_file = metrics_file.to_string();
                c
            })
            .unwrap()
    }

    #[test]
    fn test_render_status_is_one_hot() {
        let metrics = Metrics {
            status: TunnelStatus::Up,
            ..Default::default()
        };
        let text = metrics.render(1700000000);

        assert!(text.contains("ssh_aegis_timestamp_seconds 1700000000\n"));
        assert!(text.contains("ssh_aegis_status{status=\"up\"} 1\n"));
        assert!(text.contains("ssh_aegis_status{status=\"down\"} 0\n"));
        assert!(text.contains("ssh_aegis_status{status=\"unknown\"} 0\n"));
    }

    #[test]
    fn test_render_counters() {
        let metrics = Metrics {
            status: TunnelStatus::Down,
            last_status_change: Some(1234),
            restart_ssh_errors: 2,
            read_config_errors: 3,
            write_config_errors: 4,
        };
        let text = metrics.render(0);

        assert!(text.contains("ssh_aegis_last_status_change_timestamp_seconds 1234\n"));
        assert!(text.contains("# TYPE ssh_aegis_restart_ssh_errors counter\n"));
        assert!(text.contains("ssh_aegis_restart_ssh_errors 2\n"));
        assert!(text.contains("ssh_aegis_read_config_errors 3\n"));
        assert!(text.contains("ssh_aegis_write_config_errors 4\n"));
    }

    #[test]
    fn test_render_full_document() {
        let metrics = Metrics {
            status: TunnelStatus::Down,
            last_status_change: Some(42),
            restart_ssh_errors: 1,
            read_config_errors: 0,
            write_config_errors: 5,
        };

        let expected = "\
# HELP ssh_aegis_timestamp_seconds the timestamp of the invocation
# TYPE ssh_aegis_timestamp_seconds gauge
ssh_aegis_timestamp_seconds 7
# HELP ssh_aegis_status represents the status of the tunnel
# TYPE ssh_aegis_status gauge
ssh_aegis_status{status=\"up\"} 0
ssh_aegis_status{status=\"down\"} 1
ssh_aegis_status{status=\"unknown\"} 0
# HELP ssh_aegis_last_status_change_timestamp_seconds timestamp of the last tunnel status change
# TYPE ssh_aegis_last_status_change_timestamp_seconds gauge
ssh_aegis_last_status_change_timestamp_seconds 42
# HELP ssh_aegis_restart_ssh_errors Number of SSH restart errors encountered.
# TYPE ssh_aegis_restart_ssh_errors counter
ssh_aegis_restart_ssh_errors 1
# HELP ssh_aegis_read_config_errors Number of errors encountered while reading the config.
# TYPE ssh_aegis_read_config_errors counter
ssh_aegis_read_config_errors 0
# HELP ssh_aegis_write_config_errors Number of errors encountered while writing the config.
# TYPE ssh_aegis_write_config_errors counter
ssh_aegis_write_config_errors 5
";
        assert_eq!(metrics.render(7), expected);
    }

    #[test]
    fn test_render_without_status_change() {
        let text = Metrics::default().render(0);
        assert!(text.contains("ssh_aegis_last_status_change_timestamp_seconds 0\n"));
        assert!(text.contains("ssh_aegis_status{status=\"unknown\"} 1\n"));
    }

    #[test]
    fn test_dump_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssh_aegis.prom");
        let writer = MetricsWriter::new(&path);

        writer.dump(&Metrics::default()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# HELP ssh_aegis_timestamp_seconds"));
        assert!(!atomic_file::temp_path(&path).exists());
    }

    #[test]
    fn test_build_metrics_writer_disabled() {
        let writer = build_metrics_writer(&test_config("")).unwrap();
        assert!(writer.is_none());
    }

    #[test]
    fn test_build_metrics_writer_invalid_path() {
        assert!(build_metrics_writer(&test_config("/nonexistent/metrics.prom")).is_err());
    }

    #[test]
    fn test_build_metrics_writer_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");

        let writer = build_metrics_writer(&test_config(path.to_str().unwrap()))
            .unwrap()
            .unwrap();
        assert_eq!(writer.path(), path);
    }

    #[test]
    fn test_build_metrics_writer_default_path_never_fails() {
        // Disabled with a warning when node_exporter's directory is missing
        let result = build_metrics_writer(&test_config(DEFAULT_METRICS_FILE)).unwrap();
        let base_exists = Path::new(DEFAULT_METRICS_FILE).parent().unwrap().is_dir();
        assert_eq!(result.is_some(), base_exists);
    }
}
