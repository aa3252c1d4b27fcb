// SSH Aegis Library
// Shared modules for daemon and tests

#![warn(missing_docs)]

//! SSH Aegis Library
//!
//! This library keeps sshd's `ListenAddress` directives in sync with the state
//! of a WireGuard tunnel: while the tunnel is up sshd listens on tunnel
//! addresses only, while it is down it falls back to another address set.
//!
//! # Main Components
//!
//! - [`config`]: Configuration file parsing and validation
//! - [`reconciler`]: Status transition detection and ListenAddress reconciliation
//! - [`sshd_config`]: sshd config access and the ListenAddress patch algorithm
//! - [`status`]: WireGuard tunnel status detection
//! - [`service`]: systemd control of the SSH unit
//! - [`metrics`]: Metrics snapshot and Prometheus textfile writer
//! - [`atomic_file`]: Temp-file-then-rename writes
//! - [`types`]: Shared data structures

pub mod atomic_file;
pub mod config;
pub mod metrics;
pub mod reconciler;
pub mod service;
pub mod sshd_config;
pub mod status;
pub mod types;
