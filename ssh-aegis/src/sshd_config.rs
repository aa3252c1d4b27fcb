// sshd configuration access and ListenAddress patching

//! sshd configuration handling
//!
//! The sshd config is treated as an ordered list of raw lines. The only lines
//! this module understands are `ListenAddress` directives; everything else is
//! carried through untouched and in order.

use crate::atomic_file;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of a ListenAddress directive line (the trailing space is significant)
pub const LISTEN_ADDRESS_DIRECTIVE: &str = "ListenAddress ";

/// Line-oriented access to the sshd configuration
pub trait ConfigStore: Send + Sync {
    /// Read the configuration as an ordered list of lines
    fn read_lines(&self) -> Result<Vec<String>>;

    /// Replace the whole configuration with `lines`
    fn write_lines(&self, lines: &[String]) -> Result<()>;
}

/// sshd configuration stored in a file on disk
#[derive(Debug, Clone)]
pub struct SshdConfigFile {
    path: PathBuf,
}

impl SshdConfigFile {
    /// Create a store for the config file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for SshdConfigFile {
    fn read_lines(&self) -> Result<Vec<String>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        Ok(contents.lines().map(str::to_string).collect())
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        let mut contents = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }

        atomic_file::write_atomic(&self.path, contents.as_bytes())
    }
}

fn is_listen_address(line: &str) -> bool {
    line.starts_with(LISTEN_ADDRESS_DIRECTIVE)
}

/// Indices of all ListenAddress lines, ascending
pub fn listen_address_indices(lines: &[String]) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_listen_address(line))
        .map(|(idx, _)| idx)
        .collect()
}

/// Addresses of all ListenAddress lines, in file order
pub fn listen_addresses(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix(LISTEN_ADDRESS_DIRECTIVE))
        .map(str::to_string)
        .collect()
}

/// Format a single ListenAddress directive line
pub fn listen_address_line(address: &str) -> String {
    format!("{}{}", LISTEN_ADDRESS_DIRECTIVE, address)
}

/// Replace all ListenAddress lines with one line per `wanted` address
///
/// The new block takes the place of the first existing directive line, with
/// all other directive lines dropped. Without any existing directive the block
/// goes to the top of the file. All other lines keep their content and order.
pub fn patch_listen_addresses(lines: &[String], wanted: &[String]) -> Vec<String> {
    let block: Vec<String> = wanted.iter().map(|addr| listen_address_line(addr)).collect();

    let mut patched = Vec::with_capacity(lines.len() + block.len());
    let mut block = Some(block);

    for line in lines {
        if is_listen_address(line) {
            if let Some(block) = block.take() {
                patched.extend(block);
            }
        } else {
            patched.push(line.clone());
        }
    }

    // No directive found, insert at the start
    if let Some(mut block) = block {
        block.append(&mut patched);
        return block;
    }

    patched
}
