// Atomic file writes

//! Atomic file replacement
//!
//! Contents are written to `<path>.tmp` next to the target, flushed to disk and
//! then renamed over the target, so readers never observe a truncated file.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Path of the temporary file used while replacing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace the contents of `path` with `contents`
///
/// Permissions of an existing target are carried over to the new file. On
/// failure the temporary file is removed and the target is left untouched.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path(path);

    let result = write_and_rename(path, &tmp, contents);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_and_rename(path: &Path, tmp: &Path, contents: &[u8]) -> Result<()> {
    let mut file =
        File::create(tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;

    if let Ok(metadata) = fs::metadata(path) {
        file.set_permissions(metadata.permissions())
            .with_context(|| format!("Failed to set permissions on {}", tmp.display()))?;
    }

    file.write_all(contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", tmp.display()))?;
    drop(file);

    fs::rename(tmp, path)
        .with_context(|| format!("Failed to rename {} to {}", tmp.display(), path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/etc/ssh/sshd_config")),
            PathBuf::from("/etc/ssh/sshd_config.tmp")
        );
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, "old contents that are longer\n").unwrap();

        write_atomic(&path, b"new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_write_atomic_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh");

        write_atomic(&path, b"data").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "data");
    }

    #[test]
    fn test_write_atomic_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("file");

        assert!(write_atomic(&path, b"data").is_err());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sshd_config");
        fs::write(&path, "x\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        write_atomic(&path, b"y\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
