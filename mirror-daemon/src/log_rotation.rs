//! Size-based rotation for the daemon log files.
//!
//! `daemon.log` → `daemon.log.1` → … → `daemon.log.5`; the oldest copy is
//! dropped. The daemon reopens its log files on every write, so a rotated
//! file is never written to again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotate once a file reaches this size (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated copies kept per log file.
pub const MAX_ROTATED_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_LOG_BYTES,
            max_files: MAX_ROTATED_FILES,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log_path` if it has reached `max_bytes`.
    ///
    /// Returns `true` if a rotation happened. A missing file is not an error.
    pub fn rotate_if_needed(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes || self.max_files == 0 {
            return Ok(false);
        }

        remove_if_exists(&numbered_path(log_path, self.max_files))?;
        for n in (1..self.max_files).rev() {
            let src = numbered_path(log_path, n);
            if src.exists() {
                fs::rename(&src, numbered_path(log_path, n + 1))?;
            }
        }
        fs::rename(log_path, numbered_path(log_path, 1))?;
        fs::File::create(log_path)?;
        Ok(true)
    }
}

/// Rotate both daemon logs under `home`; failures are logged, not returned.
pub fn rotate_logs(home: &Path) {
    let policy = RotationPolicy::default();
    for log_path in [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
    ] {
        match policy.rotate_if_needed(&log_path) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `daemon.log` + 2 → `daemon.log.2`
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small() -> RotationPolicy {
        RotationPolicy {
            max_bytes: 64,
            max_files: 3,
        }
    }

    #[test]
    fn under_threshold_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        fs::write(&log, "short").unwrap();
        assert!(!small().rotate_if_needed(&log).unwrap());
        assert!(!numbered_path(&log, 1).exists());
    }

    #[test]
    fn oversized_file_moves_to_dot_one_and_is_recreated_empty() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        fs::write(&log, vec![b'x'; 100]).unwrap();

        assert!(small().rotate_if_needed(&log).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(fs::metadata(numbered_path(&log, 1)).unwrap().len(), 100);
    }

    #[test]
    fn oldest_copy_is_dropped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("daemon.log");
        for round in 1..=5u8 {
            fs::write(&log, vec![b'0' + round; 100]).unwrap();
            small().rotate_if_needed(&log).unwrap();
        }
        assert!(numbered_path(&log, 3).exists());
        assert!(!numbered_path(&log, 4).exists());
        // Newest copy is from the last round.
        assert_eq!(fs::read(numbered_path(&log, 1)).unwrap()[0], b'5');
        assert_eq!(fs::read(numbered_path(&log, 3)).unwrap()[0], b'3');
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let rotated = RotationPolicy::default()
            .rotate_if_needed(&dir.path().join("nope.log"))
            .unwrap();
        assert!(!rotated);
    }

    #[test]
    fn numbered_path_appends_suffix() {
        assert_eq!(
            numbered_path(Path::new("/l/daemon-err.log"), 2),
            PathBuf::from("/l/daemon-err.log.2")
        );
    }
}
