//! Age-based cleanup of capture files.
//!
//! One sweeper watches one directory. Every interval it deletes the regular
//! files carrying the capture extension whose age exceeds the rule's maximum.
//! Only the immediate entries of the directory are considered.

use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::configuration::types::RetentionRule;
use crate::error_handling::types::RetentionError;

/// Deletes one file.
type RemoveFn = fn(&Path) -> io::Result<()>;

fn remove_file(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

#[derive(Clone)]
pub struct RetentionSweeper {
    rule: RetentionRule,
    extension: String,
    interval: Duration,
    remove: RemoveFn,
}

impl fmt::Debug for RetentionSweeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionSweeper")
            .field("rule", &self.rule)
            .field("extension", &self.extension)
            .field("interval", &self.interval)
            .finish()
    }
}

impl RetentionSweeper {
    pub fn new(rule: RetentionRule, extension: &str, interval: Duration) -> Self {
        Self {
            rule,
            extension: extension.trim_start_matches('.').to_string(),
            interval,
            remove: remove_file,
        }
    }

    #[cfg(test)]
    fn with_remover(mut self, remove: RemoveFn) -> Self {
        self.remove = remove;
        self
    }

    /// Sweeps immediately, then once per interval until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "[retention:{}] Sweeper started (max age {}s, every {}s)",
            self.rule.directory.display(),
            self.rule.max_age.as_secs(),
            self.interval.as_secs()
        );

        loop {
            let pass = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || pass.sweep()).await {
                warn!(
                    "[retention:{}] Sweep task failed: {}",
                    self.rule.directory.display(),
                    e
                );
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!("[retention:{}] Sweeper stopped", self.rule.directory.display());
    }

    /// One pass against the current time. Returns the number of files deleted.
    pub fn sweep(&self) -> usize {
        self.sweep_at(SystemTime::now())
    }

    /// One pass treating `now` as the current time.
    pub fn sweep_at(&self, now: SystemTime) -> usize {
        let dir = &self.rule.directory;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "[retention:{}] {}",
                    dir.display(),
                    RetentionError::ScanFailed(dir.clone(), e)
                );
                return 0;
            }
        };

        let mut deleted = 0;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(
                        "[retention:{}] {}",
                        dir.display(),
                        RetentionError::ScanFailed(dir.clone(), e)
                    );
                    continue;
                }
            };
            if !self.is_candidate(&path) {
                continue;
            }

            match self.expire(&path, now) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!("[retention:{}] {}", dir.display(), e),
            }
        }

        if deleted > 0 {
            info!("[retention:{}] Deleted {} expired file(s)", dir.display(), deleted);
        }
        deleted
    }

    fn is_candidate(&self, path: &Path) -> bool {
        path.extension() == Some(OsStr::new(&self.extension))
    }

    /// Deletes `path` if it is a regular file older than the rule allows.
    fn expire(&self, path: &Path, now: SystemTime) -> Result<bool, RetentionError> {
        let metadata = fs::symlink_metadata(path)
            .map_err(|e| RetentionError::MetadataFailed(path.to_path_buf(), e))?;
        if !metadata.is_file() {
            return Ok(false);
        }

        let born = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map_err(|e| RetentionError::MetadataFailed(path.to_path_buf(), e))?;
        // Timestamps in the future count as age zero.
        let age = now.duration_since(born).unwrap_or(Duration::ZERO);
        if age <= self.rule.max_age {
            return Ok(false);
        }

        match (self.remove)(path) {
            Ok(()) => {
                debug!(
                    "[retention:{}] Deleted {} ({}s old)",
                    self.rule.directory.display(),
                    path.display(),
                    age.as_secs()
                );
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "[retention:{}] {} vanished before it could be deleted",
                    self.rule.directory.display(),
                    path.display()
                );
                Ok(false)
            }
            Err(e) => Err(RetentionError::DeleteFailed(path.to_path_buf(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const MINUTE: Duration = Duration::from_secs(60);

    fn sweeper(dir: &Path, minutes: u64) -> RetentionSweeper {
        RetentionSweeper::new(
            RetentionRule::from_minutes(dir.to_path_buf(), minutes),
            "pcap",
            Duration::from_secs(60),
        )
    }

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"data").unwrap();
        path
    }

    #[test]
    fn test_old_file_is_deleted() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let file = touch(&dir, "a.pcap");

        let deleted = sweeper(dir.path(), 15).sweep_at(SystemTime::now() + 16 * MINUTE);

        assert_eq!(deleted, 1);
        assert!(!file.exists());
    }

    #[test]
    fn test_young_file_is_retained() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(&dir, "a.pcap");

        let deleted = sweeper(dir.path(), 15).sweep_at(SystemTime::now() + 14 * MINUTE);

        assert_eq!(deleted, 0);
        assert!(file.exists());
    }

    #[test]
    fn test_backup_rule_uses_its_own_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(&dir, "a.pcap");
        let backup = sweeper(dir.path(), 30);

        assert_eq!(backup.sweep_at(SystemTime::now() + 16 * MINUTE), 0);
        assert!(file.exists());
        assert_eq!(backup.sweep_at(SystemTime::now() + 31 * MINUTE), 1);
        assert!(!file.exists());
    }

    #[test]
    fn test_failed_delete_does_not_stop_the_pass() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let locked = touch(&dir, "locked.pcap");
        let first = touch(&dir, "a.pcap");
        let second = touch(&dir, "z.pcap");

        let sweeper = sweeper(dir.path(), 15).with_remover(|path| {
            if path.file_name() == Some(OsStr::new("locked.pcap")) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }
            fs::remove_file(path)
        });

        let deleted = sweeper.sweep_at(SystemTime::now() + 16 * MINUTE);

        assert_eq!(deleted, 2);
        assert!(locked.exists());
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn test_file_vanishing_before_delete_is_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(&dir, "a.pcap");
        let sweeper = sweeper(dir.path(), 15).with_remover(|path| {
            fs::remove_file(path)?;
            Err(io::Error::new(io::ErrorKind::NotFound, "already gone"))
        });

        assert_eq!(sweeper.sweep_at(SystemTime::now() + 16 * MINUTE), 0);
        assert!(!file.exists());
    }

    #[test]
    fn test_expire_reports_delete_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(&dir, "a.pcap");
        let sweeper = sweeper(dir.path(), 15).with_remover(|_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        });

        let res = sweeper.expire(&file, SystemTime::now() + 16 * MINUTE);

        assert!(matches!(res, Err(RetentionError::DeleteFailed(p, _)) if p == file));
    }

    #[test]
    fn test_other_extensions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let notes = touch(&dir, "notes.txt");
        let partial = touch(&dir, "a.pcap.tmp");
        let bare = touch(&dir, "pcap");

        let deleted = sweeper(dir.path(), 15).sweep_at(SystemTime::now() + 60 * MINUTE);

        assert_eq!(deleted, 0);
        assert!(notes.exists());
        assert!(partial.exists());
        assert!(bare.exists());
    }

    #[test]
    fn test_subdirectories_are_not_descended() {
        let dir = tempfile::tempdir().unwrap();
        let nested_dir = dir.path().join("old.pcap");
        fs::create_dir(&nested_dir).unwrap();
        let nested = nested_dir.join("inner.pcap");
        fs::write(&nested, b"data").unwrap();

        let deleted = sweeper(dir.path(), 15).sweep_at(SystemTime::now() + 60 * MINUTE);

        assert_eq!(deleted, 0);
        assert!(nested.exists());
    }

    #[test]
    fn test_missing_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("missing");

        assert_eq!(sweeper(&gone, 15).sweep(), 0);
    }

    #[test]
    fn test_extension_accepts_leading_dot() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(&dir, "a.pcap");
        let sweeper = RetentionSweeper::new(
            RetentionRule::from_minutes(dir.path().to_path_buf(), 15),
            ".pcap",
            Duration::from_secs(60),
        );

        assert_eq!(sweeper.sweep_at(SystemTime::now() + 16 * MINUTE), 1);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_run_sweeps_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let file = touch(&dir, "a.pcap");
        // Zero max age: anything with a past timestamp is expired.
        let sweeper = RetentionSweeper::new(
            RetentionRule {
                directory: dir.path().to_path_buf(),
                max_age: Duration::ZERO,
            },
            "pcap",
            Duration::from_millis(10),
        );

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!file.exists());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
