//! The atomic binary hot-swap and its rollback.
//!
//! Replacing the executable of a running service is done with two renames in
//! the executable's own directory:
//!
//! ```text
//! current  → current-older     (backup; skipped on first install)
//! staging  → current           (install; undone if it fails)
//! ```
//!
//! # Crash Safety
//!
//! Same-directory rename is atomic on every supported filesystem, so at any
//! suspension point the directory holds either the old complete binary or
//! the new complete binary at `current` — never a partial file. Cross-device
//! moves are not supported: the staging path must resolve to the same device
//! as the install path.
//!
//! Rollback restores the backup and quarantines the failing binary at
//! `current-failed` instead of deleting it, so an operator can inspect what
//! refused to start.
//!
//! Filesystem access goes through the [`FileOps`] capability so tests can
//! observe and fail individual renames.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::process::{ProcessController, ProcessError, STOP_SETTLE};

/// Suffix of the retained previous binary (the rollback source).
pub const BACKUP_SUFFIX: &str = "-older";

/// Suffix of the quarantined binary after a failed start or health check.
pub const FAILED_SUFFIX: &str = "-failed";

/// Suffix of the staging file in the temp directory.
pub const STAGING_SUFFIX: &str = "-new";

/// Filesystem operations needed by the swap, as an injectable capability.
pub trait FileOps: Send + Sync {
    /// Renames `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes the file at `path`.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Production [`FileOps`] over `std::fs`.
pub struct OsFileOps;

impl FileOps for OsFileOps {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Errors from the two-rename swap.
#[derive(Debug, Error)]
pub enum SwapError {
    /// Renaming the current binary aside failed; nothing was changed.
    #[error("hot-swap backup rename failed: {0}")]
    Backup(#[source] io::Error),

    /// Installing the staged binary failed; the backup rename was undone.
    #[error("hot-swap install rename failed: {0}")]
    Install(#[source] io::Error),
}

/// Errors from rolling back a failed deployment.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// The backup could not be restored to the current path. The host is
    /// degraded and needs operator attention.
    #[error("rollback restore failed: {0}")]
    Restore(#[source] io::Error),

    /// The restored binary did not start.
    #[error("rollback restart failed: {0}")]
    Restart(#[source] ProcessError),
}

/// The per-request filesystem layout for one managed application.
#[derive(Debug, Clone)]
pub struct BinaryPaths {
    /// The live binary: `<path>/<executable>`.
    pub current: PathBuf,
    /// The previous binary retained for rollback: `current` + `-older`.
    pub backup: PathBuf,
    /// Download destination: `<temp_dir>/<app>` + `-new`.
    pub staging: PathBuf,
    /// Quarantine for a binary that failed: `current` + `-failed`.
    pub failed: PathBuf,
}

impl BinaryPaths {
    /// Derives the layout for an app from its install directory, executable
    /// name, and the agent's temp directory.
    #[must_use]
    pub fn derive(app_name: &str, path: &Path, executable: &str, temp_dir: &Path) -> Self {
        let current = path.join(executable);
        Self {
            backup: with_suffix(&current, BACKUP_SUFFIX),
            failed: with_suffix(&current, FAILED_SUFFIX),
            staging: temp_dir.join(format!("{app_name}{STAGING_SUFFIX}")),
            current,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Swaps the staged binary into place.
///
/// Returns the backup path when a previous binary existed, `None` on first
/// install (there is then no rollback source for this deployment).
///
/// # Errors
///
/// [`SwapError::Backup`] when the current binary could not be moved aside
/// (nothing changed on disk). [`SwapError::Install`] when the staged binary
/// could not be moved in; the backup rename has been undone, so `current`
/// again holds the old binary — the caller must restart the old process.
pub fn hot_swap(
    files: &dyn FileOps,
    current: &Path,
    staging: &Path,
) -> Result<Option<PathBuf>, SwapError> {
    let backup = if current.exists() {
        let backup = with_suffix(current, BACKUP_SUFFIX);
        files.rename(current, &backup).map_err(SwapError::Backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = files.rename(staging, current) {
        if let Some(backup) = &backup {
            if let Err(undo) = files.rename(backup, current) {
                tracing::error!(
                    current = %current.display(),
                    error = %undo,
                    "failed to undo backup rename after install failure"
                );
            }
        }
        return Err(SwapError::Install(e));
    }

    Ok(backup)
}

/// Rolls a failed deployment back to the previous binary.
///
/// Stops the service, waits [`STOP_SETTLE`], quarantines the failing binary
/// at the `-failed` path (best-effort, replacing a stale quarantine from an
/// earlier attempt), restores the backup, and restarts.
///
/// # Errors
///
/// [`RollbackError::Restore`] when the backup cannot be moved back — the
/// host then has no working binary at `current` and requires operator
/// attention. [`RollbackError::Restart`] when the restored binary fails to
/// launch.
pub async fn rollback(
    files: &dyn FileOps,
    process: &dyn ProcessController,
    service: &str,
    current: &Path,
    backup: &Path,
) -> Result<(), RollbackError> {
    if let Err(e) = process.stop(service).await {
        tracing::warn!(service, error = %e, "stop during rollback failed, continuing");
    }
    tokio::time::sleep(STOP_SETTLE).await;

    let failed = with_suffix(current, FAILED_SUFFIX);
    let _ = files.remove(&failed);
    if let Err(e) = files.rename(current, &failed) {
        tracing::warn!(
            current = %current.display(),
            error = %e,
            "failed to quarantine binary, continuing rollback"
        );
    }

    files
        .rename(backup, current)
        .map_err(RollbackError::Restore)?;

    process.start(current).await.map_err(RollbackError::Restart)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// FileOps wrapper that fails renames whose destination matches a
    /// configured substring, recording every call.
    struct FlakyFileOps {
        inner: OsFileOps,
        fail_dest_containing: Option<&'static str>,
        renames: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl FlakyFileOps {
        fn new(fail_dest_containing: Option<&'static str>) -> Self {
            Self {
                inner: OsFileOps,
                fail_dest_containing,
                renames: Mutex::new(Vec::new()),
            }
        }
    }

    impl FileOps for FlakyFileOps {
        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.renames
                .lock()
                .unwrap()
                .push((from.to_path_buf(), to.to_path_buf()));
            if let Some(needle) = self.fail_dest_containing {
                if to.to_string_lossy().contains(needle) {
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected"));
                }
            }
            self.inner.rename(from, to)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            self.inner.remove(path)
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn swap_moves_current_to_backup_and_staging_to_current() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("myapp");
        let staging = dir.path().join("myapp-new");
        write(&current, "old");
        write(&staging, "new");

        let backup = hot_swap(&OsFileOps, &current, &staging).unwrap();

        let backup = backup.expect("existing binary must produce a backup");
        assert_eq!(read(&current), "new");
        assert_eq!(read(&backup), "old");
        assert!(!staging.exists());
    }

    #[test]
    fn first_install_has_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("myapp");
        let staging = dir.path().join("myapp-new");
        write(&staging, "new");

        let backup = hot_swap(&OsFileOps, &current, &staging).unwrap();

        assert!(backup.is_none());
        assert_eq!(read(&current), "new");
    }

    #[test]
    fn failed_backup_rename_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("myapp");
        let staging = dir.path().join("myapp-new");
        write(&current, "old");
        write(&staging, "new");

        let files = FlakyFileOps::new(Some("-older"));
        let result = hot_swap(&files, &current, &staging);

        assert!(matches!(result, Err(SwapError::Backup(_))));
        assert_eq!(read(&current), "old");
        assert_eq!(read(&staging), "new");
    }

    #[test]
    fn failed_install_rename_restores_current() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("myapp");
        let staging = dir.path().join("other-device").join("myapp-new");
        std::fs::create_dir_all(staging.parent().unwrap()).unwrap();
        write(&current, "old");
        write(&staging, "new");

        // Fail the rename whose destination is `current` itself, after the
        // backup rename succeeded. The unwind rename targets `current` too,
        // so match on the staging source instead of the destination.
        struct FailInstall {
            inner: OsFileOps,
        }
        impl FileOps for FailInstall {
            fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
                if from.to_string_lossy().contains("-new") {
                    return Err(io::Error::new(io::ErrorKind::Other, "injected"));
                }
                self.inner.rename(from, to)
            }
            fn remove(&self, path: &Path) -> io::Result<()> {
                self.inner.remove(path)
            }
        }

        let result = hot_swap(&FailInstall { inner: OsFileOps }, &current, &staging);

        assert!(matches!(result, Err(SwapError::Install(_))));
        // Step 1 was undone: the old binary is back at current.
        assert_eq!(read(&current), "old");
    }

    #[test]
    fn derive_produces_the_documented_layout() {
        let paths = BinaryPaths::derive(
            "myapp",
            Path::new("/srv/myapp"),
            "myapp-bin",
            Path::new("/tmp/swapd"),
        );

        assert_eq!(paths.current, Path::new("/srv/myapp/myapp-bin"));
        assert_eq!(paths.backup, Path::new("/srv/myapp/myapp-bin-older"));
        assert_eq!(paths.failed, Path::new("/srv/myapp/myapp-bin-failed"));
        assert_eq!(paths.staging, Path::new("/tmp/swapd/myapp-new"));
    }

    mod rollback_tests {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use async_trait::async_trait;

        use super::*;

        struct RecordingController {
            stops: AtomicUsize,
            starts: AtomicUsize,
        }

        impl RecordingController {
            fn new() -> Self {
                Self {
                    stops: AtomicUsize::new(0),
                    starts: AtomicUsize::new(0),
                }
            }
        }

        #[async_trait]
        impl ProcessController for RecordingController {
            async fn stop(&self, _service: &str) -> Result<(), ProcessError> {
                self.stops.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            async fn start(&self, _exe_path: &Path) -> Result<(), ProcessError> {
                self.starts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        #[tokio::test]
        async fn rollback_quarantines_and_restores() {
            let dir = tempfile::tempdir().unwrap();
            let current = dir.path().join("myapp");
            let backup = dir.path().join("myapp-older");
            write(&current, "bad new binary");
            write(&backup, "good old binary");

            let controller = RecordingController::new();
            rollback(&OsFileOps, &controller, "myapp.service", &current, &backup)
                .await
                .unwrap();

            assert_eq!(read(&current), "good old binary");
            assert_eq!(read(&dir.path().join("myapp-failed")), "bad new binary");
            assert!(!backup.exists());
            assert_eq!(controller.stops.load(Ordering::SeqCst), 1);
            assert_eq!(controller.starts.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn rollback_replaces_stale_quarantine() {
            let dir = tempfile::tempdir().unwrap();
            let current = dir.path().join("myapp");
            let backup = dir.path().join("myapp-older");
            let failed = dir.path().join("myapp-failed");
            write(&current, "bad v3");
            write(&backup, "good v1");
            write(&failed, "bad v2 from last week");

            let controller = RecordingController::new();
            rollback(&OsFileOps, &controller, "myapp.service", &current, &backup)
                .await
                .unwrap();

            assert_eq!(read(&failed), "bad v3");
        }

        #[tokio::test]
        async fn missing_backup_is_restore_error() {
            let dir = tempfile::tempdir().unwrap();
            let current = dir.path().join("myapp");
            let backup = dir.path().join("myapp-older");
            write(&current, "bad");

            let controller = RecordingController::new();
            let result =
                rollback(&OsFileOps, &controller, "myapp.service", &current, &backup).await;

            assert!(matches!(result, Err(RollbackError::Restore(_))));
            assert_eq!(controller.starts.load(Ordering::SeqCst), 0);
        }
    }
}
