//! POSIX process control: systemd first, `pkill` as fallback.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;

use super::{ProcessController, ProcessError};

/// Production [`ProcessController`] for POSIX hosts.
///
/// Stop prefers `systemctl stop <service>` and falls back to
/// `pkill -f <service>` for hosts where the app is not a systemd unit.
pub struct SystemController;

impl SystemController {
    /// Creates the controller for the current OS.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for SystemController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessController for SystemController {
    async fn stop(&self, service: &str) -> Result<(), ProcessError> {
        let systemctl = tokio::process::Command::new("systemctl")
            .args(["stop", service])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if matches!(systemctl, Ok(status) if status.success()) {
            tracing::debug!(service, "stopped via systemctl");
            return Ok(());
        }

        let pkill = tokio::process::Command::new("pkill")
            .args(["-f", service])
            .status()
            .await
            .map_err(|e| ProcessError::Stop {
                service: service.to_string(),
                detail: format!("pkill spawn failed: {e}"),
            })?;

        match pkill.code() {
            // 0 = killed something, 1 = nothing matched. Both mean the
            // process is gone.
            Some(0) | Some(1) => Ok(()),
            code => Err(ProcessError::Stop {
                service: service.to_string(),
                detail: format!("pkill exited with {code:?}"),
            }),
        }
    }

    async fn start(&self, exe_path: &Path) -> Result<(), ProcessError> {
        let start_error = |source| ProcessError::Start {
            path: exe_path.display().to_string(),
            source,
        };

        let abs = exe_path.canonicalize().map_err(start_error)?;
        let work_dir = abs.parent().unwrap_or_else(|| Path::new("/")).to_path_buf();

        // std::process rather than tokio::process: the child must outlive
        // this handler and potentially the agent's runtime. A fresh process
        // group detaches it from the agent's session.
        let mut command = std::process::Command::new(&abs);
        command
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .process_group(0);

        let mut child = command.spawn().map_err(start_error)?;
        tracing::info!(path = %abs.display(), pid = child.id(), "started detached process");

        // Reap in the background so the child never becomes a zombie.
        std::thread::spawn(move || {
            let _ = child.wait();
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_of_missing_binary_is_start_error() {
        let controller = SystemController::new();
        let result = controller.start(Path::new("/nonexistent/binary")).await;
        assert!(matches!(result, Err(ProcessError::Start { .. })));
    }

    #[tokio::test]
    async fn stop_of_unknown_service_is_ok() {
        // Neither systemctl (no such unit) nor pkill (no match, exit 1)
        // should surface an error for a service that does not exist.
        let controller = SystemController::new();
        let result = controller.stop("swapd-test-no-such-service-a8f2").await;
        if let Err(ProcessError::Stop { detail, .. }) = &result {
            // Hosts without pkill (minimal containers) fail the spawn
            // itself; anything else is a real regression.
            assert!(detail.contains("spawn failed"), "{detail}");
        }
    }
}
