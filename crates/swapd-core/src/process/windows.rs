//! Windows process control via `taskkill` and hidden detached spawn.

use std::os::windows::process::CommandExt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;

use super::{ProcessController, ProcessError};

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// `taskkill` exit code when no process matched the image name.
const TASKKILL_NOT_FOUND: i32 = 128;

/// Production [`ProcessController`] for Windows hosts.
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
        let status = tokio::process::Command::new("taskkill")
            .args(["/F", "/IM", service])
            .creation_flags(CREATE_NO_WINDOW)
            .status()
            .await
            .map_err(|e| ProcessError::Stop {
                service: service.to_string(),
                detail: format!("taskkill spawn failed: {e}"),
            })?;

        match status.code() {
            Some(0) | Some(TASKKILL_NOT_FOUND) => Ok(()),
            code => Err(ProcessError::Stop {
                service: service.to_string(),
                detail: format!("taskkill exited with {code:?}"),
            }),
        }
    }

    async fn start(&self, exe_path: &Path) -> Result<(), ProcessError> {
        let start_error = |source| ProcessError::Start {
            path: exe_path.display().to_string(),
            source,
        };

        let abs = exe_path.canonicalize().map_err(start_error)?;
        let work_dir = abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);

        let mut command = std::process::Command::new(&abs);
        command
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);

        let mut child = command.spawn().map_err(start_error)?;
        tracing::info!(path = %abs.display(), pid = child.id(), "started detached process");

        std::thread::spawn(move || {
            let _ = child.wait();
        });

        Ok(())
    }
}
