//! OS-specific lifecycle control of managed services.
//!
//! Stop is best-effort: init systems and `pkill` report success while the
//! process may linger for a moment, so callers follow every stop with
//! [`STOP_SETTLE`] before touching the binary on disk. Start launches the
//! binary detached from the agent's own process group so the child survives
//! the request handler returning.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::SystemController;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::SystemController;

/// Settle delay after a stop before filesystem operations on the binary.
pub const STOP_SETTLE: Duration = Duration::from_millis(300);

/// Errors from controlling a managed process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The service could not be stopped.
    #[error("failed to stop {service}: {detail}")]
    Stop {
        /// Service identifier that was being stopped.
        service: String,
        /// What the stop command reported.
        detail: String,
    },

    /// The binary could not be launched.
    #[error("failed to start {path}: {source}")]
    Start {
        /// Binary that failed to launch.
        path: String,
        /// Underlying I/O error from the spawn.
        #[source]
        source: std::io::Error,
    },
}

/// Controls the lifecycle of a deployed application.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Stops the process identified by `service` (systemd unit name on
    /// POSIX, executable image name on Windows). "No such process" is
    /// success: the goal is the process being gone, not the kill landing.
    async fn stop(&self, service: &str) -> Result<(), ProcessError>;

    /// Launches the binary at `exe_path` in the background, detached from
    /// the agent.
    async fn start(&self, exe_path: &Path) -> Result<(), ProcessError>;
}
