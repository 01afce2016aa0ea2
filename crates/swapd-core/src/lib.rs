//! Core components of the swapd continuous-deployment agent.
//!
//! swapd replaces a long-running service binary with a newer version
//! delivered by a trusted publisher (typically a CI pipeline). This crate
//! holds the reusable pieces of that pipeline:
//!
//! - [`webhook`] — HMAC-SHA256 validation of publisher requests and the
//!   update payload itself
//! - [`health`] — readiness probing of managed applications
//! - [`fetch`] — authenticated streaming download of release artifacts
//! - [`process`] — OS-specific stop/start of managed services
//! - [`swap`] — the two-rename atomic binary swap and its rollback
//! - [`config`] — the YAML configuration file and its persistence
//! - [`store`] — the secret store capability consumed by the daemon
//!
//! The update orchestrator that sequences these lives in `swapd-daemon`.

pub mod config;
pub mod fetch;
pub mod health;
pub mod process;
pub mod store;
pub mod swap;
pub mod webhook;

pub use config::{AppRecord, Config, ConfigError};
pub use fetch::{ArtifactFetcher, FetchError, HttpFetcher};
pub use health::{HealthProber, HttpProber, Readiness};
pub use process::{ProcessController, ProcessError, SystemController, STOP_SETTLE};
pub use store::{EnvStore, MemoryStore, Store, StoreError};
pub use swap::{hot_swap, rollback, BinaryPaths, FileOps, OsFileOps, RollbackError, SwapError};
pub use webhook::{sign, SignatureValidator, UpdateRequest, WebhookError};
