//! Shared state of the running daemon.

use std::path::PathBuf;
use std::sync::Arc;

use swapd_core::fetch::ArtifactFetcher;
use swapd_core::health::HealthProber;
use swapd_core::process::ProcessController;
use swapd_core::store::Store;
use swapd_core::swap::FileOps;
use swapd_core::webhook::SignatureValidator;
use swapd_core::Config;
use tokio::sync::RwLock;

use crate::locks::AppLocks;

/// Everything a request handler needs, shared behind one `Arc`.
///
/// The capability fields are trait objects so the integration tests can
/// substitute recording doubles for the network, process, and filesystem
/// sides of the pipeline.
pub struct DaemonState {
    /// Agent configuration. `version` fields mutate on commit; everything
    /// else is read-only after startup.
    pub config: RwLock<Config>,

    /// Where to persist the config after a commit. `None` disables
    /// persistence (embedded and test setups).
    pub config_path: Option<PathBuf>,

    /// Validator for the `X-Signature` header.
    pub validator: SignatureValidator,

    /// Secret store; the pipeline reads only the GitHub PAT from it.
    pub store: Arc<dyn Store>,

    /// Artifact download capability.
    pub fetcher: Arc<dyn ArtifactFetcher>,

    /// Readiness probe capability.
    pub prober: Arc<dyn HealthProber>,

    /// Service stop/start capability.
    pub process: Arc<dyn ProcessController>,

    /// Filesystem rename/remove capability for the swap.
    pub files: Arc<dyn FileOps>,

    /// Per-app update serialisation.
    pub locks: AppLocks,
}

impl DaemonState {
    /// Assembles daemon state with production capabilities.
    #[must_use]
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        validator: SignatureValidator,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            config_path,
            validator,
            store,
            fetcher: Arc::new(swapd_core::HttpFetcher::new()),
            prober: Arc::new(swapd_core::HttpProber::new()),
            process: Arc::new(swapd_core::SystemController::new()),
            files: Arc::new(swapd_core::OsFileOps),
            locks: AppLocks::new(),
        }
    }
}
