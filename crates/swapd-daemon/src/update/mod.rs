//! The update pipeline.
//!
//! One POST to `/update` runs this sequence:
//!
//! ```text
//! RECEIVE → VERIFY → PARSE → MATCH → PREFLIGHT_HEALTH
//!        → FETCH   → STOP  → SWAP  → START
//!        → POSTDEPLOY_HEALTH
//!        → {COMMIT | ROLLBACK}
//! ```
//!
//! The pipeline is a straight-line async sequence; per-app serialisation
//! comes from [`crate::locks::AppLocks`] (contenders get 409). The whole
//! pipeline runs in a spawned task, so a publisher disconnecting mid-request
//! cannot abort an in-flight swap — on-disk state stays consistent at every
//! suspension point either way, but a half-deployed, never-started binary
//! would still strand the host.
//!
//! Pre-flight policy: a single probe attempt. `Busy` aborts with 503 before
//! any side effect; `Down` proceeds, because a crash-looping app must remain
//! deployable. Publishers that want patience retry the request.

mod error;

pub use error::UpdateError;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use swapd_core::process::STOP_SETTLE;
use swapd_core::store::KEY_GITHUB_PAT;
use swapd_core::swap::{hot_swap, rollback, BinaryPaths};
use swapd_core::webhook::UpdateRequest;
use swapd_core::{AppRecord, Readiness, WebhookError};

use crate::state::DaemonState;

/// Header carrying the publisher's HMAC signature.
const SIGNATURE_HEADER: &str = "x-signature";

/// A successfully handled update request.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// A new binary was deployed and committed.
    Updated {
        /// App that was updated.
        app: String,
        /// Version now recorded as current.
        version: String,
    },
    /// The requested version is already deployed; nothing was done.
    AlreadyCurrent {
        /// App from the request.
        app: String,
        /// The version both sides agree on.
        version: String,
    },
}

impl IntoResponse for UpdateOutcome {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::Updated { app, version } => json!({
                "status": "updated",
                "app": app,
                "version": version,
            }),
            Self::AlreadyCurrent { app, version } => json!({
                "status": "already up to date",
                "app": app,
                "version": version,
            }),
        };
        Json(body).into_response()
    }
}

/// Axum handler for `POST /update`.
pub async fn handle_update(
    State(state): State<Arc<DaemonState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Detach the pipeline from the connection: a client disconnect drops
    // this handler future, not the spawned task.
    let task = tokio::spawn(run_pipeline(state, headers, body));

    match task.await {
        Ok(Ok(outcome)) => {
            tracing::info!(outcome = ?outcome, "update request handled");
            outcome.into_response()
        }
        Ok(Err(error)) => {
            tracing::warn!(
                status = error.status().as_u16(),
                error = %error,
                "update request failed"
            );
            error.into_response()
        }
        Err(join_error) => {
            tracing::error!(error = %join_error, "update pipeline task failed");
            UpdateError::Internal("pipeline task failed".into()).into_response()
        }
    }
}

async fn run_pipeline(
    state: Arc<DaemonState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<UpdateOutcome, UpdateError> {
    // VERIFY — over the raw body, before anything is parsed.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(UpdateError::MissingSignature)?;

    state.validator.verify(&body, signature).map_err(|e| {
        // Format vs mismatch is logged for the operator but collapsed for
        // the caller.
        tracing::debug!(kind = %e, "signature verification failed");
        UpdateError::Unauthorized
    })?;

    // PARSE.
    let request = UpdateRequest::parse(&body).map_err(|e| match e {
        WebhookError::InvalidPayload(detail) => UpdateError::InvalidPayload(detail),
        other => UpdateError::InvalidPayload(other.to_string()),
    })?;

    // MATCH — snapshot the app record; the per-app lock makes the snapshot
    // stable for the lifetime of the pipeline.
    let (app, temp_dir) = {
        let config = state.config.read().await;
        let app = config
            .find_app(&request.app)
            .cloned()
            .ok_or_else(|| UpdateError::UnknownApp(request.app.clone()))?;
        (app, config.temp_dir())
    };

    if !app.version.is_empty() && app.version == request.version {
        return Ok(UpdateOutcome::AlreadyCurrent {
            app: request.app,
            version: request.version,
        });
    }

    let _guard = state
        .locks
        .try_claim(&request.app)
        .ok_or_else(|| UpdateError::InFlight {
            app: request.app.clone(),
        })?;

    // PREFLIGHT_HEALTH — single attempt; see the module docs for policy.
    if let Some(url) = &app.health_url {
        match state.prober.probe(url, 1, app.health_interval()).await {
            Readiness::Busy => {
                return Err(UpdateError::Busy {
                    app: request.app.clone(),
                });
            }
            Readiness::Down => {
                tracing::warn!(
                    app = %request.app,
                    "app not answering pre-flight probe, deploying anyway"
                );
            }
            Readiness::Ready => {}
        }
    }

    let paths = BinaryPaths::derive(&app.name, &app.path, &app.executable, &temp_dir);

    // FETCH — to staging; no side effects under the app path yet.
    let token = state
        .store
        .get(KEY_GITHUB_PAT)
        .map_err(|e| UpdateError::Internal(format!("secret store failure: {e}")))?;
    state
        .fetcher
        .fetch(&request.download_url, &paths.staging, token.as_ref())
        .await?;
    tracing::info!(
        app = %request.app,
        version = %request.version,
        staging = %paths.staging.display(),
        "artifact staged"
    );

    // STOP — best-effort, then let the process actually die.
    if let Err(e) = state.process.stop(&app.service).await {
        tracing::warn!(service = %app.service, error = %e, "stop failed, continuing");
    }
    tokio::time::sleep(STOP_SETTLE).await;

    // SWAP.
    let backup = match hot_swap(state.files.as_ref(), &paths.current, &paths.staging) {
        Ok(backup) => backup,
        Err(e) => {
            // The swapper unwound; the old binary is back at current (or
            // was never touched). Bring the old process back up before
            // reporting failure so the host stays healthy.
            if let Err(restart) = state.process.start(&paths.current).await {
                tracing::error!(
                    path = %paths.current.display(),
                    error = %restart,
                    "failed to restart previous binary after swap failure"
                );
            }
            return Err(e.into());
        }
    };

    // START.
    if let Err(e) = state.process.start(&paths.current).await {
        let reason = format!("start failed: {e}");
        return Err(recover(&state, &app, &paths, backup.as_deref(), reason).await);
    }

    // POSTDEPLOY_HEALTH.
    tokio::time::sleep(app.startup_wait()).await;
    if let Some(url) = &app.health_url {
        let outcome = state
            .prober
            .probe(url, app.health_retry, app.health_interval())
            .await;
        if outcome != Readiness::Ready {
            return Err(recover(
                &state,
                &app,
                &paths,
                backup.as_deref(),
                format!("post-deploy health check failed ({outcome:?})"),
            )
            .await);
        }
    }

    // COMMIT.
    {
        let mut config = state.config.write().await;
        if let Some(record) = config.find_app_mut(&request.app) {
            record.version = request.version.clone();
        }
        if let Some(path) = &state.config_path {
            // Best-effort: the deployment already succeeded; a failed
            // rewrite only loses the version tag across an agent restart.
            if let Err(e) = config.persist(path) {
                tracing::warn!(error = %e, "failed to persist config after commit");
            }
        }
    }

    Ok(UpdateOutcome::Updated {
        app: request.app,
        version: request.version,
    })
}

/// Recovers from a failed start or failed post-deploy health check.
///
/// Rolls back to the previous binary when the app allows it and a backup
/// exists; otherwise the failure stands as-is (the new binary stays at
/// `current` for the operator).
async fn recover(
    state: &DaemonState,
    app: &AppRecord,
    paths: &BinaryPaths,
    backup: Option<&std::path::Path>,
    reason: String,
) -> UpdateError {
    let Some(backup) = backup else {
        tracing::error!(app = %app.name, reason = %reason, "deploy failed with no backup to restore");
        return UpdateError::DeployFailed { reason };
    };
    if !app.rollback {
        tracing::error!(app = %app.name, reason = %reason, "deploy failed, rollback disabled");
        return UpdateError::DeployFailed { reason };
    }

    tracing::warn!(app = %app.name, reason = %reason, "deploy failed, rolling back");
    match rollback(
        state.files.as_ref(),
        state.process.as_ref(),
        &app.service,
        &paths.current,
        backup,
    )
    .await
    {
        Ok(()) => UpdateError::RolledBack { reason },
        Err(e) => {
            tracing::error!(app = %app.name, error = %e, "rollback failed, host degraded");
            UpdateError::RollbackFailed {
                reason: format!("{reason}; {e}"),
            }
        }
    }
}
