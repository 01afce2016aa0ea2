//! The single translation boundary from pipeline failures to HTTP.
//!
//! Components below the handler report typed errors with context; only this
//! enum decides HTTP status. The two signature failure kinds are collapsed
//! into one 401 before reaching this type so the response cannot reveal
//! which check failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use swapd_core::fetch::FetchError;
use swapd_core::swap::SwapError;
use thiserror::Error;

/// A failed update request, ready to become an HTTP response.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The `X-Signature` header is absent.
    #[error("missing signature")]
    MissingSignature,

    /// The signature did not verify (format and mismatch indistinct).
    #[error("invalid signature")]
    Unauthorized,

    /// The body is not a valid update request.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The requested app is not configured on this host.
    #[error("app not configured: {0}")]
    UnknownApp(String),

    /// Pre-flight probe says the app cannot be restarted right now.
    #[error("{app} is busy and cannot be restarted now")]
    Busy {
        /// App that reported busy.
        app: String,
    },

    /// Another update for the same app is already running.
    #[error("an update for {app} is already in progress")]
    InFlight {
        /// App with the in-flight update.
        app: String,
    },

    /// Downloading the artifact failed; nothing on disk was touched.
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),

    /// The binary swap failed; the previous binary is back in place.
    #[error("swap failed: {0}")]
    Swap(#[from] SwapError),

    /// The deployment failed and no rollback was possible (rollback
    /// disabled, or first install with no previous binary).
    #[error("deploy failed: {reason}")]
    DeployFailed {
        /// What went wrong after the swap.
        reason: String,
    },

    /// The deployment failed and the previous binary was restored.
    #[error("deploy failed, rolled back to previous version: {reason}")]
    RolledBack {
        /// What went wrong after the swap.
        reason: String,
    },

    /// The deployment failed and the rollback failed too. The host is
    /// degraded and requires operator attention.
    #[error("deploy failed and rollback failed: {reason}")]
    RollbackFailed {
        /// Combined failure description.
        reason: String,
    },

    /// Infrastructure failure outside the pipeline proper (secret store,
    /// task join).
    #[error("internal error: {0}")]
    Internal(String),
}

impl UpdateError {
    /// HTTP status for this failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingSignature | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::UnknownApp(_) => StatusCode::NOT_FOUND,
            Self::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::InFlight { .. } => StatusCode::CONFLICT,
            Self::Fetch(_)
            | Self::Swap(_)
            | Self::DeployFailed { .. }
            | Self::RolledBack { .. }
            | Self::RollbackFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UpdateError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.to_string() });

        // The rollback outcome is machine-readable so publishers can alert
        // differently on "your build was bad" vs "the host needs a human".
        match &self {
            Self::RolledBack { .. } => {
                body["rollback"] = json!("executed");
            }
            Self::RollbackFailed { .. } => {
                body["rollback"] = json!("failed");
            }
            _ => {}
        }

        (self.status(), Json(body)).into_response()
    }
}
