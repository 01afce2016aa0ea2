//! HTTP surface of the webhook daemon.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::DaemonState;
use crate::update::handle_update;

/// Builds the daemon's router: `POST /update` and `GET /health`.
///
/// Method routing answers 405 for anything but POST on `/update`.
pub fn router(state: Arc<DaemonState>) -> Router {
    Router::new()
        .route("/update", post(handle_update))
        .route("/health", get(health))
        .with_state(state)
}

/// The agent's own liveness endpoint (not to be confused with the managed
/// apps' readiness endpoints).
async fn health() -> &'static str {
    "OK"
}
