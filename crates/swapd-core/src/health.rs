//! Readiness probing of managed applications.
//!
//! Before stopping an app and after restarting it, the orchestrator asks the
//! app itself whether it can tolerate a restart. The app answers through a
//! small readiness document on its health endpoint:
//!
//! ```json
//! { "status": "ok", "can_restart": true }
//! ```
//!
//! Two endpoint styles are accepted. Apps that implement the structured
//! document get the full protocol: an explicitly present `can_restart` key is
//! authoritative, `false` meaning "in-flight work, do not interrupt". Plain
//! health endpoints that answer `200 OK` with an empty or non-JSON body are
//! treated as ready, so existing `/health` handlers keep working unchanged.
//!
//! `Busy` and `Down` are deliberately distinct outcomes: a busy app must not
//! be interrupted, while a down app may be in a crash loop that only a
//! deployment can fix.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Per-request timeout for a single probe attempt.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The app answered and is willing to be restarted.
    Ready,
    /// The app answered but reports it cannot be restarted right now.
    Busy,
    /// The app did not answer usefully (transport error or non-200).
    Down,
}

/// The readiness document an app may return from its health endpoint.
///
/// `can_restart` is an `Option` so that key presence is observable: an app
/// that omits the key entirely gets the status-based fallback, an app that
/// sends `"can_restart": false` is authoritatively busy.
#[derive(Debug, Deserialize)]
struct ReadinessDocument {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    can_restart: Option<bool>,
}

/// Probes an application's readiness endpoint.
#[async_trait]
pub trait HealthProber: Send + Sync {
    /// Probes `url` up to `max_retries` times, sleeping `interval` between
    /// attempts (never before the first). Returns the last attempt's
    /// classification; a `Ready` ends the loop early.
    async fn probe(&self, url: &str, max_retries: u32, interval: Duration) -> Readiness;
}

/// Production [`HealthProber`] over HTTP.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Creates a prober with a short per-request timeout.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn probe_once(&self, url: &str) -> Readiness {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url, error = %e, "health probe transport failure");
                return Readiness::Down;
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::debug!(url, status = status.as_u16(), "health probe non-200");
            return Readiness::Down;
        }

        match response.bytes().await {
            Ok(body) => classify_body(&body),
            Err(e) => {
                tracing::debug!(url, error = %e, "health probe body read failure");
                Readiness::Down
            }
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProber for HttpProber {
    async fn probe(&self, url: &str, max_retries: u32, interval: Duration) -> Readiness {
        let attempts = max_retries.max(1);
        let mut last = Readiness::Down;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(interval).await;
            }

            last = self.probe_once(url).await;
            if last == Readiness::Ready {
                return last;
            }
            tracing::debug!(url, attempt, outcome = ?last, "health probe attempt not ready");
        }

        last
    }
}

/// Classifies the body of a 200 response.
///
/// Empty and non-JSON bodies are accepted as ready (plain health endpoints).
/// For a parseable document, an explicitly present `can_restart` decides;
/// otherwise `status` of `ok`/`healthy` means ready and anything else means
/// busy.
fn classify_body(body: &[u8]) -> Readiness {
    if body.is_empty() {
        return Readiness::Ready;
    }

    let document: ReadinessDocument = match serde_json::from_slice(body) {
        Ok(document) => document,
        Err(_) => return Readiness::Ready,
    };

    if let Some(can_restart) = document.can_restart {
        return if can_restart {
            Readiness::Ready
        } else {
            Readiness::Busy
        };
    }

    match document.status.as_deref() {
        Some("ok") | Some("healthy") => Readiness::Ready,
        _ => Readiness::Busy,
    }
}
