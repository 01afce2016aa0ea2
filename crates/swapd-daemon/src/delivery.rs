//! Delivery variants.
//!
//! "Delivery" is how a new build reaches its target: the webhook daemon
//! implemented here, or external collaborators such as SSH script
//! generation or an edge-platform upload. Variants are a tagged capability
//! behind [`Delivery`], and the set in play is injected explicitly through
//! [`DeliverySet`] — no process-wide mutable registry. Only the webhook
//! variant enters the update pipeline; other variants bypass it entirely.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::server::router;
use crate::state::DaemonState;

/// Errors from running a delivery variant.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No variant with the requested name was injected.
    #[error("unknown delivery method: {0}")]
    Unknown(String),

    /// The webhook server could not bind or serve.
    #[error("webhook server failure: {0}")]
    Server(#[source] std::io::Error),
}

/// One way of delivering a build to its target.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Unique tag for this variant, matched against the stored
    /// `DEPLOY_METHOD` (case-insensitive).
    fn name(&self) -> &'static str;

    /// Runs the variant until it finishes or fails. The webhook variant
    /// serves forever.
    async fn run(&self, state: Arc<DaemonState>) -> Result<(), DeliveryError>;
}

/// The injected set of available delivery variants.
pub struct DeliverySet {
    deliveries: Vec<Arc<dyn Delivery>>,
}

impl DeliverySet {
    /// Builds a set from explicitly injected variants.
    #[must_use]
    pub fn new(deliveries: Vec<Arc<dyn Delivery>>) -> Self {
        Self { deliveries }
    }

    /// Looks up a variant by tag, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Unknown`] when no injected variant matches.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Delivery>, DeliveryError> {
        self.deliveries
            .iter()
            .find(|delivery| delivery.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| DeliveryError::Unknown(name.to_string()))
    }

    /// Tags of all injected variants.
    #[must_use]
    pub fn available(&self) -> Vec<&'static str> {
        self.deliveries.iter().map(|d| d.name()).collect()
    }
}

/// The webhook delivery: an HTTP daemon the publisher POSTs updates to.
pub struct WebhookDelivery;

#[async_trait]
impl Delivery for WebhookDelivery {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn run(&self, state: Arc<DaemonState>) -> Result<(), DeliveryError> {
        let port = state.config.read().await.port;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(DeliveryError::Server)?;
        tracing::info!(%addr, "deploy agent listening");

        axum::serve(listener, router(state))
            .await
            .map_err(DeliveryError::Server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let set = DeliverySet::new(vec![Arc::new(WebhookDelivery)]);

        assert!(set.get("webhook").is_ok());
        assert!(set.get("WebHook").is_ok());
        assert!(matches!(set.get("ssh"), Err(DeliveryError::Unknown(_))));
    }

    #[test]
    fn available_lists_injected_tags() {
        let set = DeliverySet::new(vec![Arc::new(WebhookDelivery)]);
        assert_eq!(set.available(), vec!["webhook"]);
    }
}
