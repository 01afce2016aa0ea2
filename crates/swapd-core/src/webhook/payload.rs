//! The update request payload POSTed by a publisher.

use serde::{Deserialize, Serialize};

use super::error::WebhookError;

/// A request to deploy a new version of a managed application.
///
/// ```json
/// {
///   "app": "myapp",
///   "version": "v1.2.3",
///   "download_url": "https://api.github.com/repos/acme/myapp/releases/assets/123"
/// }
/// ```
///
/// `app` must match a configured application name; `version` is an opaque
/// tag compared against the app's current version for idempotence;
/// `download_url` is fetched with the stored GitHub PAT as bearer token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateRequest {
    /// Name of the managed application to update.
    pub app: String,

    /// Opaque version tag for the new binary.
    pub version: String,

    /// Authenticated URL of the new binary.
    pub download_url: String,
}

impl UpdateRequest {
    /// Parses an update request from a verified request body.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::InvalidPayload`] when the body is not valid
    /// JSON or any required field is missing or empty.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| WebhookError::InvalidPayload(format!("JSON parse error: {e}")))?;

        if request.app.is_empty() {
            return Err(WebhookError::InvalidPayload("app must not be empty".into()));
        }
        if request.version.is_empty() {
            return Err(WebhookError::InvalidPayload(
                "version must not be empty".into(),
            ));
        }
        if request.download_url.is_empty() {
            return Err(WebhookError::InvalidPayload(
                "download_url must not be empty".into(),
            ));
        }

        Ok(request)
    }
}
