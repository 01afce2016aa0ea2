//! Error types for webhook request validation.

use thiserror::Error;

/// Errors that can occur while validating a publisher request.
///
/// The format/mismatch distinction exists for logging only. The HTTP layer
/// must collapse both signature failures into one indistinct 401 so a caller
/// probing the endpoint learns nothing about why verification failed.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The signature header is structurally invalid (missing `sha256=`
    /// prefix or non-hex payload).
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// The signature decoded cleanly but does not match the payload.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// The request body is not a valid update request.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
