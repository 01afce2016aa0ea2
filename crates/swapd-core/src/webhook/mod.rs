//! Publisher-facing webhook protocol: request signing and validation.
//!
//! A publisher (usually a GitHub Actions workflow) triggers a deployment by
//! POSTing an [`UpdateRequest`] to the agent, signed with a shared secret in
//! the `X-Signature` header. This module owns both sides of that contract:
//! [`SignatureValidator`] for the agent and [`sign`] for the publisher and
//! for test harnesses.

mod error;
mod payload;
mod signature;

pub use error::WebhookError;
pub use payload::UpdateRequest;
pub use signature::{sign, SignatureValidator};
