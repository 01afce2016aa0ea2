//! HMAC-SHA256 signature validation for deployment requests.
//!
//! Publishers sign the raw request body using HMAC-SHA256 with a shared
//! secret and send the result in the `X-Signature` header in the format
//! `sha256=<lowercase-hex>` (the GitHub webhook convention).
//!
//! # Security Properties
//!
//! - Signature comparison uses the `subtle` crate for constant-time
//!   equality; verification never short-circuits on byte position.
//! - The secret is wrapped in `SecretString` so it cannot leak through
//!   `Debug` formatting or accidental logging.
//! - Neither the secret nor the presented signature is ever logged.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 validator for publisher requests.
///
/// One validator is constructed at daemon startup from the
/// `DEPLOY_HMAC_SECRET` store entry and shared across request handlers.
#[derive(Clone)]
pub struct SignatureValidator {
    secret: SecretString,
}

impl SignatureValidator {
    /// Creates a validator with the given shared secret.
    ///
    /// The secret should be at least 32 bytes of cryptographically random
    /// data; length enforcement is the setup flow's responsibility, not the
    /// validator's.
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the HMAC-SHA256 signature of a request body.
    ///
    /// `signature_header` is the value of the `X-Signature` header.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::InvalidSignatureFormat`] when the header is
    /// missing the `sha256=` prefix or carries invalid hex, and
    /// [`WebhookError::SignatureMismatch`] when the decoded signature does
    /// not match the computed MAC.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        let signature_hex = signature_header
            .strip_prefix("sha256=")
            .ok_or_else(|| WebhookError::InvalidSignatureFormat("missing sha256= prefix".into()))?;

        let presented = hex::decode(signature_hex)
            .map_err(|e| WebhookError::InvalidSignatureFormat(format!("invalid hex: {e}")))?;

        let computed = compute_mac(&self.secret, payload);

        if computed.ct_eq(&presented).into() {
            Ok(())
        } else {
            tracing::warn!("update request signature verification failed");
            Err(WebhookError::SignatureMismatch)
        }
    }
}

/// Produces a `sha256=<hex>` signature for `payload` under `secret`.
///
/// This is the publisher side of the protocol, exposed so CI workflows and
/// test harnesses that share the library sign payloads exactly the way the
/// validator verifies them.
#[must_use]
pub fn sign(secret: &SecretString, payload: &[u8]) -> String {
    format!("sha256={}", hex::encode(compute_mac(secret, payload)))
}

fn compute_mac(secret: &SecretString, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SignatureValidator {
        SignatureValidator::new(SecretString::from("test-secret-key"))
    }

    #[test]
    fn valid_signature_verifies() {
        let payload = b"{\"app\":\"myapp\",\"version\":\"v1.2.3\"}";
        let header = sign(&SecretString::from("test-secret-key"), payload);

        assert!(validator().verify(payload, &header).is_ok());
    }

    #[test]
    fn wrong_secret_is_mismatch() {
        let payload = b"test payload";
        let header = sign(&SecretString::from("wrong-secret"), payload);

        let result = validator().verify(payload, &header);
        assert!(matches!(result, Err(WebhookError::SignatureMismatch)));
    }

    #[test]
    fn tampered_payload_is_mismatch() {
        let header = sign(&SecretString::from("test-secret-key"), b"original body");

        let result = validator().verify(b"tampered body", &header);
        assert!(matches!(result, Err(WebhookError::SignatureMismatch)));
    }

    #[test]
    fn missing_prefix_is_format_error() {
        let result = validator().verify(b"test payload", "abcdef1234567890");
        assert!(matches!(
            result,
            Err(WebhookError::InvalidSignatureFormat(_))
        ));
    }

    #[test]
    fn invalid_hex_is_format_error() {
        let result = validator().verify(b"test payload", "sha256=notvalidhex!!!");
        assert!(matches!(
            result,
            Err(WebhookError::InvalidSignatureFormat(_))
        ));
    }

    #[test]
    fn odd_length_hex_is_format_error() {
        let result = validator().verify(b"test payload", "sha256=abc");
        assert!(matches!(
            result,
            Err(WebhookError::InvalidSignatureFormat(_))
        ));
    }

    #[test]
    fn empty_payload_round_trips() {
        let secret = SecretString::from("test-secret-key");
        let header = sign(&secret, b"");

        assert!(validator().verify(b"", &header).is_ok());
    }

    #[test]
    fn large_payload_round_trips() {
        let payload = vec![0xab_u8; 100_000];
        let header = sign(&SecretString::from("test-secret-key"), &payload);

        assert!(validator().verify(&payload, &header).is_ok());
    }

    #[test]
    fn sign_emits_lowercase_hex_with_prefix() {
        let header = sign(&SecretString::from("k"), b"body");

        let hex_part = header.strip_prefix("sha256=").unwrap();
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex_part, hex_part.to_lowercase());
    }
}
