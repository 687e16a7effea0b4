//! HMAC-SHA256 message signatures
//!
//! The platform signs `message_id || timestamp || raw_body` with the shared
//! secret and sends `sha256=<hex>` in the signature header.

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::ConfigError;
use crate::webhook::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies webhook signatures against a shared secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Arc<[u8]>,
}

impl SignatureVerifier {
    /// Create a verifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySecret`] for an empty secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        Ok(Self {
            secret: Arc::from(secret),
        })
    }

    fn digest(&self, message_id: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(message_id.as_bytes());
        mac.update(timestamp.as_bytes());
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }

    /// Compute the header value the platform would send.
    pub fn sign(&self, message_id: &str, timestamp: &str, body: &[u8]) -> String {
        format!(
            "{}{}",
            SIGNATURE_PREFIX,
            hex::encode(self.digest(message_id, timestamp, body))
        )
    }

    /// Check a signature header in constant time.
    pub fn verify(
        &self,
        message_id: &str,
        timestamp: &str,
        body: &[u8],
        header: &str,
    ) -> Result<(), WebhookError> {
        let hex_part = header.strip_prefix(SIGNATURE_PREFIX).ok_or_else(|| {
            WebhookError::InvalidSignature(format!("signature must start with '{}'", SIGNATURE_PREFIX))
        })?;

        let provided = hex::decode(hex_part)
            .map_err(|_| WebhookError::InvalidSignature("signature is not valid hex".to_string()))?;

        let expected = self.digest(message_id, timestamp, body);

        if expected.ct_eq(provided.as_slice()).into() {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature("signature mismatch".to_string()))
        }
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}
