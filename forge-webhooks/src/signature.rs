//! Webhook signature generation and verification

use crate::{Result, WebhookError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer over the exact request body bytes
#[derive(Clone)]
pub struct WebhookSignature {
    secret: Vec<u8>,
}

impl WebhookSignature {
    /// Create a signer with the decrypted secret
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Hex-encoded HMAC-SHA256 of the body
    pub fn sign(&self, body: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| WebhookError::Secret(format!("failed to generate SHA256 based HMAC: {}", e)))?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a hex signature against the body
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(body);
        // constant-time comparison
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for WebhookSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSignature")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signer = WebhookSignature::new("Jefe");
        let signature = signer.sign(b"what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = WebhookSignature::new("s3cr3t");
        let body = b"{\"trigger\":\"branch_created\"}\n";

        let signature = signer.sign(body).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signer.verify(body, &signature));
    }

    #[test]
    fn test_verify_wrong_secret() {
        let signature = WebhookSignature::new("secret1").sign(b"payload").unwrap();
        assert!(!WebhookSignature::new("secret2").verify(b"payload", &signature));
    }

    #[test]
    fn test_verify_tampered_body() {
        let signer = WebhookSignature::new("s3cr3t");
        let signature = signer.sign(b"payload").unwrap();
        assert!(!signer.verify(b"payload!", &signature));
        assert!(!signer.verify(b"payload", "not-hex"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", WebhookSignature::new("s3cr3t"));
        assert!(!debug.contains("s3cr3t"));
    }
}
