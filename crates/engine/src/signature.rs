//! Webhook payload authentication.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::EngineError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the shared-secret HMAC-SHA256 signature a payment provider
/// sends over the raw webhook body.
///
/// Verification happens before any processing; a mismatch rejects the
/// delivery with no state change. The comparison is constant-time.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl SignatureVerifier {
    /// Creates a verifier for the given shared secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Verifies a hex-encoded signature over the raw request body.
    pub fn verify(&self, body: &[u8], signature_hex: &str) -> Result<(), EngineError> {
        let signature = hex::decode(signature_hex).map_err(|_| EngineError::SignatureInvalid)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(body);
        mac.verify_slice(&signature)
            .map_err(|_| EngineError::SignatureInvalid)
    }

    /// Computes the hex signature for a body (the sender side; used by
    /// tests and tooling).
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let verifier = SignatureVerifier::new("test-secret");
        let body = br#"{"idempotency_key":"k","order_reference":"r","status":"success"}"#;

        let signature = verifier.sign(body);
        assert!(verifier.verify(body, &signature).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let verifier = SignatureVerifier::new("test-secret");
        let signature = verifier.sign(b"original");

        let err = verifier.verify(b"tampered", &signature).unwrap_err();
        assert!(matches!(err, EngineError::SignatureInvalid));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let signer = SignatureVerifier::new("secret-a");
        let verifier = SignatureVerifier::new("secret-b");
        let body = b"payload";

        let signature = signer.sign(body);
        assert!(verifier.verify(body, &signature).is_err());
    }

    #[test]
    fn malformed_hex_is_rejected() {
        let verifier = SignatureVerifier::new("test-secret");
        let err = verifier.verify(b"payload", "not-hex!").unwrap_err();
        assert!(matches!(err, EngineError::SignatureInvalid));
    }
}
