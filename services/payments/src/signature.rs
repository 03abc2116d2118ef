//! Webhook signature verification
//!
//! Header format: `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`, where each `v1`
//! is HMAC-SHA256 over `"<t>.<raw body>"` keyed with the endpoint secret.
//! Verification is pure computation over the request; it never performs I/O.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use types::errors::PaymentError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Maximum accepted age (and clock skew) of a signed delivery.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Verify against the current wall clock.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), PaymentError> {
        self.verify_at(payload, header, unix_now())
    }

    /// Verify as of `now` (Unix seconds).
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), PaymentError> {
        let parsed = parse_header(header)?;

        let age = (now - parsed.timestamp).unsigned_abs();
        if age > self.tolerance.as_secs() {
            return Err(PaymentError::invalid_signature(format!(
                "timestamp outside tolerance ({}s)",
                age
            )));
        }

        for candidate in &parsed.signatures {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            if self.mac(parsed.timestamp, payload)?.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }
        Err(PaymentError::invalid_signature("no matching v1 signature"))
    }

    /// Produce a header value for `payload` signed at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, PaymentError> {
        let digest = self.mac(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }

    pub fn sign_now(&self, payload: &[u8]) -> Result<String, PaymentError> {
        self.sign(payload, unix_now())
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, PaymentError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| PaymentError::invalid_signature("unusable signing secret"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::invalid_signature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(PaymentError::invalid_signature("missing v1 signature"));
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_760_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    #[test]
    fn test_signed_payload_verifies() {
        let verifier = WebhookVerifier::new(SECRET);
        let header = verifier.sign(BODY, NOW).unwrap();
        assert!(header.starts_with("t=1760000000,v1="));
        verifier.verify_at(BODY, &header, NOW + 10).unwrap();
    }

    #[test]
    fn test_tampered_body_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let header = verifier.sign(BODY, NOW).unwrap();
        let err = verifier.verify_at(b"{\"id\":\"evt_2\"}", &header, NOW).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature { .. }));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = WebhookVerifier::new("whsec_other").sign(BODY, NOW).unwrap();
        assert!(WebhookVerifier::new(SECRET).verify_at(BODY, &header, NOW).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        let header = verifier.sign(BODY, NOW).unwrap();
        assert!(verifier.verify_at(BODY, &header, NOW + 301).is_err());
        assert!(verifier.verify_at(BODY, &header, NOW - 301).is_err());
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let verifier = WebhookVerifier::new(SECRET);
        let good = verifier.sign(BODY, NOW).unwrap();
        let good_sig = good.split_once("v1=").unwrap().1;
        let header = format!("t={},v1=deadbeef,v0=abc,v1={}", NOW, good_sig);
        verifier.verify_at(BODY, &header, NOW).unwrap();
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let verifier = WebhookVerifier::new(SECRET);
        for header in ["", "garbage", "t=abc,v1=00", "v1=00", &format!("t={}", NOW)] {
            assert!(verifier.verify_at(BODY, header, NOW).is_err(), "{header}");
        }
    }
}
