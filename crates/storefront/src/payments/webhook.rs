//! Webhook signature verification.
//!
//! The platform signs each delivery with a `Stripe-Signature` header of the
//! form `t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The HMAC-SHA256 is taken
//! over `"{t}.{raw body}"` with the endpoint secret. A delivery is trusted
//! only if some `v1` value matches and `t` is within the tolerance window.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Default maximum age of a signed delivery.
pub const TOLERANCE_SECS: i64 = 300;

/// Why a webhook delivery was rejected.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// A verified webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Id of the object the event concerns (`pi_...`, `seti_...`).
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(serde_json::Value::as_str)
    }
}

/// Verifies webhook deliveries against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(WebhookError::MalformedHeader);
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::MalformedHeader)?,
                );
            }
            "v1" if !value.is_empty() => signatures.push(value),
            // v0 and future schemes are ignored
            _ => {}
        }
    }

    match (timestamp, signatures.is_empty()) {
        (Some(timestamp), false) => Ok(ParsedHeader {
            timestamp,
            signatures,
        }),
        _ => Err(WebhookError::MalformedHeader),
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Hex HMAC of `"{timestamp}.{payload}"`.
    fn sign(&self, timestamp: i64, payload: &[u8]) -> Result<String, WebhookError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Build a header value for `payload` signed at `timestamp`.
    ///
    /// Used by tests and local tooling that replay deliveries.
    ///
    /// # Errors
    ///
    /// Fails only if the secret cannot key an HMAC.
    pub fn signature_header(&self, timestamp: i64, payload: &[u8]) -> Result<String, WebhookError> {
        Ok(format!("t={timestamp},v1={}", self.sign(timestamp, payload)?))
    }

    /// Check the signature and parse the event.
    ///
    /// # Errors
    ///
    /// Returns a [`WebhookError`] if the header is missing or malformed, the
    /// timestamp is too old or too far in the future, no signature matches,
    /// or the verified payload is not an event.
    #[instrument(skip_all)]
    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookEvent, WebhookError> {
        let header = header
            .filter(|h| !h.trim().is_empty())
            .ok_or(WebhookError::MissingHeader)?;
        let parsed = parse_header(header)?;

        if (now.timestamp() - parsed.timestamp).abs() > TOLERANCE_SECS {
            return Err(WebhookError::TimestampOutOfTolerance);
        }

        let expected = self.sign(parsed.timestamp, payload)?;
        if !parsed
            .signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            return Err(WebhookError::SignatureMismatch);
        }

        let event: WebhookEvent = serde_json::from_slice(payload)?;
        debug!(event_id = %event.id, event_type = %event.event_type, "Webhook signature verified");
        Ok(event)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const PAYLOAD: &[u8] =
        br#"{"id":"evt_1","type":"payment_intent.succeeded","created":1700000000,"data":{"object":{"id":"pi_1"}}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from(SECRET))
    }

    /// Independent signer mirroring the platform's scheme.
    fn platform_signature(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let signed_payload = format!("{timestamp}.{}", String::from_utf8_lossy(payload));
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let now = Utc::now();
        let header = format!(
            "t={},v1={}",
            now.timestamp(),
            platform_signature(PAYLOAD, SECRET, now.timestamp())
        );
        let event = verifier().verify(PAYLOAD, Some(&header), now).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.object_id(), Some("pi_1"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let now = Utc::now();
        let header = format!(
            "t={},v1={}",
            now.timestamp(),
            platform_signature(PAYLOAD, "wrong_secret", now.timestamp())
        );
        assert!(matches!(
            verifier().verify(PAYLOAD, Some(&header), now),
            Err(WebhookError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let now = Utc::now();
        let header = verifier().signature_header(now.timestamp(), PAYLOAD).unwrap();
        let tampered = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_2"}}}"#;
        assert!(matches!(
            verifier().verify(tampered, Some(&header), now),
            Err(WebhookError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let now = Utc::now();
        let old = now.timestamp() - 600;
        let header = verifier().signature_header(old, PAYLOAD).unwrap();
        assert!(matches!(
            verifier().verify(PAYLOAD, Some(&header), now),
            Err(WebhookError::TimestampOutOfTolerance)
        ));
    }

    #[test]
    fn test_any_matching_v1_accepted() {
        let now = Utc::now();
        let good = platform_signature(PAYLOAD, SECRET, now.timestamp());
        let header = format!("t={},v1=deadbeef,v0=ignored,v1={good}", now.timestamp());
        assert!(verifier().verify(PAYLOAD, Some(&header), now).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        let now = Utc::now();
        for header in ["garbage", "v1=abc", "t=1234567890", "t=abc,v1=def", "t=1,v1="] {
            assert!(
                matches!(
                    verifier().verify(PAYLOAD, Some(header), now),
                    Err(WebhookError::MalformedHeader)
                ),
                "{header}"
            );
        }
        assert!(matches!(
            verifier().verify(PAYLOAD, None, now),
            Err(WebhookError::MissingHeader)
        ));
        assert!(matches!(
            verifier().verify(PAYLOAD, Some(""), now),
            Err(WebhookError::MissingHeader)
        ));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
