//! Request signing with replay protection.
//!
//! Signature format: `<unix seconds>.<hex HMAC-SHA256>`
//! - the MAC covers a canonical JSON object `{payload, service, timestamp}`
//!   (keys sorted at every level), so the timestamp cannot be swapped without breaking it
//! - verification is constant-time and reports every mismatch the same way
//! - authentic signatures outside the replay window are rejected separately

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::SigningConfig;
use crate::error::{GuardError, GuardResult};

type HmacSha256 = Hmac<Sha256>;

/// Placeholder substituted for secrets in diagnostic text.
pub const REDACTED: &str = "[REDACTED]";

/// Header names used when attaching metadata to outbound requests.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";
pub const TIMESTAMP_HEADER: &str = "X-Request-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Request-Signature";

/// Per-call metadata sent alongside a signed request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SignedRequestMetadata {
    pub request_id: Uuid,
    pub timestamp: u64,
    pub service: String,
    pub signature: Option<RequestSignature>,
}

/// A signature together with the timestamp it was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSignature {
    pub timestamp: u64,
    pub digest: String,
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.timestamp, self.digest)
    }
}

impl FromStr for RequestSignature {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts, digest) = s.split_once('.').ok_or(GuardError::SignatureInvalid)?;
        let timestamp = ts.parse().map_err(|_| GuardError::SignatureInvalid)?;
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GuardError::SignatureInvalid);
        }
        Ok(Self {
            timestamp,
            digest: digest.to_ascii_lowercase(),
        })
    }
}

/// Computes and verifies request signatures.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    replay_window_secs: u64,
    clock: SharedClock,
}

impl RequestSigner {
    pub fn new(config: &SigningConfig, clock: SharedClock) -> Self {
        Self {
            replay_window_secs: config.replay_window_secs,
            clock,
        }
    }

    /// Fresh metadata for a call to `service`, not yet signed.
    pub fn create_request_metadata(&self, service: &str) -> SignedRequestMetadata {
        SignedRequestMetadata {
            request_id: Uuid::new_v4(),
            timestamp: self.clock.now_secs(),
            service: service.to_string(),
            signature: None,
        }
    }

    /// Sign `payload` for `service` at the current time.
    pub fn sign_request(&self, service: &str, payload: &Value, secret: &str) -> RequestSignature {
        self.sign_at(service, payload, secret, self.clock.now_secs())
    }

    /// Sign `payload` with an explicit timestamp.
    pub fn sign_at(&self, service: &str, payload: &Value, secret: &str, timestamp: u64) -> RequestSignature {
        RequestSignature {
            timestamp,
            digest: hex::encode(compute_mac(service, payload, secret, timestamp)),
        }
    }

    /// Fill in the signature on previously created metadata.
    pub fn sign_metadata(&self, metadata: &mut SignedRequestMetadata, payload: &Value, secret: &str) {
        metadata.signature = Some(self.sign_at(&metadata.service, payload, secret, metadata.timestamp));
    }

    /// Verify a signature produced by [`RequestSigner::sign_request`].
    pub fn verify_signature(
        &self,
        service: &str,
        payload: &Value,
        signature: &str,
        secret: &str,
    ) -> GuardResult<()> {
        let parsed: RequestSignature = signature.parse()?;
        let expected = compute_mac(service, payload, secret, parsed.timestamp);
        let provided = hex::decode(&parsed.digest).map_err(|_| GuardError::SignatureInvalid)?;

        if !bool::from(provided.as_slice().ct_eq(expected.as_slice())) {
            return Err(GuardError::SignatureInvalid);
        }

        let now = self.clock.now_secs();
        if now.abs_diff(parsed.timestamp) > self.replay_window_secs {
            tracing::debug!(service = %service, age_secs = now.abs_diff(parsed.timestamp), "Signature outside replay window");
            return Err(GuardError::ReplayWindowExceeded {
                window_secs: self.replay_window_secs,
            });
        }
        Ok(())
    }
}

fn canonical_message(service: &str, payload: &Value, timestamp: u64) -> Vec<u8> {
    let envelope = json!({
        "payload": payload,
        "service": service,
        "timestamp": timestamp,
    });
    let mut out = String::new();
    write_canonical(&envelope, &mut out);
    out.into_bytes()
}

/// Compact JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn compute_mac(service: &str, payload: &Value, secret: &str, timestamp: u64) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(&canonical_message(service, payload, timestamp));
    mac.finalize().into_bytes().to_vec()
}

/// Replace every occurrence of each non-empty secret in `message`.
pub fn redact(message: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(message.to_string(), |acc, secret| acc.replace(secret, REDACTED))
}
