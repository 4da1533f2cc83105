//! Stripe webhook signature verification.
//!
//! The signature covers `"{t}." ++ raw_body` using HMAC-SHA256 over the exact
//! bytes received. The body is never re-serialized before checking, since
//! whitespace or key order changes would break the signature.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::VerificationError;
use super::provider_event::ProviderEvent;

/// Default maximum age for a signed delivery (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Maximum allowed clock skew for future timestamps (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components from the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// Every v1 signature present. More than one appears while a signing
    /// secret is being rolled.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a Stripe-Signature header string.
    ///
    /// Format: `t=<timestamp>,v1=<signature>[,v1=<signature>][,v0=<legacy>]`
    ///
    /// # Errors
    ///
    /// - `missing_signature` if the header is blank or carries no v1 entry
    /// - `bad_signature` for any other structural defect
    pub fn parse(header: &str) -> Result<Self, VerificationError> {
        if header.trim().is_empty() {
            return Err(VerificationError::missing_signature(
                "empty Stripe-Signature header",
            ));
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| VerificationError::bad_signature("invalid header format"))?;

            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse().map_err(|_| {
                        VerificationError::bad_signature("invalid timestamp")
                    })?);
                }
                "v1" => {
                    let signature = hex::decode(value.trim()).map_err(|_| {
                        VerificationError::bad_signature("invalid v1 signature hex")
                    })?;
                    v1_signatures.push(signature);
                }
                _ => {
                    // v0 and unknown schemes are ignored
                }
            }
        }

        if v1_signatures.is_empty() {
            return Err(VerificationError::missing_signature("no v1 signature"));
        }
        let timestamp =
            timestamp.ok_or_else(|| VerificationError::bad_signature("missing timestamp"))?;

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Authenticates inbound deliveries against the shared webhook secret.
pub struct EventVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl EventVerifier {
    /// Creates a verifier with the default 5 minute replay window.
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Overrides the replay window.
    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verifies a delivery against the current clock.
    pub fn verify(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<ProviderEvent, VerificationError> {
        self.verify_at(raw_body, signature_header, chrono::Utc::now().timestamp())
    }

    /// Verifies a delivery as of `now` (Unix seconds).
    ///
    /// # Verification Steps
    ///
    /// 1. Parse the signature header
    /// 2. Validate the timestamp is inside the replay window
    /// 3. Compute the expected HMAC-SHA256 over the raw bytes
    /// 4. Compare against every v1 signature in constant time
    /// 5. Parse the JSON envelope
    pub fn verify_at(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
        now: i64,
    ) -> Result<ProviderEvent, VerificationError> {
        let header = signature_header.ok_or_else(|| {
            VerificationError::missing_signature("Stripe-Signature header not present")
        })?;
        let header = SignatureHeader::parse(header)?;

        self.validate_timestamp(header.timestamp, now)?;

        let expected = self.compute_signature(header.timestamp, raw_body)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));
        if !matched {
            return Err(VerificationError::bad_signature(
                "no v1 signature matches payload",
            ));
        }

        let event: ProviderEvent = serde_json::from_slice(raw_body)
            .map_err(|e| VerificationError::malformed_payload(e.to_string()))?;

        if event.id.trim().is_empty() || event.event_type.trim().is_empty() {
            return Err(VerificationError::malformed_payload(
                "event id and type must be non-empty",
            ));
        }

        Ok(event)
    }

    fn validate_timestamp(&self, timestamp: i64, now: i64) -> Result<(), VerificationError> {
        let age = now
            .checked_sub(timestamp)
            .ok_or_else(|| VerificationError::bad_signature("invalid timestamp"))?;

        if age > self.tolerance_secs {
            return Err(VerificationError::bad_signature(format!(
                "timestamp outside tolerance ({} seconds old)",
                age
            )));
        }

        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(VerificationError::bad_signature("timestamp in the future"));
        }

        Ok(())
    }

    fn compute_signature(
        &self,
        timestamp: i64,
        raw_body: &[u8],
    ) -> Result<Vec<u8>, VerificationError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| VerificationError::bad_signature("unusable signing secret"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw_body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Constant-time comparison; lengths are not secret.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes a v1 signature for use in test fixtures.
#[cfg(test)]
pub fn compute_test_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
