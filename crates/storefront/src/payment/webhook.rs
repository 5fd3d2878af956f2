//! Webhook signature verification and event parsing.
//!
//! The processor signs each delivery with a `Stripe-Signature` header of the
//! form `t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The HMAC-SHA256 is keyed
//! with the endpoint's signing secret and computed over `"{t}.{payload}"`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use super::CheckoutSession;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a delivery before it is treated as a replay.
pub const TOLERANCE_SECS: i64 = 300;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED: &str =
    "checkout.session.async_payment_succeeded";

/// Why a delivery's signature was rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    MissingHeader,
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature timestamp is outside the tolerance window")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
}

/// A webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// The event's object as a checkout session.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not a checkout session.
    pub fn checkout_session(&self) -> Result<CheckoutSession, serde_json::Error> {
        CheckoutSession::deserialize(&self.data.object)
    }
}

/// Verify the signature header for `payload` at time `now` (unix seconds).
///
/// # Errors
///
/// Returns the reason the delivery must be rejected.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }

    if now.abs_diff(timestamp) > TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let expected = compute_signature(secret, timestamp, payload);
    if signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
#[must_use]
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    // HMAC-SHA256 accepts keys of any length
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Build a signature header for `payload`, as the processor would send it.
#[must_use]
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={timestamp},v1={}",
        compute_signature(secret, timestamp, payload)
    )
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
