//! Webhook payload signing.
//!
//! Outbound webhook bodies are signed with HMAC-SHA256 keyed by the
//! subscription secret; the lowercase hex digest travels in the
//! [`SIGNATURE_HEADER`] header. Receivers recompute the MAC over the exact
//! bytes they received.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex-encoded HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Header carrying the event type of the delivered envelope.
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length")
}

/// Compute the hex-encoded HMAC-SHA256 signature of `body`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = mac_for(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature against `body` in constant time.
///
/// Returns `false` for malformed hex as well as for mismatches.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = mac_for(secret);
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
