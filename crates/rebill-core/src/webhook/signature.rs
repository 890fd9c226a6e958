//! Webhook signature verification
//!
//! Header format: `t=<unix_ts>,v1=<hex_hmac>` where the HMAC-SHA-256 is
//! computed over `"<t>.<raw_body>"` with the per-app webhook secret.
//! The timestamp tolerance is enforced before any HMAC work, and the
//! final comparison is fixed-time over equal-length buffers; unequal
//! lengths reject without comparing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Parsed `tilled-signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signature_hex: String,
}

/// Parse `t=<unix_ts>,v1=<hex>`; any deviation is an authentication error.
pub fn parse_signature_header(header: &str) -> Result<SignatureHeader> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse::<i64>().ok();
            }
            Some(("v1", value)) => {
                signature = Some(value.to_string());
            }
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(timestamp), Some(signature_hex)) => Ok(SignatureHeader {
            timestamp,
            signature_hex,
        }),
        _ => Err(Error::unauthorized("malformed signature header")),
    }
}

/// Verify a webhook delivery.
///
/// `now_unix` is injected so tolerance behavior is testable without a
/// real clock.
pub fn verify_signature(
    secret: &str,
    raw_body: &[u8],
    header: &str,
    tolerance_secs: i64,
    now_unix: i64,
) -> Result<()> {
    let parsed = parse_signature_header(header)?;

    // Tolerance check first: stale replays are rejected without paying
    // for the HMAC.
    if (now_unix - parsed.timestamp).abs() > tolerance_secs {
        return Err(Error::unauthorized("signature timestamp outside tolerance"));
    }

    let supplied = match hex::decode(&parsed.signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return Err(Error::unauthorized("invalid signature encoding")),
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::internal("webhook secret unusable as HMAC key"))?;
    mac.update(parsed.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();

    if supplied.len() != expected.len() {
        return Err(Error::unauthorized("invalid signature"));
    }
    if !fixed_time_eq(&supplied, &expected) {
        return Err(Error::unauthorized("invalid signature"));
    }

    Ok(())
}

/// Constant-time comparison of equal-length buffers.
fn fixed_time_eq(a: &[u8], b: &[u8]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Produce a valid header for a payload. Test and tooling helper.
pub fn sign(secret: &str, raw_body: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
