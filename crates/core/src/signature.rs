//! Webhook signature verification (Stripe `Stripe-Signature` scheme).
//!
//! The header carries a timestamp and one or more `v1` HMAC-SHA256
//! signatures over `"{timestamp}.{payload}"`. A valid signature with a
//! timestamp outside the tolerance window is rejected to limit replay.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default replay tolerance in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature header is malformed")]
    MalformedHeader,

    #[error("Signature header has no v1 signature")]
    NoSignature,

    #[error("Signature timestamp is outside the tolerance window")]
    TimestampOutOfTolerance,

    #[error("No signature matches the payload")]
    Mismatch,
}

/// Parsed `t=...,v1=...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or(SignatureError::MalformedHeader)?;
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                );
            }
            "v1" => signatures.push(value.to_ascii_lowercase()),
            // Other schemes (v0 test signatures) are ignored.
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::NoSignature);
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Hex-encoded HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("{:x}", mac.finalize().into_bytes())
}

/// Build a header value for `payload`. Used by tests and local tooling.
pub fn sign_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={timestamp},v1={}",
        compute_signature(secret, timestamp, payload)
    )
}

/// Verify `header` against `payload` at time `now` (Unix seconds).
pub fn verify(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;
    if (now - parsed.timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }
    let expected = compute_signature(secret, parsed.timestamp, payload);
    if parsed
        .signatures
        .iter()
        .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
