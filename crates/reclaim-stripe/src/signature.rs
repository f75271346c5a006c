//! Webhook signature verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac-sha256>[,v1=...]`. The MAC
//! covers `"<t>.<raw body>"` keyed with the endpoint secret. Several `v1`
//! entries may be present while a secret is being rolled; any match is enough.

use hmac::{Hmac, Mac};
use reclaim_settlement::gateway::GatewayError;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default maximum age of a signed payload.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

const SCHEME: &str = "v1";

/// Verify `header` for `payload` at time `now`.
///
/// # Errors
///
/// - [`GatewayError::InvalidSignature`] if the header is malformed, stale,
///   or no signature matches
pub fn verify(payload: &[u8], header: &str, secret: &str, tolerance_secs: u64, now: u64) -> Result<(), GatewayError> {
    let mut timestamp: Option<u64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse()
                        .map_err(|_| GatewayError::InvalidSignature("bad timestamp".into()))?,
                );
            }
            SCHEME => {
                // Undecodable entries cannot match; skip them.
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(GatewayError::InvalidSignature(format!("no {SCHEME} signature")));
    }
    if now.abs_diff(timestamp) > tolerance_secs {
        return Err(GatewayError::InvalidSignature(format!(
            "timestamp {timestamp} outside tolerance of {tolerance_secs}s"
        )));
    }

    let mac = signed_mac(payload, timestamp, secret)?;
    // verify_slice compares in constant time.
    if signatures.iter().any(|sig| mac.clone().verify_slice(sig).is_ok()) {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature("no signature matches".into()))
    }
}

/// Produce a header for `payload`, as the gateway would.
pub fn sign(payload: &[u8], secret: &str, timestamp: u64) -> Result<String, GatewayError> {
    let mac = signed_mac(payload, timestamp, secret)?;
    Ok(format!(
        "t={timestamp},{SCHEME}={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn signed_mac(payload: &[u8], timestamp: u64, secret: &str) -> Result<HmacSha256, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::InvalidSignature(format!("unusable secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}
