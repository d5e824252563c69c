//! HMAC-SHA256 webhook signatures.
//!
//! Both directions use the same header format, `sha256=<hex>`, carried in
//! [`SIGNATURE_HEADER`]:
//!
//! - inbound provider webhooks are verified against a per-workspace secret
//!   derived from the master secret with [`derive_workspace_secret`];
//! - outbound workspace webhooks are signed with the webhook's own secret.
//!
//! Verification happens on the raw body, before any parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::WorkspaceId;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-linktrack-signature";

/// Parses a `sha256=<hex>` header value into raw bytes.
///
/// Returns `None` for a missing prefix, another algorithm, or bad hex.
///
/// ```
/// use linktrack::webhooks::parse_signature_header;
///
/// assert!(parse_signature_header("sha256=abcd1234").is_some());
/// assert!(parse_signature_header("abcd1234").is_none());
/// assert!(parse_signature_header("sha1=abcd1234").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.trim().strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Signs `payload` and returns the full header value.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
    format_signature_header(&compute_signature(payload, secret))
}

/// Constant-time check of a `sha256=<hex>` header against `payload`.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// The secret a workspace's providers sign with: `HMAC(master, workspace_id)`.
///
/// Hex-encoded so it can be pasted into a provider's dashboard.
pub fn derive_workspace_secret(master_secret: &[u8], workspace_id: &WorkspaceId) -> String {
    hex::encode(compute_signature(
        workspace_id.as_str().as_bytes(),
        master_secret,
    ))
}
