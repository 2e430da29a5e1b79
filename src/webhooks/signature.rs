//! Webhook signature verification (HMAC-SHA256).
//!
//! Senders sign the raw request body with the shared secret and put the
//! result in the `X-Hub-Signature-256` header as `sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

fn mac_for(payload: &[u8], secret: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac
}

/// Decodes a `sha256=<hex>` header value. Returns `None` if it is malformed.
///
/// ```
/// use build_robot::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=0aff"), Some(vec![0x0a, 0xff]));
/// assert!(parse_signature_header("sha1=0aff").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix(PREFIX)?).ok()
}

/// HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    mac_for(payload, secret).finalize().into_bytes().to_vec()
}

/// Formats a signature as a header value (`sha256=<hex>`).
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{PREFIX}{}", hex::encode(signature))
}

/// Checks `header` against the payload's signature under `secret`.
///
/// The MAC is computed for every request, including ones whose header is
/// missing (`None`) or malformed, and compared in constant time, so the
/// reason for a rejection does not show in the response time.
///
/// ```
/// use build_robot::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let header = format_signature_header(&compute_signature(b"{}", b"secret"));
/// assert!(verify_signature(b"{}", Some(&header), b"secret"));
/// assert!(!verify_signature(b"{}", Some(&header), b"other"));
/// assert!(!verify_signature(b"{}", None, b"secret"));
/// ```
pub fn verify_signature(payload: &[u8], header: Option<&str>, secret: &[u8]) -> bool {
    let mac = mac_for(payload, secret);
    let claimed = header.and_then(parse_signature_header).unwrap_or_default();
    mac.verify_slice(&claimed).is_ok()
}
