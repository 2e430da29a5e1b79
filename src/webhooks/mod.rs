//! Webhook authentication.
//!
//! Deliveries are signed with HMAC-SHA256 over the raw body; see
//! [`signature`].

pub mod signature;

pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};

/// Header carrying the `sha256=<hex>` signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header carrying the sender's delivery ID.
pub const DELIVERY_HEADER: &str = "x-github-delivery";
