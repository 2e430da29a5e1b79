//! Newtype wrappers for identifiers that cross module boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Returned when a string is not a hex-encoded commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid commit hash: {0:?}")]
pub struct InvalidSha(pub String);

/// A git commit hash.
///
/// SHA-1 repositories produce 40 hex characters, SHA-256 repositories 64.
/// Both are accepted by [`Sha::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha(String);

impl Sha {
    /// Parses a full commit hash, normalising it to lowercase.
    pub fn parse(s: impl AsRef<str>) -> Result<Self, InvalidSha> {
        let s = s.as_ref().trim();
        let valid_len = s.len() == 40 || s.len() == 64;
        if valid_len && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Sha(s.to_ascii_lowercase()))
        } else {
            Err(InvalidSha(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first `len` characters (or the whole hash if shorter).
    pub fn prefix(&self, len: usize) -> &str {
        self.0.get(..len).unwrap_or(&self.0)
    }

    /// Abbreviated form used in log lines.
    pub fn short(&self) -> &str {
        self.prefix(7)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Sha {
    type Error = InvalidSha;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Sha::parse(s)
    }
}

impl TryFrom<String> for Sha {
    type Error = InvalidSha;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Sha::parse(s)
    }
}

impl From<Sha> for String {
    fn from(sha: Sha) -> Self {
        sha.0
    }
}

/// A webhook delivery ID, as sent in the `X-GitHub-Delivery` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(s: impl Into<String>) -> Self {
        DeliveryId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod sha {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn accepts_sha1_and_sha256(s in "[0-9a-f]{40}|[0-9a-f]{64}") {
                let sha = Sha::parse(&s).unwrap();
                prop_assert_eq!(sha.as_str(), s.as_str());
            }

            #[test]
            fn rejects_wrong_lengths(s in "[0-9a-f]{1,39}") {
                prop_assert!(Sha::parse(&s).is_err());
            }
        }

        #[test]
        fn parse_trims_trailing_newline() {
            let raw = format!("{}\n", "a".repeat(40));
            assert_eq!(Sha::parse(raw).unwrap().as_str(), "a".repeat(40));
        }

        #[test]
        fn parse_lowercases() {
            let sha = Sha::parse("ABCDEF".repeat(7).get(..40).unwrap()).unwrap();
            assert!(sha.as_str().chars().all(|c| !c.is_ascii_uppercase()));
        }

        #[test]
        fn parse_rejects_non_hex() {
            assert!(Sha::parse("z".repeat(40)).is_err());
            assert!(Sha::parse("").is_err());
        }

        #[test]
        fn deserialize_validates() {
            let ok: Sha = serde_json::from_str(&format!("\"{}\"", "b".repeat(40))).unwrap();
            assert_eq!(ok.as_str(), "b".repeat(40));
            assert!(serde_json::from_str::<Sha>("\"nope\"").is_err());
        }

        #[test]
        fn prefix_and_short() {
            let sha = Sha::parse("0123456789".repeat(4)).unwrap();
            assert_eq!(sha.prefix(6), "012345");
            assert_eq!(sha.short(), "0123456");
            assert_eq!(sha.prefix(100), sha.as_str());
        }
    }

    #[test]
    fn delivery_id_serializes_transparently() {
        let id = DeliveryId::new("550e8400-e29b-41d4-a716-446655440000");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }
}
