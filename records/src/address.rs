use serde::{Deserialize, Serialize};
use std::fmt;

/// A ledger account address in its display encoding.
///
/// Addresses arrive from external feeds (request parameters, durable rows)
/// and are not trusted to be well formed. `is_valid` is the single gate the
/// ingestion pipeline uses to classify an address as permanently bad.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub const MIN_LEN: usize = 20;
    pub const MAX_LEN: usize = 64;

    pub fn new(raw: impl Into<String>) -> Self {
        Address(raw.into())
    }

    /// Structural validity only: length bounds and the base58-style
    /// alphanumeric alphabet. Anything failing this is a permanent per-item
    /// failure, never retried.
    pub fn is_valid(&self) -> bool {
        let len = self.0.len();
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&len) {
            return false;
        }
        self.0.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Address(raw.to_owned())
    }
}
