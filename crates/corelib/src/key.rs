//! Public key identifiers.
//!
//! Keys are carried as lowercased strings. Validation (exactly 64 lowercase
//! hex characters) is a separate check so that upstream indexing can stay
//! permissive while plan generation drops anything malformed.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Length of a hex-encoded 32-byte public key.
pub const PUBKEY_HEX_LEN: usize = 64;

/// Lowercased author identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct PubKey(String);

/// Ordered set of keys, passed by reference between stages.
pub type KeySet = BTreeSet<PubKey>;

impl PubKey {
    /// Trims and lowercases without validating.
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    /// Normalizes and requires a valid 64-hex key.
    pub fn parse(raw: &str) -> Result<Self> {
        let key = Self::normalize(raw);
        if key.is_valid() {
            Ok(key)
        } else {
            Err(Error::InvalidKey(raw.trim().to_string()))
        }
    }

    /// Exactly 64 lowercase hexadecimal characters.
    pub fn is_valid(&self) -> bool {
        is_hex64(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(16).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True if `s` is exactly 64 lowercase hex characters.
pub fn is_hex64(s: &str) -> bool {
    s.len() == PUBKEY_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Builds a key set from lines, skipping blanks and `#` comments.
///
/// Keys are normalized but not validated here.
pub fn key_set_from_lines<I, S>(lines: I) -> KeySet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|l| PubKey::normalize(l.as_ref()))
        .filter(|k| !k.as_str().is_empty() && !k.as_str().starts_with('#'))
        .collect()
}
