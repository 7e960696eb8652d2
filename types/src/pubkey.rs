//! Node public key.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A Lightning node public key, kept in its textual (hex) form.
///
/// The upstream provider is the authority on key format, so the only local
/// check is that the key is non-empty and free of whitespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pubkey(String);

impl Pubkey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, TypesError> {
        let s = raw.into();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(TypesError::InvalidPubkey(s));
        }
        Ok(Self(s))
    }

    /// Return the raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Pubkey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Pubkey {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Pubkey {
    type Error = TypesError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}
