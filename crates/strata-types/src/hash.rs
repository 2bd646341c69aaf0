use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest accepted hash string (a hex-encoded 512-bit digest).
pub const MAX_HASH_LEN: usize = 128;

/// Digest of a file's bytes.
///
/// Clients compute the digest before uploading; the core never rehashes
/// content, it only uses the hash as the storage key suffix. The hash is
/// therefore treated as an opaque token and validated only for key safety:
/// ASCII alphanumerics, `-` and `_`, at most [`MAX_HASH_LEN`] characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Validate and wrap a hash string.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TypeError::InvalidHash {
                value,
                reason: "must not be empty".into(),
            });
        }
        if value.len() > MAX_HASH_LEN {
            return Err(TypeError::InvalidHash {
                reason: format!("longer than {MAX_HASH_LEN} characters"),
                value,
            });
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(TypeError::InvalidHash {
                reason: format!("contains forbidden character: {bad:?}"),
                value,
            });
        }
        Ok(Self(value))
    }

    /// BLAKE3 digest of `data`, hex-encoded.
    pub fn of(data: &[u8]) -> Self {
        Self(hex::encode(blake3::hash(data).as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short representation (first 8 characters).
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}
