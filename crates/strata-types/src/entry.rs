use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ContentHash;

/// The content hash and version counter stored for one path in a commit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    pub hash: ContentHash,
    pub version: u32,
}

impl FileEntry {
    /// First version of a newly tracked path.
    pub fn initial(hash: ContentHash) -> Self {
        Self { hash, version: 1 }
    }

    /// Construct with an explicit version (used when loading records).
    pub fn with_version(hash: ContentHash, version: u32) -> Result<Self, TypeError> {
        if version == 0 {
            return Err(TypeError::InvalidVersion(version));
        }
        Ok(Self { hash, version })
    }

    /// The entry that results from writing `hash` over this one.
    ///
    /// The version moves forward by exactly one when the hash changes and
    /// stays put when the same content is written again.
    pub fn advance(&self, hash: ContentHash) -> Self {
        if hash == self.hash {
            self.clone()
        } else {
            Self {
                hash,
                version: self.version.saturating_add(1),
            }
        }
    }
}
