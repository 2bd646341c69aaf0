//! Multipart upload bookkeeping shared by every backend.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_PARTS;
use crate::error::{StoreError, StoreResult};

/// Backend-assigned identifier of a multipart upload.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(value: impl Into<String>) -> StoreResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(StoreError::InvalidRequest("upload id must not be empty".into()));
        }
        Ok(Self(value))
    }

    /// Fresh random identifier, for backends that mint their own.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A part the client reports as uploaded, identified by number and ETag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Validate a client-supplied part list and return it in part-number order.
///
/// Clients may report parts in any order. Rejects empty lists, part numbers
/// outside `1..=MAX_PARTS`, duplicates, and empty ETags.
pub fn normalize_parts(parts: &[CompletedPart]) -> StoreResult<Vec<CompletedPart>> {
    if parts.is_empty() {
        return Err(StoreError::InvalidParts("part list is empty".into()));
    }
    let mut seen = HashSet::with_capacity(parts.len());
    for part in parts {
        if part.part_number == 0 || u64::from(part.part_number) > MAX_PARTS {
            return Err(StoreError::InvalidParts(format!(
                "part number {} out of range 1..={MAX_PARTS}",
                part.part_number
            )));
        }
        if part.etag.trim().is_empty() {
            return Err(StoreError::InvalidParts(format!(
                "part {} has an empty ETag",
                part.part_number
            )));
        }
        if !seen.insert(part.part_number) {
            return Err(StoreError::InvalidParts(format!(
                "part {} listed twice",
                part.part_number
            )));
        }
    }
    let mut sorted = parts.to_vec();
    sorted.sort_by_key(|p| p.part_number);
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_out_of_order_parts() {
        let parts = vec![
            CompletedPart::new(3, "c"),
            CompletedPart::new(1, "a"),
            CompletedPart::new(2, "b"),
        ];
        let sorted = normalize_parts(&parts).unwrap();
        let numbers: Vec<u32> = sorted.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_bad_lists() {
        assert!(normalize_parts(&[]).is_err());
        assert!(normalize_parts(&[CompletedPart::new(0, "a")]).is_err());
        assert!(normalize_parts(&[CompletedPart::new(1, " ")]).is_err());
        assert!(normalize_parts(&[
            CompletedPart::new(1, "a"),
            CompletedPart::new(1, "b"),
        ])
        .is_err());
    }

    #[test]
    fn generated_upload_ids_are_distinct() {
        assert_ne!(UploadId::generate(), UploadId::generate());
    }
}
