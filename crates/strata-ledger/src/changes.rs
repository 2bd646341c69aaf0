//! Applying a commit's file changes to the previous path map.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_types::{ContentHash, FileEntry, RepoPath};

use crate::error::LedgerError;
use crate::records::FileMap;

/// The file-level content of a commit request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChanges {
    #[serde(default)]
    pub created: Vec<RepoPath>,
    #[serde(default)]
    pub modified: Vec<RepoPath>,
    #[serde(default)]
    pub deleted: Vec<RepoPath>,
    /// New content hash for every created or modified path.
    #[serde(default)]
    pub hashes: BTreeMap<RepoPath, ContentHash>,
}

impl FileChanges {
    /// Every path the change set writes or removes.
    pub fn touched(&self) -> impl Iterator<Item = &RepoPath> {
        self.created
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Compute the path map that results from applying these changes on
    /// top of `base`.
    ///
    /// Created and modified paths are upserts: a new path starts at version
    /// 1, a changed hash moves the version forward by one, and an unchanged
    /// hash keeps its version. Deleted paths must exist in `base`. Hash
    /// entries for paths that are not listed are accepted only when they
    /// match `base` exactly.
    pub fn apply(&self, base: &FileMap) -> Result<FileMap, LedgerError> {
        let mut seen = BTreeSet::new();
        for path in self.touched() {
            if !seen.insert(path) {
                return Err(LedgerError::InvalidChanges(format!(
                    "path {path} is listed more than once"
                )));
            }
        }

        for (path, hash) in &self.hashes {
            if seen.contains(path) {
                continue;
            }
            match base.get(path) {
                Some(entry) if &entry.hash == hash => {}
                _ => {
                    return Err(LedgerError::InvalidChanges(format!(
                        "hash supplied for {path}, which is not created or modified"
                    )))
                }
            }
        }

        let mut next = base.clone();
        for path in &self.deleted {
            if next.remove(path).is_none() {
                return Err(LedgerError::InvalidChanges(format!(
                    "cannot delete {path}: not present in the previous commit"
                )));
            }
        }

        for path in self.created.iter().chain(&self.modified) {
            let hash = self.hashes.get(path).cloned().ok_or_else(|| {
                LedgerError::InvalidChanges(format!("no content hash supplied for {path}"))
            })?;
            let entry = match base.get(path) {
                Some(previous) => previous.advance(hash),
                None => FileEntry::initial(hash),
            };
            next.insert(path.clone(), entry);
        }

        Ok(next)
    }
}
