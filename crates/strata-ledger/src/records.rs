use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_types::{BranchId, CommitId, ContentHash, FileEntry, ProjectId, RepoPath, UserId};

/// Path → `{hash, version}` snapshot of a branch at one commit.
pub type FileMap = BTreeMap<RepoPath, FileEntry>;

/// An immutable point in a branch's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub project_id: ProjectId,
    pub branch_id: BranchId,
    /// Position within the branch, starting at 1.
    pub index: u64,
    pub created_at: DateTime<Utc>,
    /// `None` for system-authored commits.
    pub author: Option<UserId>,
    pub message: String,
    pub created: Vec<RepoPath>,
    pub modified: Vec<RepoPath>,
    pub deleted: Vec<RepoPath>,
    pub files: FileMap,
}

impl Commit {
    /// System-authored first commit of a branch.
    pub fn initial(
        project_id: ProjectId,
        branch_id: BranchId,
        message: impl Into<String>,
        files: FileMap,
    ) -> Self {
        Self {
            id: CommitId::new(),
            project_id,
            branch_id,
            index: 1,
            created_at: Utc::now(),
            author: None,
            message: message.into(),
            created: Vec::new(),
            modified: Vec::new(),
            deleted: Vec::new(),
            files,
        }
    }

    pub fn is_system_authored(&self) -> bool {
        self.author.is_none()
    }

    /// Every content hash this commit references.
    pub fn hashes(&self) -> impl Iterator<Item = &ContentHash> {
        self.files.values().map(|entry| &entry.hash)
    }

    /// Union of the created, modified and deleted lists.
    pub fn touched_paths(&self) -> BTreeSet<&RepoPath> {
        self.created
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .collect()
    }
}

/// Mutable fields of a commit. `None` leaves a field unchanged.
///
/// Index, branch, project, timestamp and the file map are immutable and
/// deliberately absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPatch {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created: Option<Vec<RepoPath>>,
    #[serde(default)]
    pub modified: Option<Vec<RepoPath>>,
    #[serde(default)]
    pub deleted: Option<Vec<RepoPath>>,
}

impl CommitPatch {
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
            && self.created.is_none()
            && self.modified.is_none()
            && self.deleted.is_none()
    }

    /// Apply the patch in place.
    pub fn apply_to(&self, commit: &mut Commit) {
        if let Some(message) = &self.message {
            commit.message = message.clone();
        }
        if let Some(created) = &self.created {
            commit.created = created.clone();
        }
        if let Some(modified) = &self.modified {
            commit.modified = modified.clone();
        }
        if let Some(deleted) = &self.deleted {
            commit.deleted = deleted.clone();
        }
    }
}
