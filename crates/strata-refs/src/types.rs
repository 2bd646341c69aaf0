//! Branch records and their lock sets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_types::{BranchId, CommitId, ProjectId, RepoPath, UserId};

/// A named, mutable pointer to the latest commit of a line of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub project_id: ProjectId,
    pub name: String,
    /// The commit this branch currently points to.
    pub head: CommitId,
    /// Index of `head` within the branch, kept alongside the pointer so the
    /// next index can be assigned without reading the commit.
    pub head_index: u64,
    pub locks: LockSet,
    pub created_at: DateTime<Utc>,
    /// Set when the branch is soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Branch {
    /// A fresh branch pointing at its first commit (index 1).
    pub fn new(project_id: ProjectId, name: impl Into<String>, head: CommitId) -> Self {
        Self {
            id: BranchId::new(),
            project_id,
            name: name.into(),
            head,
            head_index: 1,
            locks: LockSet::default(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Index the next commit on this branch receives.
    pub fn next_index(&self) -> u64 {
        self.head_index + 1
    }
}

/// Who holds a lock and since when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub holder: UserId,
    pub locked_at: DateTime<Utc>,
}

/// A path locked by someone other than the would-be writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockConflict {
    pub path: RepoPath,
    pub holder: UserId,
}

/// Ordered set of locked paths on a branch.
///
/// Locking is an idempotent union and unlocking an idempotent difference.
/// The holder is recorded so the user who took a lock can keep committing
/// to the path; unlocking is not restricted to the holder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockSet(BTreeMap<RepoPath, LockEntry>);

impl LockSet {
    /// Lock `paths` for `holder`. Already-locked paths keep their existing
    /// entry. Returns the paths that were newly locked.
    pub fn lock<'a>(
        &mut self,
        holder: &UserId,
        paths: impl IntoIterator<Item = &'a RepoPath>,
        now: DateTime<Utc>,
    ) -> Vec<RepoPath> {
        let mut added = Vec::new();
        for path in paths {
            if !self.0.contains_key(path) {
                self.0.insert(
                    path.clone(),
                    LockEntry {
                        holder: holder.clone(),
                        locked_at: now,
                    },
                );
                added.push(path.clone());
            }
        }
        added
    }

    /// Unlock `paths`, ignoring any that are not locked. Returns the paths
    /// that were actually removed.
    pub fn unlock<'a>(&mut self, paths: impl IntoIterator<Item = &'a RepoPath>) -> Vec<RepoPath> {
        paths
            .into_iter()
            .filter(|path| self.0.remove(*path).is_some())
            .cloned()
            .collect()
    }

    pub fn is_locked(&self, path: &RepoPath) -> bool {
        self.0.contains_key(path)
    }

    pub fn holder(&self, path: &RepoPath) -> Option<&UserId> {
        self.0.get(path).map(|e| &e.holder)
    }

    /// Paths among `paths` that `author` may not write because someone else
    /// holds the lock. A system author (`None`) conflicts with every lock.
    pub fn conflicts<'a>(
        &self,
        author: Option<&UserId>,
        paths: impl IntoIterator<Item = &'a RepoPath>,
    ) -> Vec<LockConflict> {
        paths
            .into_iter()
            .filter_map(|path| {
                let entry = self.0.get(path)?;
                (Some(&entry.holder) != author).then(|| LockConflict {
                    path: path.clone(),
                    holder: entry.holder.clone(),
                })
            })
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &RepoPath> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RepoPath, &LockEntry)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
