//! The [`BranchStore`] trait defining branch persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strata_types::{BranchId, CommitId, ProjectId, RepoPath, UserId};

use crate::error::Result;
use crate::types::Branch;

/// Storage backend for branch records.
///
/// Every mutating method is a single atomic document update: lock-set
/// changes and head repoints must never be implemented as a read followed
/// by a separate write, or concurrent callers lose updates.
#[async_trait]
pub trait BranchStore: Send + Sync {
    /// Insert a new branch. Fails with `AlreadyExists` if a live branch of
    /// the same project already uses the name.
    async fn insert(&self, branch: &Branch) -> Result<()>;

    /// Read a branch by ID, including soft-deleted ones.
    async fn get(&self, id: &BranchId) -> Result<Option<Branch>>;

    /// Find a live branch by project and name.
    async fn find_by_name(&self, project: &ProjectId, name: &str) -> Result<Option<Branch>>;

    /// All branches of a project ordered by creation time.
    async fn list(&self, project: &ProjectId, include_deleted: bool) -> Result<Vec<Branch>>;

    /// Repoint the branch from `expected` to `head` at `index`.
    ///
    /// Fails with `StaleHead` if the branch no longer points at `expected`.
    async fn advance(
        &self,
        id: &BranchId,
        expected: &CommitId,
        head: &CommitId,
        index: u64,
    ) -> Result<Branch>;

    /// Add `paths` to the lock set, keeping existing entries.
    async fn add_locks(
        &self,
        id: &BranchId,
        holder: &UserId,
        paths: &[RepoPath],
        now: DateTime<Utc>,
    ) -> Result<Branch>;

    /// Remove `paths` from the lock set, ignoring absent ones.
    async fn remove_locks(&self, id: &BranchId, paths: &[RepoPath]) -> Result<Branch>;

    /// Mark a branch deleted without removing it. Idempotent.
    async fn soft_delete(&self, id: &BranchId, at: DateTime<Utc>) -> Result<Branch>;

    /// Remove a branch record. Returns `true` if it existed.
    async fn delete(&self, id: &BranchId) -> Result<bool>;

    /// Remove every branch of a project and return how many were removed.
    async fn delete_by_project(&self, project: &ProjectId) -> Result<usize>;
}
