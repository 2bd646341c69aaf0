//! The [`CommitStore`] trait defining commit persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strata_types::{BranchId, CommitId, ProjectId};

use crate::error::Result;
use crate::records::{Commit, CommitPatch};

/// Storage backend for commit records.
///
/// `(branch_id, index)` is unique: inserting a second commit at an index
/// already used on the same branch fails with `DuplicateIndex`.
#[async_trait]
pub trait CommitStore: Send + Sync {
    async fn insert(&self, commit: &Commit) -> Result<()>;

    async fn get(&self, id: &CommitId) -> Result<Option<Commit>>;

    /// Every commit of a branch in ascending index order.
    async fn list_by_branch(&self, branch: &BranchId) -> Result<Vec<Commit>>;

    /// One page of a project's commits ordered by ID, starting strictly
    /// after `after`.
    async fn page_by_project(
        &self,
        project: &ProjectId,
        after: Option<&CommitId>,
        limit: usize,
    ) -> Result<Vec<Commit>>;

    /// Apply a patch to the mutable fields of a commit.
    async fn update(&self, id: &CommitId, patch: &CommitPatch) -> Result<Commit>;

    /// Returns `true` if the commit existed.
    async fn delete(&self, id: &CommitId) -> Result<bool>;

    async fn delete_by_branch(&self, branch: &BranchId) -> Result<usize>;

    async fn delete_by_project(&self, project: &ProjectId) -> Result<usize>;

    /// Remove commits of `branch` whose index is greater than `index` and
    /// that were created before `created_before`. Younger records may still
    /// be waiting for their branch repoint.
    async fn delete_above(
        &self,
        branch: &BranchId,
        index: u64,
        created_before: DateTime<Utc>,
    ) -> Result<usize>;
}
