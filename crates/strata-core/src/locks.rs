//! Path locks on branches.

use chrono::Utc;
use strata_refs::LockSet;
use strata_types::{BranchId, RepoPath, UserId};
use tracing::{info, instrument};

use crate::deps::ServiceContext;
use crate::error::CoreResult;

/// Locks and unlocks paths on a branch.
///
/// Each call is one atomic update of the branch's lock set in the branch
/// store, so concurrent lockers never lose each other's paths. A lock
/// taken by one user blocks commits to that path by everyone else until
/// it is released; any collaborator may release it.
#[derive(Clone, Debug)]
pub struct LockCoordinator {
    ctx: ServiceContext,
}

impl LockCoordinator {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn lock(
        &self,
        branch: &BranchId,
        holder: &UserId,
        paths: &[RepoPath],
    ) -> CoreResult<LockSet> {
        self.ctx.live_branch(branch).await?;
        let updated = self
            .ctx
            .doc(
                "lock update",
                self.ctx
                    .deps
                    .branches
                    .add_locks(branch, holder, paths, Utc::now()),
            )
            .await?;
        info!(%branch, %holder, paths = paths.len(), locked = updated.locks.len(), "paths locked");
        Ok(updated.locks)
    }

    #[instrument(skip(self))]
    pub async fn unlock(&self, branch: &BranchId, paths: &[RepoPath]) -> CoreResult<LockSet> {
        self.ctx.live_branch(branch).await?;
        let updated = self
            .ctx
            .doc(
                "lock update",
                self.ctx.deps.branches.remove_locks(branch, paths),
            )
            .await?;
        info!(%branch, paths = paths.len(), locked = updated.locks.len(), "paths unlocked");
        Ok(updated.locks)
    }

    pub async fn list_locks(&self, branch: &BranchId) -> CoreResult<LockSet> {
        Ok(self.ctx.live_branch(branch).await?.locks)
    }
}
