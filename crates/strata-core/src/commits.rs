//! Writing and reading commits.
//!
//! A commit is written in two steps: the commit record is inserted, then
//! the branch head is moved to it with a compare-and-set on the previous
//! head. Losing the race removes the inserted record again. If the repoint
//! fails for another reason the record stays behind as an orphan (its
//! index is above the branch's head index). Orphans older than
//! [`CoreConfig::orphan_age`] are removed the next time the branch is read
//! or committed to; younger ones may still be repointed and are only
//! hidden from readers.
//!
//! [`CoreConfig::orphan_age`]: crate::config::CoreConfig::orphan_age

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strata_ledger::{Commit, CommitPatch, FileChanges, HistoryValidator, ValidationReport};
use strata_refs::{Branch, RefError};
use strata_types::{BranchId, CommitId, TeamId, UserId};
use tracing::{error, info, instrument, warn};

use crate::deps::ServiceContext;
use crate::error::{CoreError, CoreResult};
use crate::project::Project;

/// Input of [`CommitService::create_commit`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub branch_id: BranchId,
    /// `None` for system-authored commits.
    #[serde(default)]
    pub author: Option<UserId>,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub changes: FileChanges,
}

/// A branch together with the commit it points to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchWithCommit {
    pub branch: Branch,
    pub commit: Commit,
}

#[derive(Clone, Debug)]
pub struct CommitService {
    ctx: ServiceContext,
}

impl CommitService {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Remove commits left above the branch head by a failed repoint.
    async fn heal(&self, branch: &Branch) -> CoreResult<()> {
        let age = chrono::Duration::from_std(self.ctx.config.orphan_age())
            .map_err(|e| CoreError::invalid(format!("orphan age: {e}")))?;
        let removed = self
            .ctx
            .doc(
                "orphan cleanup",
                self.ctx
                    .deps
                    .commits
                    .delete_above(&branch.id, branch.head_index, Utc::now() - age),
            )
            .await?;
        if removed > 0 {
            warn!(branch = %branch.id, head_index = branch.head_index, removed, "removed orphaned commits");
        }
        Ok(())
    }

    async fn head_commit(&self, branch: &Branch) -> CoreResult<Commit> {
        self.ctx
            .doc("commit lookup", self.ctx.deps.commits.get(&branch.head))
            .await?
            .ok_or_else(|| {
                CoreError::Upstream(format!(
                    "head {} of branch {} is missing",
                    branch.head, branch.id
                ))
            })
    }

    /// Append a commit to a branch.
    ///
    /// Fails with `Conflict` before writing anything when a touched path is
    /// locked by someone other than the author, and with `Conflict` after
    /// rolling back when another commit won the race for the same index.
    #[instrument(skip(self, request), fields(branch = %request.branch_id))]
    pub async fn create_commit(&self, request: CommitRequest) -> CoreResult<Commit> {
        let deps = &self.ctx.deps;
        let branch = self.ctx.live_branch(&request.branch_id).await?;

        let conflicts = branch
            .locks
            .conflicts(request.author.as_ref(), request.changes.touched());
        if !conflicts.is_empty() {
            let listed: Vec<String> = conflicts
                .iter()
                .map(|c| format!("{} (locked by {})", c.path, c.holder))
                .collect();
            return Err(CoreError::conflict(format!(
                "locked paths: {}",
                listed.join(", ")
            )));
        }

        self.heal(&branch).await?;
        let head = self.head_commit(&branch).await?;
        let files = request.changes.apply(&head.files)?;

        let FileChanges {
            created,
            modified,
            deleted,
            ..
        } = request.changes;
        let commit = Commit {
            id: CommitId::new(),
            project_id: branch.project_id,
            branch_id: branch.id,
            index: branch.next_index(),
            created_at: Utc::now(),
            author: request.author,
            message: request.message,
            created,
            modified,
            deleted,
            files,
        };

        self.ctx
            .doc("commit insert", deps.commits.insert(&commit))
            .await
            .map_err(|e| match e {
                CoreError::Ledger(strata_ledger::LedgerError::DuplicateIndex { index, .. }) => {
                    CoreError::conflict(format!(
                        "index {index} of branch {} was taken by a concurrent commit",
                        branch.id
                    ))
                }
                other => other,
            })?;

        if let Err(e) = self.ctx.recheck_live(&commit.project_id).await {
            self.discard(&commit, "project deleted while committing").await;
            return Err(e);
        }

        match self
            .ctx
            .doc(
                "branch repoint",
                deps.branches
                    .advance(&branch.id, &branch.head, &commit.id, commit.index),
            )
            .await
        {
            Ok(_) => {
                info!(
                    commit = %commit.id,
                    index = commit.index,
                    files = commit.files.len(),
                    "commit created"
                );
                Ok(commit)
            }
            Err(CoreError::Ref(RefError::StaleHead { actual, .. })) => {
                self.discard(&commit, "lost repoint race").await;
                Err(CoreError::conflict(format!(
                    "branch {} moved to {actual} while committing",
                    branch.id
                )))
            }
            Err(e) => {
                warn!(
                    commit = %commit.id,
                    index = commit.index,
                    error = %e,
                    "branch repoint failed; commit left orphaned"
                );
                Err(e)
            }
        }
    }

    /// Delete a commit that must not stay behind; failures are logged.
    async fn discard(&self, commit: &Commit, reason: &'static str) {
        if let Err(e) = self
            .ctx
            .doc("commit delete", self.ctx.deps.commits.delete(&commit.id))
            .await
        {
            error!(
                project = %commit.project_id,
                branch = %commit.branch_id,
                commit = %commit.id,
                index = commit.index,
                reason,
                error = %e,
                "failed to roll back commit"
            );
        }
    }

    /// Resolve a project by team and name, then its live branch by name.
    #[instrument(skip(self))]
    pub async fn get_branch_with_latest_commit(
        &self,
        team: &TeamId,
        project_name: &str,
        branch_name: &str,
    ) -> CoreResult<BranchWithCommit> {
        let deps = &self.ctx.deps;
        let project: Project = self
            .ctx
            .doc(
                "project lookup",
                deps.projects.find_by_name(team, project_name),
            )
            .await?
            .filter(|p| !p.is_deleting())
            .ok_or_else(|| {
                CoreError::not_found(format!("project {project_name:?} in team {team}"))
            })?;
        let branch = self
            .ctx
            .doc(
                "branch lookup",
                deps.branches.find_by_name(&project.id, branch_name),
            )
            .await?
            .ok_or_else(|| {
                CoreError::not_found(format!(
                    "branch {branch_name:?} in project {project_name:?}"
                ))
            })?;
        self.heal(&branch).await?;
        let commit = self.head_commit(&branch).await?;
        Ok(BranchWithCommit { branch, commit })
    }

    pub async fn get_commit(&self, id: &CommitId) -> CoreResult<Commit> {
        self.ctx
            .doc("commit lookup", self.ctx.deps.commits.get(id))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("commit {id}")))
    }

    /// Commits of a branch up to its head, in ascending index order.
    pub async fn list_commits(&self, branch: &BranchId) -> CoreResult<Vec<Commit>> {
        let branch = self.ctx.live_branch(branch).await?;
        self.heal(&branch).await?;
        let mut commits = self
            .ctx
            .doc(
                "commit list",
                self.ctx.deps.commits.list_by_branch(&branch.id),
            )
            .await?;
        commits.retain(|c| c.index <= branch.head_index);
        Ok(commits)
    }

    /// Patch the message or path lists of a commit.
    #[instrument(skip(self))]
    pub async fn update_commit(&self, id: &CommitId, patch: &CommitPatch) -> CoreResult<Commit> {
        let current = self.get_commit(id).await?;
        self.ctx.recheck_live(&current.project_id).await?;
        if patch.is_empty() {
            return Ok(current);
        }
        let commit = self
            .ctx
            .doc("commit update", self.ctx.deps.commits.update(id, patch))
            .await?;
        info!(commit = %id, "commit updated");
        Ok(commit)
    }

    pub async fn validate_branch_history(&self, branch: &BranchId) -> CoreResult<ValidationReport> {
        let branch = self.ctx.live_branch(branch).await?;
        let report = self
            .ctx
            .doc(
                "history validation",
                HistoryValidator::validate_branch(self.ctx.deps.commits.as_ref(), &branch.id),
            )
            .await?;
        if !report.is_valid() {
            warn!(branch = %branch.id, violations = report.violations.len(), "branch history has violations");
        }
        Ok(report)
    }
}
