//! In-memory commit store for testing and ephemeral use.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strata_types::{BranchId, CommitId, ProjectId};

use crate::error::{LedgerError, Result};
use crate::records::{Commit, CommitPatch};
use crate::traits::CommitStore;

/// An in-memory implementation of [`CommitStore`].
///
/// Commits are keyed by ID, with a secondary `(branch, index)` index that
/// enforces per-branch index uniqueness and an ordered `(project, id)`
/// index that project paging walks.
#[derive(Debug, Default)]
pub struct InMemoryCommitStore {
    inner: RwLock<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    commits: HashMap<CommitId, Commit>,
    by_branch: BTreeMap<(BranchId, u64), CommitId>,
    by_project: BTreeSet<(ProjectId, CommitId)>,
}

impl LedgerState {
    fn remove_where<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&Commit) -> bool,
    {
        let doomed: Vec<CommitId> = self
            .commits
            .values()
            .filter(|c| pred(c))
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            self.remove(id);
        }
        doomed.len()
    }

    fn remove(&mut self, id: &CommitId) -> bool {
        match self.commits.remove(id) {
            Some(commit) => {
                self.by_branch.remove(&(commit.branch_id, commit.index));
                self.by_project.remove(&(commit.project_id, commit.id));
                true
            }
            None => false,
        }
    }
}

impl InMemoryCommitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.commits.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>> {
        self.inner
            .read()
            .map_err(|e| LedgerError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>> {
        self.inner
            .write()
            .map_err(|e| LedgerError::Backend(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl CommitStore for InMemoryCommitStore {
    async fn insert(&self, commit: &Commit) -> Result<()> {
        let mut state = self.write()?;
        if state.commits.contains_key(&commit.id) {
            return Err(LedgerError::AlreadyExists(commit.id));
        }
        let slot = (commit.branch_id, commit.index);
        if state.by_branch.contains_key(&slot) {
            return Err(LedgerError::DuplicateIndex {
                branch: commit.branch_id,
                index: commit.index,
            });
        }
        state.by_branch.insert(slot, commit.id);
        state.by_project.insert((commit.project_id, commit.id));
        state.commits.insert(commit.id, commit.clone());
        Ok(())
    }

    async fn get(&self, id: &CommitId) -> Result<Option<Commit>> {
        Ok(self.read()?.commits.get(id).cloned())
    }

    async fn list_by_branch(&self, branch: &BranchId) -> Result<Vec<Commit>> {
        let state = self.read()?;
        Ok(state
            .by_branch
            .range((*branch, 0)..=(*branch, u64::MAX))
            .filter_map(|(_, id)| state.commits.get(id))
            .cloned()
            .collect())
    }

    async fn page_by_project(
        &self,
        project: &ProjectId,
        after: Option<&CommitId>,
        limit: usize,
    ) -> Result<Vec<Commit>> {
        let state = self.read()?;
        let start = match after {
            Some(after) => Bound::Excluded((*project, *after)),
            None => Bound::Included((*project, CommitId::nil())),
        };
        Ok(state
            .by_project
            .range((start, Bound::Unbounded))
            .take_while(|(p, _)| p == project)
            .take(limit)
            .filter_map(|(_, id)| state.commits.get(id))
            .cloned()
            .collect())
    }

    async fn update(&self, id: &CommitId, patch: &CommitPatch) -> Result<Commit> {
        let mut state = self.write()?;
        let commit = state
            .commits
            .get_mut(id)
            .ok_or(LedgerError::NotFound(*id))?;
        patch.apply_to(commit);
        Ok(commit.clone())
    }

    async fn delete(&self, id: &CommitId) -> Result<bool> {
        Ok(self.write()?.remove(id))
    }

    async fn delete_by_branch(&self, branch: &BranchId) -> Result<usize> {
        Ok(self.write()?.remove_where(|c| &c.branch_id == branch))
    }

    async fn delete_by_project(&self, project: &ProjectId) -> Result<usize> {
        Ok(self.write()?.remove_where(|c| &c.project_id == project))
    }

    async fn delete_above(
        &self,
        branch: &BranchId,
        index: u64,
        created_before: DateTime<Utc>,
    ) -> Result<usize> {
        Ok(self.write()?.remove_where(|c| {
            &c.branch_id == branch && c.index > index && c.created_at < created_before
        }))
    }
}
