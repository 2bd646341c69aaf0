//! In-memory branch store for testing and ephemeral use.
//!
//! [`InMemoryBranchStore`] keeps all branches in a `HashMap` behind a
//! `RwLock`. Each trait method takes the write lock once, which gives the
//! same single-document atomicity a document database provides.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strata_types::{BranchId, CommitId, ProjectId, RepoPath, UserId};

use crate::error::{RefError, Result};
use crate::names::validate_branch_name;
use crate::traits::BranchStore;
use crate::types::Branch;

/// An in-memory implementation of [`BranchStore`].
#[derive(Debug, Default)]
pub struct InMemoryBranchStore {
    branches: RwLock<HashMap<BranchId, Branch>>,
}

impl InMemoryBranchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored branches, including soft-deleted ones.
    pub fn len(&self) -> usize {
        self.branches.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<BranchId, Branch>>> {
        self.branches
            .read()
            .map_err(|e| RefError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<BranchId, Branch>>> {
        self.branches
            .write()
            .map_err(|e| RefError::Backend(format!("lock poisoned: {e}")))
    }

    /// Apply `f` to a stored branch under the write lock.
    fn update<F>(&self, id: &BranchId, f: F) -> Result<Branch>
    where
        F: FnOnce(&mut Branch) -> Result<()>,
    {
        let mut branches = self.write()?;
        let branch = branches.get_mut(id).ok_or(RefError::NotFound(*id))?;
        f(branch)?;
        Ok(branch.clone())
    }
}

#[async_trait]
impl BranchStore for InMemoryBranchStore {
    async fn insert(&self, branch: &Branch) -> Result<()> {
        validate_branch_name(&branch.name)?;
        let mut branches = self.write()?;
        let taken = branches.values().any(|b| {
            b.project_id == branch.project_id && b.name == branch.name && !b.is_deleted()
        });
        if taken || branches.contains_key(&branch.id) {
            return Err(RefError::AlreadyExists {
                name: branch.name.clone(),
            });
        }
        branches.insert(branch.id, branch.clone());
        Ok(())
    }

    async fn get(&self, id: &BranchId) -> Result<Option<Branch>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn find_by_name(&self, project: &ProjectId, name: &str) -> Result<Option<Branch>> {
        Ok(self
            .read()?
            .values()
            .find(|b| &b.project_id == project && b.name == name && !b.is_deleted())
            .cloned())
    }

    async fn list(&self, project: &ProjectId, include_deleted: bool) -> Result<Vec<Branch>> {
        let mut result: Vec<Branch> = self
            .read()?
            .values()
            .filter(|b| &b.project_id == project && (include_deleted || !b.is_deleted()))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn advance(
        &self,
        id: &BranchId,
        expected: &CommitId,
        head: &CommitId,
        index: u64,
    ) -> Result<Branch> {
        self.update(id, |branch| {
            if &branch.head != expected {
                return Err(RefError::StaleHead {
                    branch: branch.id,
                    expected: *expected,
                    actual: branch.head,
                });
            }
            branch.head = *head;
            branch.head_index = index;
            Ok(())
        })
    }

    async fn add_locks(
        &self,
        id: &BranchId,
        holder: &UserId,
        paths: &[RepoPath],
        now: DateTime<Utc>,
    ) -> Result<Branch> {
        self.update(id, |branch| {
            branch.locks.lock(holder, paths, now);
            Ok(())
        })
    }

    async fn remove_locks(&self, id: &BranchId, paths: &[RepoPath]) -> Result<Branch> {
        self.update(id, |branch| {
            branch.locks.unlock(paths);
            Ok(())
        })
    }

    async fn soft_delete(&self, id: &BranchId, at: DateTime<Utc>) -> Result<Branch> {
        self.update(id, |branch| {
            branch.deleted_at.get_or_insert(at);
            Ok(())
        })
    }

    async fn delete(&self, id: &BranchId) -> Result<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    async fn delete_by_project(&self, project: &ProjectId) -> Result<usize> {
        let mut branches = self.write()?;
        let before = branches.len();
        branches.retain(|_, b| &b.project_id != project);
        Ok(before - branches.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn p(s: &str) -> RepoPath {
        RepoPath::new(s).unwrap()
    }

    fn u(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    async fn seeded() -> (InMemoryBranchStore, Branch) {
        let store = InMemoryBranchStore::new();
        let branch = Branch::new(ProjectId::new(), "stable", CommitId::new());
        store.insert(&branch).await.unwrap();
        (store, branch)
    }

    // ---- Insert and lookup ----

    #[tokio::test]
    async fn insert_and_find_by_name() {
        let (store, branch) = seeded().await;
        let found = store
            .find_by_name(&branch.project_id, "stable")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, branch.id);
        assert!(store.get(&BranchId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_live_name_is_rejected() {
        let (store, branch) = seeded().await;
        let dup = Branch::new(branch.project_id, "stable", CommitId::new());
        assert!(matches!(
            store.insert(&dup).await,
            Err(RefError::AlreadyExists { .. })
        ));

        let elsewhere = Branch::new(ProjectId::new(), "stable", CommitId::new());
        store.insert(&elsewhere).await.unwrap();
    }

    #[tokio::test]
    async fn soft_deleted_names_can_be_reused() {
        let (store, branch) = seeded().await;
        store.soft_delete(&branch.id, Utc::now()).await.unwrap();
        assert!(store
            .find_by_name(&branch.project_id, "stable")
            .await
            .unwrap()
            .is_none());

        let again = Branch::new(branch.project_id, "stable", CommitId::new());
        store.insert(&again).await.unwrap();
        assert_eq!(store.list(&branch.project_id, false).await.unwrap().len(), 1);
        assert_eq!(store.list(&branch.project_id, true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let store = InMemoryBranchStore::new();
        let bad = Branch::new(ProjectId::new(), "bad..name", CommitId::new());
        assert!(matches!(
            store.insert(&bad).await,
            Err(RefError::InvalidName { .. })
        ));
    }

    // ---- Repoint ----

    #[tokio::test]
    async fn advance_is_compare_and_set() {
        let (store, branch) = seeded().await;
        let next = CommitId::new();
        let moved = store.advance(&branch.id, &branch.head, &next, 2).await.unwrap();
        assert_eq!(moved.head, next);
        assert_eq!(moved.head_index, 2);

        let err = store
            .advance(&branch.id, &branch.head, &CommitId::new(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, RefError::StaleHead { .. }));
    }

    #[tokio::test]
    async fn advance_unknown_branch_is_not_found() {
        let store = InMemoryBranchStore::new();
        let err = store
            .advance(&BranchId::new(), &CommitId::new(), &CommitId::new(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, RefError::NotFound(_)));
    }

    // ---- Locks ----

    #[tokio::test]
    async fn lock_and_unlock_are_idempotent() {
        let (store, branch) = seeded().await;
        let paths = [p("a.txt"), p("b.txt")];

        let once = store
            .add_locks(&branch.id, &u("alice"), &paths, Utc::now())
            .await
            .unwrap();
        let twice = store
            .add_locks(&branch.id, &u("alice"), &paths, Utc::now())
            .await
            .unwrap();
        assert_eq!(once.locks, twice.locks);
        assert_eq!(twice.locks.len(), 2);

        let after = store.remove_locks(&branch.id, &[p("a.txt")]).await.unwrap();
        let again = store.remove_locks(&branch.id, &[p("a.txt")]).await.unwrap();
        assert_eq!(after.locks, again.locks);
        assert_eq!(again.locks.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_lockers_do_not_lose_updates() {
        let store = Arc::new(InMemoryBranchStore::new());
        let branch = Branch::new(ProjectId::new(), "stable", CommitId::new());
        store.insert(&branch).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            let id = branch.id;
            handles.push(tokio::spawn(async move {
                let path = p(&format!("file-{i}.bin"));
                store
                    .add_locks(&id, &u(&format!("user{i}")), &[path], Utc::now())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let stored = store.get(&branch.id).await.unwrap().unwrap();
        assert_eq!(stored.locks.len(), 32);
    }

    // ---- Deletion ----

    #[tokio::test]
    async fn delete_by_project_only_touches_that_project() {
        let (store, branch) = seeded().await;
        let other = Branch::new(ProjectId::new(), "stable", CommitId::new());
        store.insert(&other).await.unwrap();

        assert_eq!(store.delete_by_project(&branch.project_id).await.unwrap(), 1);
        assert_eq!(store.delete_by_project(&branch.project_id).await.unwrap(), 0);
        assert!(store.get(&other.id).await.unwrap().is_some());
    }
}
