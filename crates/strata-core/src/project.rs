//! Project records and their storage.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_types::{BranchId, ProjectId, TeamId, UserId};

use crate::error::{CoreError, CoreResult};

/// A versioned workspace owned by a team.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub team_id: TeamId,
    /// Unique within the team.
    pub name: String,
    pub default_branch: BranchId,
    pub storage_grant: Option<StorageGrant>,
    pub created_at: DateTime<Utc>,
    /// Set when a cascading delete has started.
    pub deleting_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn is_deleting(&self) -> bool {
        self.deleting_at.is_some()
    }
}

/// Storage allowance granted to a project by the billing layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageGrant {
    pub quota_bytes: u64,
    pub granted_by: Option<UserId>,
    pub granted_at: DateTime<Utc>,
}

/// Mutable fields of a project. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_branch: Option<BranchId>,
    #[serde(default)]
    pub storage_grant: Option<StorageGrant>,
    /// Remove the storage grant. Takes precedence over `storage_grant`.
    #[serde(default)]
    pub clear_storage_grant: bool,
}

impl ProjectPatch {
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(branch) = self.default_branch {
            project.default_branch = branch;
        }
        if self.clear_storage_grant {
            project.storage_grant = None;
        } else if let Some(grant) = &self.storage_grant {
            project.storage_grant = Some(grant.clone());
        }
    }
}

/// Storage backend for project records.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Fails with `Conflict` if the team already has a project of that name.
    async fn insert(&self, project: &Project) -> CoreResult<()>;

    async fn get(&self, id: &ProjectId) -> CoreResult<Option<Project>>;

    async fn find_by_name(&self, team: &TeamId, name: &str) -> CoreResult<Option<Project>>;

    /// Projects of a team ordered by creation time.
    async fn list_by_team(&self, team: &TeamId) -> CoreResult<Vec<Project>>;

    /// Every project ID, for sweeps that span teams.
    async fn list_ids(&self) -> CoreResult<Vec<ProjectId>>;

    /// Atomically apply a patch. Renames re-check team uniqueness.
    async fn update(&self, id: &ProjectId, patch: &ProjectPatch) -> CoreResult<Project>;

    /// Record the start of a cascading delete. Keeps an earlier marker.
    async fn mark_deleting(&self, id: &ProjectId, at: DateTime<Utc>) -> CoreResult<Project>;

    /// Returns `true` if the project existed.
    async fn delete(&self, id: &ProjectId) -> CoreResult<bool>;
}

/// An in-memory implementation of [`ProjectStore`].
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CoreResult<RwLockReadGuard<'_, HashMap<ProjectId, Project>>> {
        self.projects
            .read()
            .map_err(|e| CoreError::Upstream(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> CoreResult<RwLockWriteGuard<'_, HashMap<ProjectId, Project>>> {
        self.projects
            .write()
            .map_err(|e| CoreError::Upstream(format!("lock poisoned: {e}")))
    }
}

fn name_taken(
    projects: &HashMap<ProjectId, Project>,
    team: &TeamId,
    name: &str,
    except: Option<&ProjectId>,
) -> bool {
    projects
        .values()
        .any(|p| &p.team_id == team && p.name == name && Some(&p.id) != except)
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn insert(&self, project: &Project) -> CoreResult<()> {
        let mut projects = self.write()?;
        if name_taken(&projects, &project.team_id, &project.name, None) {
            return Err(CoreError::conflict(format!(
                "team {} already has a project named {:?}",
                project.team_id, project.name
            )));
        }
        if projects.contains_key(&project.id) {
            return Err(CoreError::conflict(format!(
                "project {} already exists",
                project.id
            )));
        }
        projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn get(&self, id: &ProjectId) -> CoreResult<Option<Project>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn find_by_name(&self, team: &TeamId, name: &str) -> CoreResult<Option<Project>> {
        Ok(self
            .read()?
            .values()
            .find(|p| &p.team_id == team && p.name == name)
            .cloned())
    }

    async fn list_by_team(&self, team: &TeamId) -> CoreResult<Vec<Project>> {
        let mut result: Vec<Project> = self
            .read()?
            .values()
            .filter(|p| &p.team_id == team)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn list_ids(&self) -> CoreResult<Vec<ProjectId>> {
        let mut ids: Vec<ProjectId> = self.read()?.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn update(&self, id: &ProjectId, patch: &ProjectPatch) -> CoreResult<Project> {
        let mut projects = self.write()?;
        let team = projects
            .get(id)
            .map(|p| p.team_id.clone())
            .ok_or_else(|| CoreError::not_found(format!("project {id}")))?;
        if let Some(name) = &patch.name {
            if name_taken(&projects, &team, name, Some(id)) {
                return Err(CoreError::conflict(format!(
                    "team {team} already has a project named {name:?}"
                )));
            }
        }
        let project = projects
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("project {id}")))?;
        patch.apply_to(project);
        Ok(project.clone())
    }

    async fn mark_deleting(&self, id: &ProjectId, at: DateTime<Utc>) -> CoreResult<Project> {
        let mut projects = self.write()?;
        let project = projects
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("project {id}")))?;
        project.deleting_at.get_or_insert(at);
        Ok(project.clone())
    }

    async fn delete(&self, id: &ProjectId) -> CoreResult<bool> {
        Ok(self.write()?.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn project(team: &str, name: &str) -> Project {
        Project {
            id: ProjectId::new(),
            team_id: TeamId::new(team).unwrap(),
            name: name.into(),
            default_branch: BranchId::new(),
            storage_grant: None,
            created_at: Utc::now(),
            deleting_at: None,
        }
    }

    #[tokio::test]
    async fn names_are_unique_per_team() {
        let store = InMemoryProjectStore::new();
        store.insert(&project("t1", "p1")).await.unwrap();
        let err = store.insert(&project("t1", "p1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        store.insert(&project("t2", "p1")).await.unwrap();
    }

    #[tokio::test]
    async fn rename_checks_collisions() {
        let store = InMemoryProjectStore::new();
        let a = project("t1", "a");
        store.insert(&a).await.unwrap();
        store.insert(&project("t1", "b")).await.unwrap();

        let patch = ProjectPatch {
            name: Some("b".into()),
            ..Default::default()
        };
        assert_eq!(
            store.update(&a.id, &patch).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );

        let same = ProjectPatch {
            name: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(store.update(&a.id, &same).await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn storage_grant_can_be_set_and_cleared() {
        let store = InMemoryProjectStore::new();
        let p = project("t1", "p");
        store.insert(&p).await.unwrap();

        let grant = StorageGrant {
            quota_bytes: 1 << 30,
            granted_by: None,
            granted_at: Utc::now(),
        };
        let set = ProjectPatch {
            storage_grant: Some(grant.clone()),
            ..Default::default()
        };
        assert_eq!(
            store.update(&p.id, &set).await.unwrap().storage_grant,
            Some(grant)
        );

        let clear = ProjectPatch {
            clear_storage_grant: true,
            ..Default::default()
        };
        assert!(store
            .update(&p.id, &clear)
            .await
            .unwrap()
            .storage_grant
            .is_none());
    }

    #[tokio::test]
    async fn deleting_marker_is_sticky() {
        let store = InMemoryProjectStore::new();
        let p = project("t1", "p");
        store.insert(&p).await.unwrap();
        let first = Utc::now();
        store.mark_deleting(&p.id, first).await.unwrap();
        let again = store
            .mark_deleting(&p.id, first + chrono::Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(again.deleting_at, Some(first));
        assert!(store.delete(&p.id).await.unwrap());
        assert!(!store.delete(&p.id).await.unwrap());
    }
}
