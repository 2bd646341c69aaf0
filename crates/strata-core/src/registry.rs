//! Project and branch lifecycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strata_ledger::{Commit, FileMap};
use strata_refs::{validate_branch_name, validate_project_name, Branch};
use strata_store::ObjectKey;
use strata_types::{BranchId, ProjectId, TeamId};
use tracing::{error, info, instrument, warn};

use crate::deps::ServiceContext;
use crate::error::{CoreError, CoreResult};
use crate::project::{Project, ProjectPatch};

/// What a cascading project delete removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub project_id: ProjectId,
    pub commits_deleted: usize,
    pub branches_deleted: usize,
    pub blobs_deleted: usize,
    /// Keys the best-effort blob purge could not remove. The garbage
    /// collector never revisits them once the project is gone.
    pub blobs_failed: Vec<String>,
}

/// Creates, reads, updates and deletes projects and branches.
#[derive(Clone, Debug)]
pub struct ProjectRegistry {
    ctx: ServiceContext,
}

impl ProjectRegistry {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    // ---- Projects ----

    /// Create a project together with its default branch and an empty
    /// initial commit.
    #[instrument(skip(self))]
    pub async fn create_project(&self, team: &TeamId, name: &str) -> CoreResult<Project> {
        validate_project_name(name)?;
        let deps = &self.ctx.deps;
        if self
            .ctx
            .doc("project lookup", deps.projects.find_by_name(team, name))
            .await?
            .is_some()
        {
            return Err(CoreError::conflict(format!(
                "team {team} already has a project named {name:?}"
            )));
        }

        let project_id = ProjectId::new();
        let branch_id = BranchId::new();
        let commit = Commit::initial(project_id, branch_id, "Initial commit", FileMap::new());
        let branch = Branch {
            id: branch_id,
            ..Branch::new(project_id, self.ctx.config.default_branch.clone(), commit.id)
        };
        let project = Project {
            id: project_id,
            team_id: team.clone(),
            name: name.to_string(),
            default_branch: branch_id,
            storage_grant: None,
            created_at: Utc::now(),
            deleting_at: None,
        };

        self.ctx
            .doc("commit insert", deps.commits.insert(&commit))
            .await?;
        if let Err(e) = self
            .ctx
            .doc("branch insert", deps.branches.insert(&branch))
            .await
        {
            self.discard_commit(&commit).await;
            return Err(e);
        }
        if let Err(e) = self
            .ctx
            .doc("project insert", deps.projects.insert(&project))
            .await
        {
            self.discard_branch(&branch).await;
            self.discard_commit(&commit).await;
            return Err(e);
        }

        info!(project = %project.id, %team, name, "project created");
        Ok(project)
    }

    pub async fn get_project(&self, id: &ProjectId) -> CoreResult<Project> {
        self.ctx
            .doc("project lookup", self.ctx.deps.projects.get(id))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("project {id}")))
    }

    /// A project that is not being deleted.
    pub(crate) async fn live_project(&self, id: &ProjectId) -> CoreResult<Project> {
        self.ctx.live_project(id).await
    }

    pub async fn list_projects(&self, team: &TeamId) -> CoreResult<Vec<Project>> {
        self.ctx
            .doc("project list", self.ctx.deps.projects.list_by_team(team))
            .await
    }

    pub async fn find_project(&self, team: &TeamId, name: &str) -> CoreResult<Project> {
        self.ctx
            .doc(
                "project lookup",
                self.ctx.deps.projects.find_by_name(team, name),
            )
            .await?
            .filter(|p| !p.is_deleting())
            .ok_or_else(|| CoreError::not_found(format!("project {name:?} in team {team}")))
    }

    #[instrument(skip(self))]
    pub async fn update_project(&self, id: &ProjectId, patch: &ProjectPatch) -> CoreResult<Project> {
        self.live_project(id).await?;
        if let Some(name) = &patch.name {
            validate_project_name(name)?;
        }
        if let Some(branch_id) = &patch.default_branch {
            let branch = self
                .ctx
                .doc("branch lookup", self.ctx.deps.branches.get(branch_id))
                .await?;
            match branch {
                Some(b) if &b.project_id == id && !b.is_deleted() => {}
                _ => {
                    return Err(CoreError::invalid(format!(
                        "branch {branch_id} is not a live branch of project {id}"
                    )))
                }
            }
        }
        let project = self
            .ctx
            .doc("project update", self.ctx.deps.projects.update(id, patch))
            .await?;
        info!(project = %id, "project updated");
        Ok(project)
    }

    /// Delete a project with everything it owns.
    ///
    /// Steps run in order: mark the project deleting, delete its commits,
    /// delete its branches, purge its blob prefix (best-effort), delete
    /// the project record. Each step is idempotent, so a failed delete can
    /// simply be retried.
    #[instrument(skip(self))]
    pub async fn delete_project(&self, id: &ProjectId) -> CoreResult<DeleteReport> {
        let deps = &self.ctx.deps;
        self.get_project(id).await?;
        self.ctx
            .doc("project mark", deps.projects.mark_deleting(id, Utc::now()))
            .await?;
        info!(project = %id, "project delete started");

        let commits_deleted = self
            .ctx
            .doc("commit purge", deps.commits.delete_by_project(id))
            .await?;
        info!(project = %id, commits_deleted, "project commits deleted");

        let branches_deleted = self
            .ctx
            .doc("branch purge", deps.branches.delete_by_project(id))
            .await?;
        info!(project = %id, branches_deleted, "project branches deleted");

        let (blobs_deleted, blobs_failed) = self.purge_blobs(id).await;
        if blobs_failed.is_empty() {
            info!(project = %id, blobs_deleted, "project blobs purged");
        } else {
            warn!(
                project = %id,
                blobs_deleted,
                failed = blobs_failed.len(),
                "project blob purge incomplete"
            );
        }

        self.ctx
            .doc("project delete", deps.projects.delete(id))
            .await?;
        info!(project = %id, "project deleted");

        Ok(DeleteReport {
            project_id: *id,
            commits_deleted,
            branches_deleted,
            blobs_deleted,
            blobs_failed,
        })
    }

    async fn purge_blobs(&self, id: &ProjectId) -> (usize, Vec<String>) {
        let objects = &self.ctx.deps.objects;
        let prefix = ObjectKey::project_prefix(id);
        let mut deleted = 0;
        let mut failed = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = match self
                .ctx
                .storage(
                    "blob listing",
                    objects.list(&prefix, continuation.as_deref(), self.ctx.config.gc_page_size),
                )
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(project = %id, error = %e, "blob listing failed during purge");
                    failed.push(prefix.clone());
                    break;
                }
            };
            for meta in page.objects {
                let result = match ObjectKey::parse(&meta.key) {
                    Ok(key) => self.ctx.storage("blob delete", objects.delete(&key)).await,
                    Err(e) => Err(e.into()),
                };
                match result {
                    Ok(_) => deleted += 1,
                    Err(e) => {
                        warn!(key = %meta.key, error = %e, "blob delete failed during purge");
                        failed.push(meta.key);
                    }
                }
            }
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        (deleted, failed)
    }

    // ---- Branches ----

    /// Branch off `from` (or the project's default branch). The new branch
    /// starts with a system commit carrying the source head's file map.
    #[instrument(skip(self))]
    pub async fn create_branch(
        &self,
        project_id: &ProjectId,
        name: &str,
        from: Option<&BranchId>,
    ) -> CoreResult<Branch> {
        validate_branch_name(name)?;
        let project = self.live_project(project_id).await?;
        let deps = &self.ctx.deps;

        let source_id = from.copied().unwrap_or(project.default_branch);
        let source = self
            .ctx
            .doc("branch lookup", deps.branches.get(&source_id))
            .await?
            .filter(|b| !b.is_deleted())
            .ok_or_else(|| CoreError::not_found(format!("branch {source_id}")))?;
        if &source.project_id != project_id {
            return Err(CoreError::invalid(format!(
                "branch {source_id} belongs to another project"
            )));
        }
        if self
            .ctx
            .doc("branch lookup", deps.branches.find_by_name(project_id, name))
            .await?
            .is_some()
        {
            return Err(CoreError::conflict(format!("branch {name:?} already exists")));
        }
        let head = self
            .ctx
            .doc("commit lookup", deps.commits.get(&source.head))
            .await?
            .ok_or_else(|| {
                CoreError::Upstream(format!(
                    "head {} of branch {} is missing",
                    source.head, source.id
                ))
            })?;

        let branch_id = BranchId::new();
        let commit = Commit::initial(
            *project_id,
            branch_id,
            format!("Branch {name} created from {}", source.name),
            head.files,
        );
        let branch = Branch {
            id: branch_id,
            ..Branch::new(*project_id, name, commit.id)
        };

        self.ctx
            .doc("commit insert", deps.commits.insert(&commit))
            .await?;
        if let Err(e) = self
            .ctx
            .doc("branch insert", deps.branches.insert(&branch))
            .await
        {
            self.discard_commit(&commit).await;
            return Err(e);
        }
        if let Err(e) = self.ctx.recheck_live(project_id).await {
            self.discard_branch(&branch).await;
            self.discard_commit(&commit).await;
            return Err(e);
        }

        info!(project = %project_id, branch = %branch.id, name, source = %source.id, "branch created");
        Ok(branch)
    }

    pub async fn get_branch(&self, id: &BranchId) -> CoreResult<Branch> {
        self.ctx.live_branch(id).await
    }

    pub async fn list_branches(&self, project: &ProjectId) -> CoreResult<Vec<Branch>> {
        self.live_project(project).await?;
        self.ctx
            .doc("branch list", self.ctx.deps.branches.list(project, false))
            .await
    }

    /// Soft delete marks the branch; hard delete also removes its commits
    /// and the record itself. The default branch cannot be deleted.
    #[instrument(skip(self))]
    pub async fn delete_branch(&self, id: &BranchId, hard: bool) -> CoreResult<()> {
        let deps = &self.ctx.deps;
        let branch = self
            .ctx
            .doc("branch lookup", deps.branches.get(id))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("branch {id}")))?;
        let project = self.live_project(&branch.project_id).await?;
        if project.default_branch == branch.id {
            return Err(CoreError::conflict(format!(
                "branch {id} is the default branch of project {}",
                project.id
            )));
        }

        if hard {
            let commits_deleted = self
                .ctx
                .doc("commit purge", deps.commits.delete_by_branch(id))
                .await?;
            self.ctx
                .doc("branch delete", deps.branches.delete(id))
                .await?;
            info!(branch = %id, commits_deleted, "branch hard-deleted");
        } else {
            self.ctx
                .doc("branch delete", deps.branches.soft_delete(id, Utc::now()))
                .await?;
            info!(branch = %id, "branch soft-deleted");
        }
        Ok(())
    }

    // ---- Compensation ----

    async fn discard_commit(&self, commit: &Commit) {
        if let Err(e) = self
            .ctx
            .doc("commit delete", self.ctx.deps.commits.delete(&commit.id))
            .await
        {
            error!(
                project = %commit.project_id,
                branch = %commit.branch_id,
                commit = %commit.id,
                error = %e,
                "failed to roll back commit insert"
            );
        }
    }

    async fn discard_branch(&self, branch: &Branch) {
        if let Err(e) = self
            .ctx
            .doc("branch delete", self.ctx.deps.branches.delete(&branch.id))
            .await
        {
            error!(
                project = %branch.project_id,
                branch = %branch.id,
                error = %e,
                "failed to roll back branch insert"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_store::{InMemoryObjectStore, UrlSigner};
    use strata_types::ContentHash;

    use super::*;
    use crate::config::CoreConfig;
    use crate::deps::Deps;
    use crate::error::ErrorKind;

    fn registry() -> (ProjectRegistry, Deps, Arc<InMemoryObjectStore>) {
        let config = CoreConfig::default();
        let signer =
            UrlSigner::ephemeral(&config.endpoint, &config.bucket, config.presign_ttl()).unwrap();
        let objects = Arc::new(InMemoryObjectStore::new(signer));
        let deps = Deps::in_memory(objects.clone());
        let ctx = ServiceContext::new(deps.clone(), Arc::new(config));
        (ProjectRegistry::new(ctx), deps, objects)
    }

    fn team() -> TeamId {
        TeamId::new("team-1").unwrap()
    }

    #[tokio::test]
    async fn create_project_allocates_branch_and_initial_commit() {
        let (registry, deps, _) = registry();
        let project = registry.create_project(&team(), "p1").await.unwrap();

        let branch = deps
            .branches
            .get(&project.default_branch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(branch.name, "stable");
        assert_eq!(branch.head_index, 1);

        let commit = deps.commits.get(&branch.head).await.unwrap().unwrap();
        assert_eq!(commit.index, 1);
        assert!(commit.files.is_empty());
        assert!(commit.is_system_authored());
        assert_eq!(commit.branch_id, branch.id);
        assert_eq!(commit.project_id, project.id);
    }

    #[tokio::test]
    async fn duplicate_project_name_conflicts() {
        let (registry, _, _) = registry();
        registry.create_project(&team(), "p1").await.unwrap();
        let err = registry.create_project(&team(), "p1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let other = TeamId::new("team-2").unwrap();
        registry.create_project(&other, "p1").await.unwrap();
    }

    #[tokio::test]
    async fn invalid_names_are_rejected_before_any_write() {
        let (registry, deps, _) = registry();
        let err = registry.create_project(&team(), "a/b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(deps.projects.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn default_branch_must_belong_to_the_project() {
        let (registry, _, _) = registry();
        let p1 = registry.create_project(&team(), "p1").await.unwrap();
        let p2 = registry.create_project(&team(), "p2").await.unwrap();

        let foreign = ProjectPatch {
            default_branch: Some(p2.default_branch),
            ..Default::default()
        };
        let err = registry.update_project(&p1.id, &foreign).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let dev = registry.create_branch(&p1.id, "dev", None).await.unwrap();
        let ok = ProjectPatch {
            default_branch: Some(dev.id),
            name: Some("renamed".into()),
            ..Default::default()
        };
        let updated = registry.update_project(&p1.id, &ok).await.unwrap();
        assert_eq!(updated.default_branch, dev.id);
        assert_eq!(updated.name, "renamed");
    }

    #[tokio::test]
    async fn branches_copy_the_source_map() {
        let (registry, deps, _) = registry();
        let project = registry.create_project(&team(), "p1").await.unwrap();
        let stable = deps
            .branches
            .get(&project.default_branch)
            .await
            .unwrap()
            .unwrap();
        let mut head = deps.commits.get(&stable.head).await.unwrap().unwrap();
        head.files.insert(
            strata_types::RepoPath::new("a.txt").unwrap(),
            strata_types::FileEntry::initial(ContentHash::new("h1").unwrap()),
        );
        deps.commits.delete(&head.id).await.unwrap();
        deps.commits.insert(&head).await.unwrap();

        let dev = registry.create_branch(&project.id, "dev", None).await.unwrap();
        let first = deps.commits.get(&dev.head).await.unwrap().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.files, head.files);
        assert_eq!(first.message, "Branch dev created from stable");

        let err = registry
            .create_branch(&project.id, "dev", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn default_branch_cannot_be_deleted() {
        let (registry, _, _) = registry();
        let project = registry.create_project(&team(), "p1").await.unwrap();
        let err = registry
            .delete_branch(&project.default_branch, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn soft_and_hard_branch_deletes() {
        let (registry, deps, _) = registry();
        let project = registry.create_project(&team(), "p1").await.unwrap();
        let soft = registry.create_branch(&project.id, "soft", None).await.unwrap();
        let hard = registry.create_branch(&project.id, "hard", None).await.unwrap();

        registry.delete_branch(&soft.id, false).await.unwrap();
        registry.delete_branch(&hard.id, true).await.unwrap();

        let live = registry.list_branches(&project.id).await.unwrap();
        assert_eq!(live.len(), 1);
        assert!(deps.branches.get(&soft.id).await.unwrap().is_some());
        assert!(deps.branches.get(&hard.id).await.unwrap().is_none());
        assert!(deps.commits.get(&hard.head).await.unwrap().is_none());
        assert_eq!(
            registry.get_branch(&soft.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn branches_of_a_deleting_project_are_not_found() {
        let (registry, deps, _) = registry();
        let project = registry.create_project(&team(), "p1").await.unwrap();
        let dev = registry.create_branch(&project.id, "dev", None).await.unwrap();
        deps.projects
            .mark_deleting(&project.id, Utc::now())
            .await
            .unwrap();

        for err in [
            registry.delete_branch(&dev.id, false).await.unwrap_err(),
            registry.get_branch(&dev.id).await.unwrap_err(),
            registry
                .create_branch(&project.id, "late", None)
                .await
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
        let stored = deps.branches.get(&dev.id).await.unwrap().unwrap();
        assert!(!stored.is_deleted());

        let report = registry.delete_project(&project.id).await.unwrap();
        assert_eq!(report.branches_deleted, 2);
    }

    #[tokio::test]
    async fn delete_project_cascades_and_purges_blobs() {
        let (registry, deps, objects) = registry();
        let project = registry.create_project(&team(), "p1").await.unwrap();
        registry.create_branch(&project.id, "dev", None).await.unwrap();
        let other = registry.create_project(&team(), "p2").await.unwrap();

        let hash = ContentHash::of(b"payload");
        objects
            .put_object(&ObjectKey::for_hash(project.id, &hash), &b"payload"[..])
            .unwrap();
        objects
            .put_object(&ObjectKey::for_hash(other.id, &hash), &b"payload"[..])
            .unwrap();

        let report = registry.delete_project(&project.id).await.unwrap();
        assert_eq!(report.commits_deleted, 2);
        assert_eq!(report.branches_deleted, 2);
        assert_eq!(report.blobs_deleted, 1);
        assert!(report.blobs_failed.is_empty());

        assert_eq!(
            registry.get_project(&project.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(objects.contains(&ObjectKey::for_hash(other.id, &hash)));
        assert_eq!(deps.projects.list_ids().await.unwrap(), vec![other.id]);
    }

    #[tokio::test]
    async fn interrupted_delete_can_be_retried() {
        let (registry, deps, _) = registry();
        let project = registry.create_project(&team(), "p1").await.unwrap();
        deps.projects
            .mark_deleting(&project.id, Utc::now())
            .await
            .unwrap();
        deps.commits.delete_by_project(&project.id).await.unwrap();

        assert_eq!(
            registry.find_project(&team(), "p1").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        let report = registry.delete_project(&project.id).await.unwrap();
        assert_eq!(report.commits_deleted, 0);
        assert_eq!(report.branches_deleted, 1);
    }
}
