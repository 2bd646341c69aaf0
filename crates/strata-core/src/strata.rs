//! The [`Strata`] facade: every core operation behind one handle.

use std::sync::Arc;

use strata_ledger::{Commit, CommitPatch, ValidationReport};
use strata_refs::{Branch, LockSet};
use strata_store::{
    CompletedPart, InMemoryObjectStore, Method, ObjectMeta, PresignOptions, PresignedRequest,
    UploadId,
};
use strata_types::{BranchId, CommitId, ProjectId, RepoPath, TeamId, UserId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::blobs::BlobService;
use crate::commits::{BranchWithCommit, CommitRequest, CommitService};
use crate::config::CoreConfig;
use crate::deps::{in_memory_object_store, Deps, ServiceContext};
use crate::error::CoreResult;
use crate::gc::{GarbageCollector, ReconcileReport};
use crate::locks::LockCoordinator;
use crate::project::{Project, ProjectPatch};
use crate::registry::{DeleteReport, ProjectRegistry};

/// Entry point of the core. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Strata {
    config: Arc<CoreConfig>,
    registry: ProjectRegistry,
    locks: LockCoordinator,
    commits: CommitService,
    blobs: BlobService,
    gc: GarbageCollector,
}

impl Strata {
    pub fn new(deps: Deps, config: CoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let ctx = ServiceContext::new(deps, Arc::new(config));
        let registry = ProjectRegistry::new(ctx.clone());
        Ok(Self {
            config: ctx.config.clone(),
            locks: LockCoordinator::new(ctx.clone()),
            commits: CommitService::new(ctx.clone()),
            blobs: BlobService::new(ctx.clone(), registry.clone()),
            gc: GarbageCollector::new(ctx),
            registry,
        })
    }

    /// A core backed entirely by in-memory stores. The object store is
    /// returned too, so callers can play the part of the storage server.
    pub fn in_memory(config: CoreConfig) -> CoreResult<(Self, Arc<InMemoryObjectStore>)> {
        let objects = in_memory_object_store(&config)?;
        let strata = Self::new(Deps::in_memory(objects.clone()), config)?;
        Ok((strata, objects))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ---- Projects ----

    pub async fn create_project(&self, team: &TeamId, name: &str) -> CoreResult<Project> {
        self.registry.create_project(team, name).await
    }

    pub async fn get_project(&self, project: &ProjectId) -> CoreResult<Project> {
        self.registry.get_project(project).await
    }

    pub async fn list_projects(&self, team: &TeamId) -> CoreResult<Vec<Project>> {
        self.registry.list_projects(team).await
    }

    pub async fn find_project(&self, team: &TeamId, name: &str) -> CoreResult<Project> {
        self.registry.find_project(team, name).await
    }

    pub async fn update_project(
        &self,
        project: &ProjectId,
        patch: &ProjectPatch,
    ) -> CoreResult<Project> {
        self.registry.update_project(project, patch).await
    }

    pub async fn delete_project(&self, project: &ProjectId) -> CoreResult<DeleteReport> {
        self.registry.delete_project(project).await
    }

    // ---- Branches ----

    pub async fn create_branch(
        &self,
        project: &ProjectId,
        name: &str,
        from: Option<&BranchId>,
    ) -> CoreResult<Branch> {
        self.registry.create_branch(project, name, from).await
    }

    pub async fn get_branch(&self, branch: &BranchId) -> CoreResult<Branch> {
        self.registry.get_branch(branch).await
    }

    pub async fn list_branches(&self, project: &ProjectId) -> CoreResult<Vec<Branch>> {
        self.registry.list_branches(project).await
    }

    pub async fn delete_branch(&self, branch: &BranchId, hard: bool) -> CoreResult<()> {
        self.registry.delete_branch(branch, hard).await
    }

    pub async fn get_branch_with_latest_commit(
        &self,
        team: &TeamId,
        project_name: &str,
        branch_name: &str,
    ) -> CoreResult<BranchWithCommit> {
        self.commits
            .get_branch_with_latest_commit(team, project_name, branch_name)
            .await
    }

    // ---- Locks ----

    pub async fn lock(
        &self,
        branch: &BranchId,
        holder: &UserId,
        paths: &[RepoPath],
    ) -> CoreResult<LockSet> {
        self.locks.lock(branch, holder, paths).await
    }

    pub async fn unlock(&self, branch: &BranchId, paths: &[RepoPath]) -> CoreResult<LockSet> {
        self.locks.unlock(branch, paths).await
    }

    pub async fn list_locks(&self, branch: &BranchId) -> CoreResult<LockSet> {
        self.locks.list_locks(branch).await
    }

    // ---- Commits ----

    pub async fn create_commit(&self, request: CommitRequest) -> CoreResult<Commit> {
        self.commits.create_commit(request).await
    }

    pub async fn get_commit(&self, commit: &CommitId) -> CoreResult<Commit> {
        self.commits.get_commit(commit).await
    }

    pub async fn list_commits(&self, branch: &BranchId) -> CoreResult<Vec<Commit>> {
        self.commits.list_commits(branch).await
    }

    pub async fn update_commit(
        &self,
        commit: &CommitId,
        patch: &CommitPatch,
    ) -> CoreResult<Commit> {
        self.commits.update_commit(commit, patch).await
    }

    pub async fn validate_branch_history(&self, branch: &BranchId) -> CoreResult<ValidationReport> {
        self.commits.validate_branch_history(branch).await
    }

    // ---- Blobs ----

    pub async fn presign(
        &self,
        method: Method,
        project: &ProjectId,
        key: &str,
        options: &PresignOptions,
    ) -> CoreResult<PresignedRequest> {
        self.blobs.presign(method, project, key, options).await
    }

    pub async fn complete_multipart_upload(
        &self,
        project: &ProjectId,
        key: &str,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> CoreResult<ObjectMeta> {
        self.blobs
            .complete_multipart_upload(project, key, upload_id, parts)
            .await
    }

    pub async fn abort_multipart_upload(
        &self,
        project: &ProjectId,
        key: &str,
        upload_id: &UploadId,
    ) -> CoreResult<()> {
        self.blobs
            .abort_multipart_upload(project, key, upload_id)
            .await
    }

    // ---- Garbage collection ----

    pub async fn reconcile_project(&self, project: &ProjectId) -> CoreResult<ReconcileReport> {
        self.gc
            .reconcile_project(project, &CancellationToken::new())
            .await
    }

    /// Like [`Strata::reconcile_project`], stopping between pages once
    /// `cancel` fires.
    pub async fn reconcile_project_until(
        &self,
        project: &ProjectId,
        cancel: &CancellationToken,
    ) -> CoreResult<ReconcileReport> {
        self.gc.reconcile_project(project, cancel).await
    }

    pub async fn reconcile_all(&self, cancel: &CancellationToken) -> CoreResult<Vec<ReconcileReport>> {
        self.gc.reconcile_all(cancel).await
    }

    pub async fn expire_uploads(&self) -> CoreResult<usize> {
        self.gc.expire_uploads().await
    }

    /// Start the background garbage collector, if an interval is set.
    pub fn spawn_gc(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        self.gc.spawn(cancel)
    }
}
