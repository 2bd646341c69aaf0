//! JSON handlers over [`Strata`].
//!
//! Every handler resolves the caller's [`Identity`] and checks that the
//! addressed project belongs to the caller's team before touching it.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use strata_core::{
    Branch, BranchId, BranchWithCommit, Commit, CommitId, CommitPatch, CommitRequest,
    CompletedPart, CoreError, DeleteReport, FileChanges, LockSet, Method, ObjectMeta,
    PresignOptions, PresignedRequest, Project, ProjectId, ProjectPatch, ReconcileReport,
    RepoPath, Strata, TeamId, UploadId,
};
use strata_store::InMemoryObjectStore;

use crate::auth::Identity;
use crate::error::ServerResult;

/// Shared state of the router.
#[derive(Clone, Debug)]
pub struct AppState {
    pub strata: Strata,
    /// Backing store of the local storage endpoint, when it is enabled.
    pub local_storage: Option<Arc<InMemoryObjectStore>>,
}

impl AppState {
    pub fn new(strata: Strata) -> Self {
        Self {
            strata,
            local_storage: None,
        }
    }

    pub fn with_local_storage(mut self, objects: Arc<InMemoryObjectStore>) -> Self {
        self.local_storage = Some(objects);
        self
    }
}

/// A project the caller may act on. Projects being deleted are hidden.
async fn owned_project(
    strata: &Strata,
    identity: &Identity,
    id: &ProjectId,
) -> ServerResult<Project> {
    let project = strata.get_project(id).await?;
    identity.authorize(&project)?;
    if project.is_deleting() {
        return Err(CoreError::not_found(format!("project {id}")).into());
    }
    Ok(project)
}

async fn owned_branch(strata: &Strata, identity: &Identity, id: &BranchId) -> ServerResult<Branch> {
    let branch = strata.get_branch(id).await?;
    owned_project(strata, identity, &branch.project_id).await?;
    Ok(branch)
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    let config = state.strata.config();
    Json(json!({
        "name": "strata-server",
        "version": env!("CARGO_PKG_VERSION"),
        "default_branch": config.default_branch,
        "bucket": config.bucket,
    }))
}

// ---- Projects ----

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    pub name: String,
}

pub async fn create_project(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<CreateProjectBody>,
) -> ServerResult<(StatusCode, Json<Project>)> {
    let project = state
        .strata
        .create_project(&identity.team, &body.name)
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    State(state): State<AppState>,
    identity: Identity,
) -> ServerResult<Json<Vec<Project>>> {
    let projects = state.strata.list_projects(&identity.team).await?;
    Ok(Json(
        projects.into_iter().filter(|p| !p.is_deleting()).collect(),
    ))
}

pub async fn get_project(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<ProjectId>,
) -> ServerResult<Json<Project>> {
    Ok(Json(owned_project(&state.strata, &identity, &id).await?))
}

pub async fn update_project(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<ProjectId>,
    Json(patch): Json<ProjectPatch>,
) -> ServerResult<Json<Project>> {
    owned_project(&state.strata, &identity, &id).await?;
    Ok(Json(state.strata.update_project(&id, &patch).await?))
}

/// Deleting a project that is already mid-delete resumes the cascade.
pub async fn delete_project(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<ProjectId>,
) -> ServerResult<Json<DeleteReport>> {
    let project = state.strata.get_project(&id).await?;
    identity.authorize(&project)?;
    Ok(Json(state.strata.delete_project(&id).await?))
}

// ---- Branches ----

#[derive(Debug, Deserialize)]
pub struct CreateBranchBody {
    pub name: String,
    /// Branch whose head files seed the new branch. Defaults to the
    /// project's default branch.
    #[serde(default)]
    pub from: Option<BranchId>,
}

pub async fn create_branch(
    State(state): State<AppState>,
    identity: Identity,
    Path(project): Path<ProjectId>,
    Json(body): Json<CreateBranchBody>,
) -> ServerResult<(StatusCode, Json<Branch>)> {
    owned_project(&state.strata, &identity, &project).await?;
    let branch = state
        .strata
        .create_branch(&project, &body.name, body.from.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(branch)))
}

pub async fn list_branches(
    State(state): State<AppState>,
    identity: Identity,
    Path(project): Path<ProjectId>,
) -> ServerResult<Json<Vec<Branch>>> {
    owned_project(&state.strata, &identity, &project).await?;
    Ok(Json(state.strata.list_branches(&project).await?))
}

pub async fn branch_with_latest_commit(
    State(state): State<AppState>,
    identity: Identity,
    Path((team, project, branch)): Path<(String, String, String)>,
) -> ServerResult<Json<BranchWithCommit>> {
    let team = TeamId::new(team).map_err(CoreError::from)?;
    identity.authorize_team(&team)?;
    Ok(Json(
        state
            .strata
            .get_branch_with_latest_commit(&team, &project, &branch)
            .await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteBranchQuery {
    #[serde(default)]
    pub hard: bool,
}

pub async fn delete_branch(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<BranchId>,
    Query(query): Query<DeleteBranchQuery>,
) -> ServerResult<StatusCode> {
    owned_branch(&state.strata, &identity, &id).await?;
    state.strata.delete_branch(&id, query.hard).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Locks ----

#[derive(Debug, Deserialize)]
pub struct LockBody {
    pub paths: Vec<RepoPath>,
}

pub async fn list_locks(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<BranchId>,
) -> ServerResult<Json<LockSet>> {
    owned_branch(&state.strata, &identity, &id).await?;
    Ok(Json(state.strata.list_locks(&id).await?))
}

/// Locks are held by the calling user.
pub async fn lock_paths(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<BranchId>,
    Json(body): Json<LockBody>,
) -> ServerResult<Json<LockSet>> {
    owned_branch(&state.strata, &identity, &id).await?;
    Ok(Json(
        state.strata.lock(&id, &identity.user, &body.paths).await?,
    ))
}

pub async fn unlock_paths(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<BranchId>,
    Json(body): Json<LockBody>,
) -> ServerResult<Json<LockSet>> {
    owned_branch(&state.strata, &identity, &id).await?;
    Ok(Json(state.strata.unlock(&id, &body.paths).await?))
}

// ---- Commits ----

#[derive(Debug, Deserialize)]
pub struct CommitBody {
    pub message: String,
    #[serde(flatten)]
    pub changes: FileChanges,
}

/// The commit is authored by the calling user.
pub async fn create_commit(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<BranchId>,
    Json(body): Json<CommitBody>,
) -> ServerResult<(StatusCode, Json<Commit>)> {
    owned_branch(&state.strata, &identity, &id).await?;
    let commit = state
        .strata
        .create_commit(CommitRequest {
            branch_id: id,
            author: Some(identity.user),
            message: body.message,
            changes: body.changes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(commit)))
}

pub async fn list_commits(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<BranchId>,
) -> ServerResult<Json<Vec<Commit>>> {
    owned_branch(&state.strata, &identity, &id).await?;
    Ok(Json(state.strata.list_commits(&id).await?))
}

pub async fn get_commit(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<CommitId>,
) -> ServerResult<Json<Commit>> {
    let commit = state.strata.get_commit(&id).await?;
    owned_project(&state.strata, &identity, &commit.project_id).await?;
    Ok(Json(commit))
}

pub async fn update_commit(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<CommitId>,
    Json(patch): Json<CommitPatch>,
) -> ServerResult<Json<Commit>> {
    let commit = state.strata.get_commit(&id).await?;
    owned_project(&state.strata, &identity, &commit.project_id).await?;
    Ok(Json(state.strata.update_commit(&id, &patch).await?))
}

// ---- Blobs ----

#[derive(Debug, Deserialize)]
pub struct PresignBody {
    /// `GET` or `PUT`; anything else is rejected.
    pub method: String,
    pub key: String,
    #[serde(flatten)]
    pub options: PresignOptions,
}

pub async fn presign(
    State(state): State<AppState>,
    identity: Identity,
    Path(project): Path<ProjectId>,
    Json(body): Json<PresignBody>,
) -> ServerResult<Json<PresignedRequest>> {
    let method: Method = body.method.parse().map_err(CoreError::from)?;
    owned_project(&state.strata, &identity, &project).await?;
    Ok(Json(
        state
            .strata
            .presign(method, &project, &body.key, &body.options)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct CompleteUploadBody {
    pub key: String,
    pub parts: Vec<CompletedPart>,
}

pub async fn complete_upload(
    State(state): State<AppState>,
    identity: Identity,
    Path((project, upload_id)): Path<(ProjectId, String)>,
    Json(body): Json<CompleteUploadBody>,
) -> ServerResult<Json<ObjectMeta>> {
    let upload_id = UploadId::new(upload_id)?;
    owned_project(&state.strata, &identity, &project).await?;
    Ok(Json(
        state
            .strata
            .complete_multipart_upload(&project, &body.key, &upload_id, &body.parts)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct UploadKeyQuery {
    pub key: String,
}

pub async fn abort_upload(
    State(state): State<AppState>,
    identity: Identity,
    Path((project, upload_id)): Path<(ProjectId, String)>,
    Query(query): Query<UploadKeyQuery>,
) -> ServerResult<StatusCode> {
    let upload_id = UploadId::new(upload_id)?;
    owned_project(&state.strata, &identity, &project).await?;
    state
        .strata
        .abort_multipart_upload(&project, &query.key, &upload_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reconcile(
    State(state): State<AppState>,
    identity: Identity,
    Path(project): Path<ProjectId>,
) -> ServerResult<Json<ReconcileReport>> {
    owned_project(&state.strata, &identity, &project).await?;
    Ok(Json(state.strata.reconcile_project(&project).await?))
}
