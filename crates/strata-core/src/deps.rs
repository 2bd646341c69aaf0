//! Explicit service dependencies.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use strata_ledger::{CommitStore, InMemoryCommitStore};
use strata_refs::{Branch, BranchStore, InMemoryBranchStore};
use strata_store::{InMemoryObjectStore, ObjectStore, UrlSigner};
use strata_types::{BranchId, ProjectId};

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::project::{InMemoryProjectStore, Project, ProjectStore};
use crate::usage::{InMemoryUsageMeter, UsageMeter};

/// Handles to every backend the services talk to.
#[derive(Clone)]
pub struct Deps {
    pub projects: Arc<dyn ProjectStore>,
    pub branches: Arc<dyn BranchStore>,
    pub commits: Arc<dyn CommitStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub usage: Arc<dyn UsageMeter>,
}

impl Deps {
    /// In-memory document stores around the given object store.
    pub fn in_memory(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            projects: Arc::new(InMemoryProjectStore::new()),
            branches: Arc::new(InMemoryBranchStore::new()),
            commits: Arc::new(InMemoryCommitStore::new()),
            objects,
            usage: Arc::new(InMemoryUsageMeter::new()),
        }
    }
}

impl std::fmt::Debug for Deps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deps").finish_non_exhaustive()
    }
}

/// In-memory object store whose URLs point at the configured endpoint and
/// bucket, signed with a per-process key.
pub fn in_memory_object_store(config: &CoreConfig) -> CoreResult<Arc<InMemoryObjectStore>> {
    let signer = UrlSigner::ephemeral(&config.endpoint, &config.bucket, config.presign_ttl())?;
    Ok(Arc::new(InMemoryObjectStore::new(signer)))
}

/// What every service carries: the backends plus the configuration.
#[derive(Clone, Debug)]
pub(crate) struct ServiceContext {
    pub deps: Deps,
    pub config: Arc<CoreConfig>,
}

impl ServiceContext {
    pub fn new(deps: Deps, config: Arc<CoreConfig>) -> Self {
        Self { deps, config }
    }

    /// Run a document-store call under the document timeout.
    pub async fn doc<T, E, F>(&self, operation: &'static str, fut: F) -> CoreResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<CoreError>,
    {
        bounded(self.config.document_timeout(), operation, fut).await
    }

    /// Run an object-storage call under the storage timeout.
    pub async fn storage<T, E, F>(&self, operation: &'static str, fut: F) -> CoreResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<CoreError>,
    {
        bounded(self.config.storage_timeout(), operation, fut).await
    }

    /// A project that exists and has not started its delete saga.
    pub async fn live_project(&self, id: &ProjectId) -> CoreResult<Project> {
        self.doc("project lookup", self.deps.projects.get(id))
            .await?
            .filter(|p| !p.is_deleting())
            .ok_or_else(|| CoreError::not_found(format!("project {id}")))
    }

    /// A branch that is not deleted and whose project is live.
    pub async fn live_branch(&self, id: &BranchId) -> CoreResult<Branch> {
        let branch = self
            .doc("branch lookup", self.deps.branches.get(id))
            .await?
            .filter(|b| !b.is_deleted())
            .ok_or_else(|| CoreError::not_found(format!("branch {id}")))?;
        self.live_project(&branch.project_id).await?;
        Ok(branch)
    }

    /// Fails with `NotFound` once the project's delete saga has started.
    ///
    /// Called after a write has landed: the saga marks the project before it
    /// purges, so a write that still sees the project live here is purged
    /// by the saga, and one that sees it deleting must undo itself.
    pub async fn recheck_live(&self, id: &ProjectId) -> CoreResult<()> {
        self.live_project(id).await.map(|_| ())
    }
}

async fn bounded<T, E, F>(limit: Duration, operation: &'static str, fut: F) -> CoreResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<CoreError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(CoreError::Timeout {
            operation,
            after: limit,
        }),
    }
}
