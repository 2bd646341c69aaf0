//! Presigned blob access scoped to projects.

use strata_store::{
    CompletedPart, Method, ObjectKey, ObjectMeta, PresignOptions, PresignedRequest, Presigner,
    UploadId,
};
use strata_types::ProjectId;
use tracing::{debug, info, instrument, warn};

use crate::deps::ServiceContext;
use crate::error::CoreResult;
use crate::registry::ProjectRegistry;

/// Hands out presigned URLs for a project's blobs.
///
/// Keys are always namespaced by project, so a URL minted for one project
/// can never address another project's objects.
#[derive(Clone, Debug)]
pub struct BlobService {
    ctx: ServiceContext,
    registry: ProjectRegistry,
    presigner: Presigner,
}

impl BlobService {
    pub(crate) fn new(ctx: ServiceContext, registry: ProjectRegistry) -> Self {
        let presigner = Presigner::new(ctx.deps.objects.clone(), ctx.config.presign_config());
        Self {
            ctx,
            registry,
            presigner,
        }
    }

    /// Presign `method` on `{project}/{key}`.
    ///
    /// Downloads are charged to the owning team's bandwidth counter. The
    /// charge is best-effort: a failing meter is logged and the URL is
    /// still returned.
    #[instrument(skip(self))]
    pub async fn presign(
        &self,
        method: Method,
        project_id: &ProjectId,
        key: &str,
        options: &PresignOptions,
    ) -> CoreResult<PresignedRequest> {
        let project = self.registry.live_project(project_id).await?;
        let key = ObjectKey::new(*project_id, key)?;

        let request = self
            .ctx
            .storage("presign", self.presigner.presign(method, &key, options))
            .await?;
        debug!(%key, %method, urls = request.urls.len(), "presigned");

        if let (Method::Get, Some(size)) = (method, request.object_size) {
            match self
                .ctx
                .doc(
                    "usage update",
                    self.ctx.deps.usage.record_bandwidth(&project.team_id, size),
                )
                .await
            {
                Ok(total) => debug!(team = %project.team_id, size, total, "bandwidth recorded"),
                Err(e) => warn!(
                    team = %project.team_id,
                    %key,
                    size,
                    error = %e,
                    "failed to record bandwidth"
                ),
            }
        }
        Ok(request)
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    pub async fn complete_multipart_upload(
        &self,
        project_id: &ProjectId,
        key: &str,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> CoreResult<ObjectMeta> {
        self.registry.live_project(project_id).await?;
        let key = ObjectKey::new(*project_id, key)?;
        let meta = self
            .ctx
            .storage(
                "multipart complete",
                self.presigner.complete(&key, upload_id, parts),
            )
            .await?;
        info!(%key, %upload_id, size = meta.size, "multipart upload completed");
        Ok(meta)
    }

    #[instrument(skip(self))]
    pub async fn abort_multipart_upload(
        &self,
        project_id: &ProjectId,
        key: &str,
        upload_id: &UploadId,
    ) -> CoreResult<()> {
        self.registry.live_project(project_id).await?;
        let key = ObjectKey::new(*project_id, key)?;
        self.ctx
            .storage("multipart abort", self.presigner.abort(&key, upload_id))
            .await?;
        info!(%key, %upload_id, "multipart upload aborted");
        Ok(())
    }
}
