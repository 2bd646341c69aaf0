//! Blob garbage collection.
//!
//! A reconcile pass deletes storage objects that no commit of the project
//! references. The referenced set is read in full before the first object
//! is listed, so a hash committed at scan start is never deleted. Objects
//! younger than the grace period are always kept: they may belong to an
//! upload whose commit has not been written yet.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strata_store::{ObjectKey, MULTIPART_UPLOAD_RETENTION};
use strata_types::{CommitId, ProjectId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::deps::ServiceContext;
use crate::error::{CoreError, CoreResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    #[default]
    Complete,
    /// Some deletions failed; see `failed_keys`.
    Partial,
    /// Stopped between pages.
    Cancelled,
}

/// Outcome of one reconcile pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub project_id: ProjectId,
    pub deleted_count: u64,
    pub deleted_bytes: u64,
    pub failed_keys: Vec<String>,
    pub scanned: u64,
    pub retained: u64,
    pub status: ReconcileStatus,
}

#[derive(Clone, Debug)]
pub struct GarbageCollector {
    ctx: ServiceContext,
}

impl GarbageCollector {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Union of every content hash referenced by any commit of the project,
    /// orphaned commits included.
    async fn referenced_hashes(&self, project: &ProjectId) -> CoreResult<HashSet<String>> {
        let mut referenced = HashSet::new();
        let mut after: Option<CommitId> = None;
        loop {
            let page = self
                .ctx
                .doc(
                    "commit scan",
                    self.ctx.deps.commits.page_by_project(
                        project,
                        after.as_ref(),
                        self.ctx.config.gc_page_size,
                    ),
                )
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);
            for commit in &page {
                referenced.extend(commit.hashes().map(|h| h.as_str().to_string()));
            }
        }
        Ok(referenced)
    }

    /// Delete every unreferenced object under the project's prefix.
    #[instrument(skip(self, cancel))]
    pub async fn reconcile_project(
        &self,
        project_id: &ProjectId,
        cancel: &CancellationToken,
    ) -> CoreResult<ReconcileReport> {
        self.ctx
            .doc("project lookup", self.ctx.deps.projects.get(project_id))
            .await?
            .ok_or_else(|| CoreError::not_found(format!("project {project_id}")))?;

        let referenced = self.referenced_hashes(project_id).await?;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.ctx.config.gc_grace())
                .map_err(|e| CoreError::invalid(format!("gc grace period: {e}")))?;
        let prefix = ObjectKey::project_prefix(project_id);
        let objects = &self.ctx.deps.objects;

        let mut report = ReconcileReport {
            project_id: *project_id,
            ..Default::default()
        };
        let mut continuation: Option<String> = None;
        let mut pages = 0u64;
        loop {
            if cancel.is_cancelled() {
                report.status = ReconcileStatus::Cancelled;
                break;
            }
            let page = self
                .ctx
                .storage(
                    "blob listing",
                    objects.list(&prefix, continuation.as_deref(), self.ctx.config.gc_page_size),
                )
                .await?;
            pages += 1;

            for meta in page.objects {
                report.scanned += 1;
                let key = match ObjectKey::parse(&meta.key) {
                    Ok(key) if key.project() == project_id => key,
                    Ok(_) | Err(_) => {
                        warn!(key = %meta.key, "unrecognised key under project prefix");
                        report.failed_keys.push(meta.key);
                        continue;
                    }
                };
                if referenced.contains(key.name()) || meta.last_modified > cutoff {
                    report.retained += 1;
                    continue;
                }
                match self.ctx.storage("blob delete", objects.delete(&key)).await {
                    Ok(_) => {
                        report.deleted_count += 1;
                        report.deleted_bytes += meta.size;
                    }
                    Err(e) => {
                        warn!(%key, error = %e, "blob delete failed");
                        report.failed_keys.push(meta.key);
                    }
                }
            }
            debug!(
                project = %project_id,
                pages,
                scanned = report.scanned,
                deleted = report.deleted_count,
                "reconcile page done"
            );

            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        if report.status != ReconcileStatus::Cancelled && !report.failed_keys.is_empty() {
            report.status = ReconcileStatus::Partial;
        }
        info!(
            project = %project_id,
            scanned = report.scanned,
            deleted = report.deleted_count,
            retained = report.retained,
            failed = report.failed_keys.len(),
            status = ?report.status,
            "reconcile finished"
        );
        Ok(report)
    }

    /// Reconcile every project. A project that fails is logged and skipped.
    #[instrument(skip(self, cancel))]
    pub async fn reconcile_all(&self, cancel: &CancellationToken) -> CoreResult<Vec<ReconcileReport>> {
        let ids = self
            .ctx
            .doc("project list", self.ctx.deps.projects.list_ids())
            .await?;
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            if cancel.is_cancelled() {
                break;
            }
            match self.reconcile_project(&id, cancel).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(project = %id, error = %e, "reconcile failed"),
            }
        }
        Ok(reports)
    }

    /// Drop multipart uploads that outlived the retention window.
    pub async fn expire_uploads(&self) -> CoreResult<usize> {
        let expired = self
            .ctx
            .storage(
                "upload expiry",
                self.ctx
                    .deps
                    .objects
                    .expire_multipart_uploads(MULTIPART_UPLOAD_RETENTION),
            )
            .await?;
        if expired > 0 {
            info!(expired, "expired incomplete multipart uploads");
        }
        Ok(expired)
    }

    /// Run `reconcile_all` and the upload sweep on the configured interval
    /// until `cancel` fires. Returns `None` when the interval is disabled.
    pub fn spawn(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let period = self.ctx.config.gc_interval()?;
        let gc = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs(), "garbage collector started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = gc.reconcile_all(&cancel).await {
                    warn!(error = %e, "scheduled reconcile failed");
                }
                if let Err(e) = gc.expire_uploads().await {
                    warn!(error = %e, "scheduled upload expiry failed");
                }
            }
            info!("garbage collector stopped");
        }))
    }
}
