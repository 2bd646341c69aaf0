use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use strata_core::{
    CommitRequest, CompletedPart, ContentHash, CoreConfig, Deps, ErrorKind, FileChanges, Method,
    PresignOptions, ReconcileStatus, RepoPath, Strata, TeamId, UserId,
};
use strata_store::{
    InMemoryObjectStore, ListPage, ObjectKey, ObjectMeta, ObjectStore, StoreError, StoreResult,
    UploadId, UrlSigner,
};
use tokio::sync::oneshot;

const MIB: usize = 1024 * 1024;

fn p(s: &str) -> RepoPath {
    RepoPath::new(s).unwrap()
}

fn h(s: &str) -> ContentHash {
    ContentHash::new(s).unwrap()
}

fn user(s: &str) -> UserId {
    UserId::new(s).unwrap()
}

fn modify(branch: strata_core::BranchId, author: &str, path: &str, hash: &ContentHash) -> CommitRequest {
    CommitRequest {
        branch_id: branch,
        author: Some(user(author)),
        message: format!("update {path}"),
        changes: FileChanges {
            modified: vec![p(path)],
            hashes: BTreeMap::from([(p(path), hash.clone())]),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn project_commit_and_lock_scenario() {
    let (strata, _) = Strata::in_memory(CoreConfig::default()).unwrap();
    let team = TeamId::new("team").unwrap();

    let project = strata.create_project(&team, "p1").await.unwrap();
    let start = strata
        .get_branch_with_latest_commit(&team, "p1", "stable")
        .await
        .unwrap();
    assert_eq!(start.branch.id, project.default_branch);
    assert_eq!(start.commit.index, 1);
    assert!(start.commit.files.is_empty());

    let branch = project.default_branch;
    let c2 = strata
        .create_commit(modify(branch, "alice", "a.txt", &h("h1")))
        .await
        .unwrap();
    assert_eq!(c2.index, 2);
    assert_eq!(c2.files[&p("a.txt")].version, 1);

    let c3 = strata
        .create_commit(modify(branch, "alice", "a.txt", &h("h2")))
        .await
        .unwrap();
    assert_eq!(c3.index, 3);
    assert_eq!(c3.files[&p("a.txt")].version, 2);

    strata
        .lock(&branch, &user("alice"), &[p("a.txt")])
        .await
        .unwrap();
    let err = strata
        .create_commit(modify(branch, "bob", "a.txt", &h("h3")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let after = strata
        .get_branch_with_latest_commit(&team, "p1", "stable")
        .await
        .unwrap();
    assert_eq!(after.commit.id, c3.id);
    assert_eq!(strata.list_commits(&branch).await.unwrap().len(), 3);

    // The holder keeps committing; once unlocked anyone may.
    strata
        .create_commit(modify(branch, "alice", "a.txt", &h("h3")))
        .await
        .unwrap();
    strata.unlock(&branch, &[p("a.txt")]).await.unwrap();
    let c5 = strata
        .create_commit(modify(branch, "bob", "a.txt", &h("h4")))
        .await
        .unwrap();
    assert_eq!(c5.files[&p("a.txt")].version, 4);
    assert!(strata
        .validate_branch_history(&branch)
        .await
        .unwrap()
        .is_valid());
}

#[tokio::test]
async fn multipart_upload_commit_and_collect() {
    let config = CoreConfig {
        gc_grace_secs: 0,
        ..Default::default()
    };
    let (strata, objects) = Strata::in_memory(config).unwrap();
    let team = TeamId::new("team").unwrap();
    let project = strata.create_project(&team, "assets").await.unwrap();

    let body = vec![7u8; 6 * MIB];
    let hash = ContentHash::of(&body);
    let request = strata
        .presign(
            Method::Put,
            &project.id,
            hash.as_str(),
            &PresignOptions {
                multipart: true,
                size: Some(body.len() as u64),
                content_type: Some("application/octet-stream".into()),
            },
        )
        .await
        .unwrap();
    let upload_id = request.upload_id.clone().unwrap();
    assert_eq!(request.urls.len(), 2);

    let mut parts = Vec::new();
    let mut offset = 0usize;
    for url in &request.urls {
        let size = url.size.unwrap() as usize;
        let etag = objects
            .accept_upload(&url.url, body[offset..offset + size].to_vec())
            .unwrap();
        parts.push(CompletedPart::new(url.part_number.unwrap(), etag));
        offset += size;
    }
    parts.reverse();
    let meta = strata
        .complete_multipart_upload(&project.id, hash.as_str(), &upload_id, &parts)
        .await
        .unwrap();
    assert_eq!(meta.size, body.len() as u64);

    strata
        .create_commit(modify(project.default_branch, "alice", "big.bin", &hash))
        .await
        .unwrap();

    let garbage = ContentHash::of(b"never committed");
    objects
        .put_object_at(
            &ObjectKey::for_hash(project.id, &garbage),
            &b"never committed"[..],
            Utc::now() - chrono::Duration::hours(1),
        )
        .unwrap();

    let report = strata.reconcile_project(&project.id).await.unwrap();
    assert_eq!(report.status, ReconcileStatus::Complete);
    assert_eq!(report.deleted_count, 1);
    assert!(objects.contains(&ObjectKey::for_hash(project.id, &hash)));
    assert!(!objects.contains(&ObjectKey::for_hash(project.id, &garbage)));

    let get = strata
        .presign(Method::Get, &project.id, hash.as_str(), &PresignOptions::default())
        .await
        .unwrap();
    assert_eq!(objects.download(&get.urls[0].url).unwrap().len(), body.len());

    let deleted = strata.delete_project(&project.id).await.unwrap();
    assert_eq!(deleted.blobs_deleted, 1);
    assert!(objects.is_empty());
}

/// Object store that pauses on its first listing until released, and
/// refuses to delete one chosen key.
struct GatedStore {
    inner: Arc<InMemoryObjectStore>,
    undeletable: String,
    listed: Mutex<Option<oneshot::Sender<()>>>,
    resume: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn head(&self, key: &ObjectKey) -> StoreResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn list(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> StoreResult<ListPage> {
        let signal = self.listed.lock().unwrap().take();
        if let Some(signal) = signal {
            let _ = signal.send(());
            if let Some(resume) = self.resume.lock().await.take() {
                let _ = resume.await;
            }
        }
        self.inner.list(prefix, continuation, limit).await
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<bool> {
        if key.to_key_string() == self.undeletable {
            return Err(StoreError::Backend("delete refused".into()));
        }
        self.inner.delete(key).await
    }

    async fn presign_get(&self, key: &ObjectKey) -> StoreResult<String> {
        self.inner.presign_get(key).await
    }

    async fn presign_put(
        &self,
        key: &ObjectKey,
        content_type: Option<&str>,
    ) -> StoreResult<String> {
        self.inner.presign_put(key, content_type).await
    }

    async fn create_multipart_upload(
        &self,
        key: &ObjectKey,
        content_type: Option<&str>,
    ) -> StoreResult<UploadId> {
        self.inner.create_multipart_upload(key, content_type).await
    }

    async fn presign_upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        part_number: u32,
    ) -> StoreResult<String> {
        self.inner
            .presign_upload_part(key, upload_id, part_number)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> StoreResult<ObjectMeta> {
        self.inner
            .complete_multipart_upload(key, upload_id, parts)
            .await
    }

    async fn abort_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
    ) -> StoreResult<()> {
        self.inner.abort_multipart_upload(key, upload_id).await
    }

    async fn expire_multipart_uploads(&self, retention: Duration) -> StoreResult<usize> {
        self.inner.expire_multipart_uploads(retention).await
    }
}

#[tokio::test]
async fn gc_keeps_committed_hashes_while_commits_land_mid_scan() {
    let config = CoreConfig {
        gc_grace_secs: 600,
        gc_page_size: 1,
        ..Default::default()
    };
    let signer =
        UrlSigner::ephemeral(&config.endpoint, &config.bucket, config.presign_ttl()).unwrap();
    let inner = Arc::new(InMemoryObjectStore::new(signer));
    let (listed_tx, listed_rx) = oneshot::channel();
    let (resume_tx, resume_rx) = oneshot::channel();
    let team = TeamId::new("team").unwrap();
    let old = Utc::now() - chrono::Duration::hours(2);

    // Both handles share one set of document stores; only the scanning
    // handle sees the gated object store.
    let base = Deps::in_memory(inner.clone());
    let setup = Strata::new(base.clone(), config.clone()).unwrap();
    let project = setup.create_project(&team, "p1").await.unwrap();

    let committed = ContentHash::of(b"committed");
    let stuck = ContentHash::of(b"stuck garbage");
    let garbage = ContentHash::of(b"garbage");
    for (hash, data) in [
        (&committed, &b"committed"[..]),
        (&stuck, &b"stuck garbage"[..]),
        (&garbage, &b"garbage"[..]),
    ] {
        inner
            .put_object_at(&ObjectKey::for_hash(project.id, hash), data, old)
            .unwrap();
    }
    setup
        .create_commit(modify(project.default_branch, "alice", "kept.bin", &committed))
        .await
        .unwrap();

    let gated = Arc::new(GatedStore {
        inner: inner.clone(),
        undeletable: ObjectKey::for_hash(project.id, &stuck).to_key_string(),
        listed: Mutex::new(Some(listed_tx)),
        resume: tokio::sync::Mutex::new(Some(resume_rx)),
    });
    let strata = Strata::new(
        Deps {
            objects: gated,
            ..base
        },
        config,
    )
    .unwrap();

    let scan = {
        let strata = strata.clone();
        let project = project.id;
        tokio::spawn(async move { strata.reconcile_project(&project).await })
    };

    listed_rx.await.unwrap();
    // A client uploads and commits a new blob while the scan is paused.
    let late = ContentHash::of(b"late upload");
    inner
        .put_object(&ObjectKey::for_hash(project.id, &late), &b"late upload"[..])
        .unwrap();
    strata
        .create_commit(modify(project.default_branch, "bob", "late.bin", &late))
        .await
        .unwrap();
    resume_tx.send(()).unwrap();

    let report = scan.await.unwrap().unwrap();
    assert_eq!(report.status, ReconcileStatus::Partial);
    assert_eq!(report.scanned, 4);
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.failed_keys.len(), 1);
    assert!(inner.contains(&ObjectKey::for_hash(project.id, &committed)));
    assert!(inner.contains(&ObjectKey::for_hash(project.id, &late)));
    assert!(inner.contains(&ObjectKey::for_hash(project.id, &stuck)));
    assert!(!inner.contains(&ObjectKey::for_hash(project.id, &garbage)));
}
