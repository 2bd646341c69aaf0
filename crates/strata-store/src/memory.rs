use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::constants::{MIN_PART_SIZE, MULTIPART_UPLOAD_RETENTION};
use crate::error::{StoreError, StoreResult};
use crate::key::ObjectKey;
use crate::method::Method;
use crate::multipart::{CompletedPart, UploadId};
use crate::signer::{PartTarget, UrlSigner};
use crate::traits::{ListPage, ObjectMeta, ObjectStore};

/// In-memory object store.
///
/// Intended for tests, local development and embedding. It mints real
/// presigned URLs through a [`UrlSigner`] and can play the storage server's
/// role for them via [`accept_upload`](Self::accept_upload) and
/// [`download`](Self::download), so the whole presign → upload → commit
/// flow can run in one process.
pub struct InMemoryObjectStore {
    signer: UrlSigner,
    multipart_retention: Duration,
    inner: RwLock<State>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredBlob>,
    uploads: HashMap<UploadId, PendingUpload>,
}

#[derive(Clone)]
struct StoredBlob {
    data: Bytes,
    etag: String,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

struct PendingUpload {
    key: ObjectKey,
    content_type: Option<String>,
    initiated_at: DateTime<Utc>,
    parts: BTreeMap<u32, UploadedPart>,
}

struct UploadedPart {
    etag: String,
    data: Bytes,
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("signer", &self.signer)
            .field("objects", &self.len())
            .field("pending_uploads", &self.pending_uploads())
            .finish_non_exhaustive()
    }
}

impl InMemoryObjectStore {
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            signer,
            multipart_retention: MULTIPART_UPLOAD_RETENTION,
            inner: RwLock::new(State::default()),
        }
    }

    /// Override how long an incomplete multipart upload stays completable.
    pub fn with_multipart_retention(mut self, retention: Duration) -> Self {
        self.multipart_retention = retention;
        self
    }

    /// Write an object directly, bypassing presigned URLs.
    pub fn put_object(&self, key: &ObjectKey, data: impl Into<Bytes>) -> StoreResult<ObjectMeta> {
        self.put_object_at(key, data, Utc::now())
    }

    /// Write an object with an explicit modification time.
    pub fn put_object_at(
        &self,
        key: &ObjectKey,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) -> StoreResult<ObjectMeta> {
        let data = data.into();
        let blob = StoredBlob {
            etag: etag_of(&data),
            data,
            content_type: None,
            last_modified,
        };
        let raw = key.to_key_string();
        let meta = meta_of(&raw, &blob);
        self.write()?.objects.insert(raw, blob);
        Ok(meta)
    }

    /// Handle a PUT against a presigned URL, as the storage server would.
    ///
    /// Returns the ETag of the stored object or part.
    pub fn accept_upload(&self, url: &str, body: impl Into<Bytes>) -> StoreResult<String> {
        let now = Utc::now();
        let request = self.signer.verify(url, now)?;
        if request.method != Method::Put {
            return Err(StoreError::Signature("URL does not grant PUT".into()));
        }
        let data = body.into();
        let etag = etag_of(&data);
        let mut state = self.write()?;

        match request.part {
            Some(PartTarget {
                upload_id,
                part_number,
            }) => {
                let retention = self.multipart_retention;
                let upload = live_upload(&mut state, &upload_id, &request.key, now, retention)?;
                upload.parts.insert(
                    part_number,
                    UploadedPart {
                        etag: etag.clone(),
                        data,
                    },
                );
            }
            None => {
                state.objects.insert(
                    request.key.to_key_string(),
                    StoredBlob {
                        data,
                        etag: etag.clone(),
                        content_type: None,
                        last_modified: now,
                    },
                );
            }
        }
        Ok(etag)
    }

    /// Handle a GET against a presigned URL.
    pub fn download(&self, url: &str) -> StoreResult<Bytes> {
        let request = self.signer.verify(url, Utc::now())?;
        if request.method != Method::Get {
            return Err(StoreError::Signature("URL does not grant GET".into()));
        }
        let raw = request.key.to_key_string();
        self.read()?
            .objects
            .get(&raw)
            .map(|blob| blob.data.clone())
            .ok_or(StoreError::NotFound { key: raw })
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.objects.len()).unwrap_or(0)
    }

    /// Returns `true` if no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` holds an object.
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.read()
            .map(|s| s.objects.contains_key(&key.to_key_string()))
            .unwrap_or(false)
    }

    /// Number of multipart uploads neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.read().map(|s| s.uploads.len()).unwrap_or(0)
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, State>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {e}")))
    }
}

/// Look up an upload that is still completable, dropping it if expired.
fn live_upload<'a>(
    state: &'a mut State,
    upload_id: &UploadId,
    key: &ObjectKey,
    now: DateTime<Utc>,
    retention: Duration,
) -> StoreResult<&'a mut PendingUpload> {
    let not_found = || StoreError::UploadNotFound {
        upload_id: upload_id.to_string(),
    };
    let expired = match state.uploads.get(upload_id) {
        None => return Err(not_found()),
        Some(upload) if &upload.key != key => return Err(not_found()),
        Some(upload) => is_expired(upload.initiated_at, now, retention),
    };
    if expired {
        state.uploads.remove(upload_id);
        tracing::debug!(%upload_id, "multipart upload expired");
        return Err(not_found());
    }
    state.uploads.get_mut(upload_id).ok_or_else(not_found)
}

fn is_expired(initiated_at: DateTime<Utc>, now: DateTime<Utc>, retention: Duration) -> bool {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    now.signed_duration_since(initiated_at) >= retention
}

fn etag_of(data: &[u8]) -> String {
    hex::encode(&blake3::hash(data).as_bytes()[..16])
}

fn meta_of(key: &str, blob: &StoredBlob) -> ObjectMeta {
    ObjectMeta {
        key: key.to_string(),
        size: blob.data.len() as u64,
        etag: blob.etag.clone(),
        content_type: blob.content_type.clone(),
        last_modified: blob.last_modified,
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn head(&self, key: &ObjectKey) -> StoreResult<ObjectMeta> {
        let raw = key.to_key_string();
        let state = self.read()?;
        state
            .objects
            .get(&raw)
            .map(|blob| meta_of(&raw, blob))
            .ok_or(StoreError::NotFound { key: raw })
    }

    async fn list(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> StoreResult<ListPage> {
        let limit = limit.max(1);
        let state = self.read()?;
        let lower = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let mut objects: Vec<ObjectMeta> = state
            .objects
            .range((lower, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit + 1)
            .map(|(k, blob)| meta_of(k, blob))
            .collect();

        let continuation = if objects.len() > limit {
            objects.truncate(limit);
            objects.last().map(|m| m.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects,
            continuation,
        })
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<bool> {
        Ok(self.write()?.objects.remove(&key.to_key_string()).is_some())
    }

    async fn presign_get(&self, key: &ObjectKey) -> StoreResult<String> {
        Ok(self.signer.sign(Method::Get, key, None, Utc::now()))
    }

    async fn presign_put(
        &self,
        key: &ObjectKey,
        _content_type: Option<&str>,
    ) -> StoreResult<String> {
        Ok(self.signer.sign(Method::Put, key, None, Utc::now()))
    }

    async fn create_multipart_upload(
        &self,
        key: &ObjectKey,
        content_type: Option<&str>,
    ) -> StoreResult<UploadId> {
        let upload_id = UploadId::generate();
        self.write()?.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.clone(),
                content_type: content_type.map(str::to_string),
                initiated_at: Utc::now(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn presign_upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        part_number: u32,
    ) -> StoreResult<String> {
        let part = PartTarget {
            upload_id: upload_id.clone(),
            part_number,
        };
        Ok(self.signer.sign(Method::Put, key, Some(&part), Utc::now()))
    }

    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> StoreResult<ObjectMeta> {
        let now = Utc::now();
        let mut state = self.write()?;
        let upload = live_upload(&mut state, upload_id, key, now, self.multipart_retention)?;

        let mut assembled = Vec::new();
        let mut etags = String::new();
        for (index, part) in parts.iter().enumerate() {
            let uploaded = upload.parts.get(&part.part_number).ok_or_else(|| {
                StoreError::InvalidParts(format!("part {} was never uploaded", part.part_number))
            })?;
            if uploaded.etag != part.etag.trim_matches('"') {
                return Err(StoreError::InvalidParts(format!(
                    "ETag mismatch for part {}",
                    part.part_number
                )));
            }
            let is_last = index + 1 == parts.len();
            if !is_last && (uploaded.data.len() as u64) < MIN_PART_SIZE {
                return Err(StoreError::InvalidParts(format!(
                    "part {} is smaller than the minimum part size",
                    part.part_number
                )));
            }
            assembled.extend_from_slice(&uploaded.data);
            etags.push_str(&uploaded.etag);
        }

        let blob = StoredBlob {
            data: Bytes::from(assembled),
            etag: format!("{}-{}", etag_of(etags.as_bytes()), parts.len()),
            content_type: upload.content_type.clone(),
            last_modified: now,
        };
        state.uploads.remove(upload_id);
        let raw = key.to_key_string();
        let meta = meta_of(&raw, &blob);
        state.objects.insert(raw, blob);
        Ok(meta)
    }

    async fn abort_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        match state.uploads.get(upload_id) {
            Some(upload) if &upload.key == key => {
                state.uploads.remove(upload_id);
                Ok(())
            }
            _ => Err(StoreError::UploadNotFound {
                upload_id: upload_id.to_string(),
            }),
        }
    }

    async fn expire_multipart_uploads(&self, retention: Duration) -> StoreResult<usize> {
        let now = Utc::now();
        let mut state = self.write()?;
        let before = state.uploads.len();
        state
            .uploads
            .retain(|_, upload| !is_expired(upload.initiated_at, now, retention));
        Ok(before - state.uploads.len())
    }
}
