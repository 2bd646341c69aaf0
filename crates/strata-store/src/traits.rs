use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::key::ObjectKey;
use crate::multipart::{CompletedPart, UploadId};

/// Metadata of one stored object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Raw key as stored. Listings may surface keys this crate did not
    /// write, so it is not parsed here.
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub content_type: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// One page of a prefix listing.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    /// Token to pass back for the next page; `None` on the last page.
    pub continuation: Option<String>,
}

/// Object-storage backend behind the blob store adapter.
///
/// The backend owns the physical bytes. Clients move bytes directly to and
/// from it through presigned URLs, so the trait exposes URL minting and
/// metadata operations rather than byte transfer.
///
/// Implementations must satisfy these invariants:
/// - Presigned URLs expire; they grant exactly one method on one key (and,
///   for parts, one part of one upload).
/// - Listing is lexicographic by key and resumable from a continuation
///   token, even if objects are deleted between pages.
/// - `delete` is idempotent.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Size and metadata of an object. `NotFound` if absent.
    async fn head(&self, key: &ObjectKey) -> StoreResult<ObjectMeta>;

    /// List objects whose key starts with `prefix`.
    async fn list(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        limit: usize,
    ) -> StoreResult<ListPage>;

    /// Delete an object. Returns `true` if it existed.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<bool>;

    /// Presigned download URL.
    async fn presign_get(&self, key: &ObjectKey) -> StoreResult<String>;

    /// Presigned single-request upload URL.
    async fn presign_put(&self, key: &ObjectKey, content_type: Option<&str>)
        -> StoreResult<String>;

    /// Start a multipart upload for `key`.
    async fn create_multipart_upload(
        &self,
        key: &ObjectKey,
        content_type: Option<&str>,
    ) -> StoreResult<UploadId>;

    /// Presigned URL for one part of a multipart upload.
    async fn presign_upload_part(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        part_number: u32,
    ) -> StoreResult<String>;

    /// Assemble the uploaded parts into the final object. `parts` arrive
    /// already validated and sorted by part number.
    async fn complete_multipart_upload(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> StoreResult<ObjectMeta>;

    /// Discard a multipart upload and its parts.
    async fn abort_multipart_upload(&self, key: &ObjectKey, upload_id: &UploadId)
        -> StoreResult<()>;

    /// Discard multipart uploads started more than `retention` ago and
    /// return how many were removed. Backends with a native lifecycle rule
    /// may return `Ok(0)`.
    async fn expire_multipart_uploads(&self, retention: Duration) -> StoreResult<usize>;
}
