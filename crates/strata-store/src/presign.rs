//! Presign orchestration: turning a `(method, key, options)` request into
//! one URL, or into a multipart upload with one URL per part.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{
    DEFAULT_PART_SIZE, DEFAULT_PRESIGN_PARALLELISM, MAX_PARTS, MAX_SINGLE_PUT_SIZE, MIN_PART_SIZE,
};
use crate::error::{StoreError, StoreResult};
use crate::key::ObjectKey;
use crate::method::Method;
use crate::multipart::{normalize_parts, CompletedPart, UploadId};
use crate::traits::{ObjectMeta, ObjectStore};

/// Caller-controlled knobs of a presign request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignOptions {
    #[serde(default)]
    pub multipart: bool,
    /// Total object size in bytes. Required for multipart uploads.
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// One presigned URL, with its part coordinates for multipart uploads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Result of a presign request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedRequest {
    pub method: Method,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<UploadId>,
    /// Part URLs are ordered by part number.
    pub urls: Vec<PresignedUrl>,
    /// Stored size of the object, known for GET requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_size: Option<u64>,
}

/// Sizing limits for presigned uploads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignConfig {
    pub part_size: u64,
    pub parallelism: usize,
    pub max_single_put_size: u64,
}

impl Default for PresignConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            parallelism: DEFAULT_PRESIGN_PARALLELISM,
            max_single_put_size: MAX_SINGLE_PUT_SIZE,
        }
    }
}

impl PresignConfig {
    pub fn validate(&self) -> StoreResult<()> {
        if self.part_size < MIN_PART_SIZE {
            return Err(StoreError::InvalidRequest(format!(
                "part size {} is below the minimum of {MIN_PART_SIZE}",
                self.part_size
            )));
        }
        if self.parallelism == 0 {
            return Err(StoreError::InvalidRequest("parallelism must be positive".into()));
        }
        Ok(())
    }
}

/// Split `total` bytes into part sizes of at most `part_size`.
///
/// Every part but the last is exactly `part_size`; the sizes sum to
/// `total` and there are `ceil(total / part_size)` of them.
pub fn plan_parts(total: u64, part_size: u64) -> StoreResult<Vec<u64>> {
    if total == 0 {
        return Err(StoreError::InvalidRequest(
            "multipart uploads need a positive size".into(),
        ));
    }
    if part_size == 0 {
        return Err(StoreError::InvalidRequest("part size must be positive".into()));
    }
    let count = total.div_ceil(part_size);
    if count > MAX_PARTS {
        return Err(StoreError::InvalidRequest(format!(
            "{total} bytes need {count} parts of {part_size}; the limit is {MAX_PARTS}"
        )));
    }

    let mut parts = Vec::with_capacity(count as usize);
    let mut remaining = total;
    while remaining > 0 {
        let chunk = remaining.min(part_size);
        parts.push(chunk);
        remaining -= chunk;
    }
    Ok(parts)
}

/// Drives an [`ObjectStore`] through presign, completion and abort.
#[derive(Clone)]
pub struct Presigner {
    store: Arc<dyn ObjectStore>,
    config: PresignConfig,
}

impl Presigner {
    pub fn new(store: Arc<dyn ObjectStore>, config: PresignConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PresignConfig {
        &self.config
    }

    /// Presign `method` on `key`.
    pub async fn presign(
        &self,
        method: Method,
        key: &ObjectKey,
        options: &PresignOptions,
    ) -> StoreResult<PresignedRequest> {
        match method {
            Method::Get => self.presign_get(key, options).await,
            Method::Put if options.multipart => self.presign_multipart(key, options).await,
            Method::Put => self.presign_single_put(key, options).await,
        }
    }

    async fn presign_get(
        &self,
        key: &ObjectKey,
        options: &PresignOptions,
    ) -> StoreResult<PresignedRequest> {
        if options.multipart {
            return Err(StoreError::InvalidRequest(
                "multipart applies to uploads only".into(),
            ));
        }
        let meta = self.store.head(key).await?;
        let url = self.store.presign_get(key).await?;
        Ok(PresignedRequest {
            method: Method::Get,
            key: key.to_key_string(),
            upload_id: None,
            urls: vec![PresignedUrl {
                url,
                part_number: None,
                size: Some(meta.size),
            }],
            object_size: Some(meta.size),
        })
    }

    async fn presign_single_put(
        &self,
        key: &ObjectKey,
        options: &PresignOptions,
    ) -> StoreResult<PresignedRequest> {
        if let Some(size) = options.size {
            if size > self.config.max_single_put_size {
                return Err(StoreError::InvalidRequest(format!(
                    "{size} bytes exceeds the single upload limit of {}; use multipart",
                    self.config.max_single_put_size
                )));
            }
        }
        let url = self
            .store
            .presign_put(key, options.content_type.as_deref())
            .await?;
        Ok(PresignedRequest {
            method: Method::Put,
            key: key.to_key_string(),
            upload_id: None,
            urls: vec![PresignedUrl {
                url,
                part_number: None,
                size: options.size,
            }],
            object_size: None,
        })
    }

    async fn presign_multipart(
        &self,
        key: &ObjectKey,
        options: &PresignOptions,
    ) -> StoreResult<PresignedRequest> {
        let total = options.size.ok_or_else(|| {
            StoreError::InvalidRequest("multipart uploads need a size".into())
        })?;
        let plan = plan_parts(total, self.config.part_size)?;

        let upload_id = self
            .store
            .create_multipart_upload(key, options.content_type.as_deref())
            .await?;
        debug!(%key, %upload_id, parts = plan.len(), "multipart upload initiated");

        let store = &self.store;
        let upload = &upload_id;
        let urls: StoreResult<Vec<PresignedUrl>> = stream::iter(plan.into_iter().enumerate())
            .map(|(index, size)| async move {
                let part_number = index as u32 + 1;
                let url = store.presign_upload_part(key, upload, part_number).await?;
                Ok(PresignedUrl {
                    url,
                    part_number: Some(part_number),
                    size: Some(size),
                })
            })
            .buffered(self.config.parallelism.max(1))
            .try_collect()
            .await;

        match urls {
            Ok(urls) => Ok(PresignedRequest {
                method: Method::Put,
                key: key.to_key_string(),
                upload_id: Some(upload_id),
                urls,
                object_size: None,
            }),
            Err(e) => {
                if let Err(abort_err) = self.store.abort_multipart_upload(key, &upload_id).await {
                    warn!(%key, %upload_id, error = %abort_err, "failed to abort multipart upload after presign failure");
                }
                Err(e)
            }
        }
    }

    /// Finish a multipart upload. Parts may be listed in any order.
    pub async fn complete(
        &self,
        key: &ObjectKey,
        upload_id: &UploadId,
        parts: &[CompletedPart],
    ) -> StoreResult<ObjectMeta> {
        let parts = normalize_parts(parts)?;
        self.store
            .complete_multipart_upload(key, upload_id, &parts)
            .await
    }

    /// Cancel a multipart upload.
    pub async fn abort(&self, key: &ObjectKey, upload_id: &UploadId) -> StoreResult<()> {
        self.store.abort_multipart_upload(key, upload_id).await
    }
}

impl std::fmt::Debug for Presigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Presigner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStore;
    use crate::signer::UrlSigner;
    use proptest::prelude::*;
    use std::time::Duration;
    use strata_types::ProjectId;

    const MIB: u64 = 1024 * 1024;

    fn setup() -> (Arc<InMemoryObjectStore>, Presigner) {
        let signer =
            UrlSigner::ephemeral("http://localhost:9000", "test", Duration::from_secs(60)).unwrap();
        let store = Arc::new(InMemoryObjectStore::new(signer));
        let presigner = Presigner::new(store.clone(), PresignConfig::default());
        (store, presigner)
    }

    fn key() -> ObjectKey {
        ObjectKey::new(ProjectId::new(), "level.bin").unwrap()
    }

    #[tokio::test]
    async fn single_put_returns_one_url() {
        let (_, presigner) = setup();
        let options = PresignOptions {
            multipart: false,
            size: Some(10 * MIB),
            content_type: None,
        };
        let req = presigner.presign(Method::Put, &key(), &options).await.unwrap();
        assert_eq!(req.urls.len(), 1);
        assert!(req.upload_id.is_none());
    }

    #[tokio::test]
    async fn multipart_10mib_in_5mib_parts_returns_two_urls() {
        let (store, presigner) = setup();
        let options = PresignOptions {
            multipart: true,
            size: Some(10 * MIB),
            content_type: Some("application/octet-stream".into()),
        };
        let req = presigner.presign(Method::Put, &key(), &options).await.unwrap();
        assert_eq!(req.urls.len(), 2);
        let upload_id = req.upload_id.expect("upload id");
        assert!(!upload_id.as_str().is_empty());
        let numbers: Vec<_> = req.urls.iter().map(|u| u.part_number).collect();
        assert_eq!(numbers, vec![Some(1), Some(2)]);
        assert_eq!(store.pending_uploads(), 1);
    }

    #[tokio::test]
    async fn multipart_requires_size() {
        let (store, presigner) = setup();
        let options = PresignOptions {
            multipart: true,
            ..Default::default()
        };
        let err = presigner.presign(Method::Put, &key(), &options).await.unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(store.pending_uploads(), 0, "nothing initiated on bad input");
    }

    #[tokio::test]
    async fn get_reports_object_size() {
        let (store, presigner) = setup();
        let k = key();
        store.put_object(&k, vec![0u8; 42]).unwrap();
        let req = presigner
            .presign(Method::Get, &k, &PresignOptions::default())
            .await
            .unwrap();
        assert_eq!(req.object_size, Some(42));
        assert_eq!(store.download(&req.urls[0].url).unwrap().len(), 42);
    }

    #[tokio::test]
    async fn get_of_missing_object_fails() {
        let (_, presigner) = setup();
        let err = presigner
            .presign(Method::Get, &key(), &PresignOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn oversized_single_put_is_rejected() {
        let (_, presigner) = setup();
        let options = PresignOptions {
            size: Some(MAX_SINGLE_PUT_SIZE + 1),
            ..Default::default()
        };
        assert!(presigner.presign(Method::Put, &key(), &options).await.is_err());
    }

    #[tokio::test]
    async fn complete_accepts_unsorted_parts() {
        let (store, presigner) = setup();
        let k = key();
        let options = PresignOptions {
            multipart: true,
            size: Some(MIN_PART_SIZE + 3),
            content_type: None,
        };
        let req = presigner.presign(Method::Put, &k, &options).await.unwrap();
        let upload_id = req.upload_id.clone().unwrap();

        let mut parts = Vec::new();
        for part in req.urls.iter().rev() {
            let body = vec![7u8; part.size.unwrap() as usize];
            let etag = store.accept_upload(&part.url, body).unwrap();
            parts.push(CompletedPart::new(part.part_number.unwrap(), etag));
        }
        let meta = presigner.complete(&k, &upload_id, &parts).await.unwrap();
        assert_eq!(meta.size, MIN_PART_SIZE + 3);
    }

    #[test]
    fn config_validation() {
        assert!(PresignConfig::default().validate().is_ok());
        let small = PresignConfig {
            part_size: MIB,
            ..Default::default()
        };
        assert!(small.validate().is_err());
    }

    #[test]
    fn too_many_parts_is_rejected() {
        assert!(plan_parts(MAX_PARTS * 2 + 1, 2).is_err());
        assert!(plan_parts(0, MIN_PART_SIZE).is_err());
    }

    proptest! {
        #[test]
        fn part_plan_covers_total(total in 1u64..=64 * MIB, part_size in MIN_PART_SIZE..=16 * MIB) {
            let parts = plan_parts(total, part_size).unwrap();
            prop_assert_eq!(parts.iter().sum::<u64>(), total);
            prop_assert_eq!(parts.len() as u64, total.div_ceil(part_size));
            prop_assert!(parts.iter().all(|p| *p > 0 && *p <= part_size));
            let (last, rest) = parts.split_last().unwrap();
            prop_assert!(rest.iter().all(|p| *p == part_size));
            prop_assert!(*last <= part_size);
        }
    }
}
