//! Blob store adapter for Strata.
//!
//! Clients never stream file bytes through the Strata server. Instead the
//! server hands out presigned URLs and the client talks to object storage
//! directly. This crate owns that exchange:
//!
//! - [`ObjectStore`]: the backend trait (head, list, delete, URL minting,
//!   multipart lifecycle)
//! - [`InMemoryObjectStore`]: a complete in-process backend for tests and
//!   local development
//! - [`Presigner`]: presign orchestration: single URLs, multipart part
//!   planning, completion and abort
//! - [`UrlSigner`]: keyed-BLAKE3 URL signing used by the in-memory backend
//!
//! # Key Layout
//!
//! Every key is `{projectID}/{name}` (see [`ObjectKey`]). Committed blobs
//! use the content hash as `name`, so identical bytes anywhere in a
//! project's history share one object.
//!
//! # Design Rules
//!
//! 1. Presigned URLs are short-lived and grant one method on one key.
//! 2. Multipart part lists are validated and sorted before completion.
//! 3. Incomplete multipart uploads expire after
//!    [`MULTIPART_UPLOAD_RETENTION`].
//! 4. Presign methods are a closed enum; unknown methods are errors.

pub mod constants;
pub mod error;
pub mod key;
pub mod memory;
pub mod method;
pub mod multipart;
pub mod presign;
pub mod signer;
pub mod traits;

pub use constants::{
    DEFAULT_LIST_PAGE_SIZE, DEFAULT_PART_SIZE, DEFAULT_PRESIGN_PARALLELISM, DEFAULT_PRESIGN_TTL,
    MAX_PARTS, MAX_PRESIGN_TTL, MAX_SINGLE_PUT_SIZE, MIN_PART_SIZE, MULTIPART_UPLOAD_RETENTION,
};
pub use error::{StoreError, StoreResult};
pub use key::ObjectKey;
pub use memory::InMemoryObjectStore;
pub use method::Method;
pub use multipart::{normalize_parts, CompletedPart, UploadId};
pub use presign::{
    plan_parts, PresignConfig, PresignOptions, PresignedRequest, PresignedUrl, Presigner,
};
pub use signer::{PartTarget, UrlSigner, VerifiedRequest};
pub use traits::{ListPage, ObjectMeta, ObjectStore};
