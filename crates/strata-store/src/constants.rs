//! Limits for presigning and multipart uploads.
//!
//! The part limits follow the S3 multipart protocol so that the same
//! orchestration works against any S3-compatible backend.

use std::time::Duration;

/// Smallest allowed multipart part size (5 MiB). Only the final part of an
/// upload may be smaller.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Default multipart part size.
pub const DEFAULT_PART_SIZE: u64 = MIN_PART_SIZE;

/// Maximum number of parts in one multipart upload.
pub const MAX_PARTS: u64 = 10_000;

/// Largest object accepted through a single presigned PUT (5 GiB).
pub const MAX_SINGLE_PUT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Incomplete multipart uploads are discarded after this window.
pub const MULTIPART_UPLOAD_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default lifetime of a presigned URL.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);

/// Longest lifetime a presigned URL may have (7 days, as in S3).
pub const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default number of part URLs presigned concurrently.
pub const DEFAULT_PRESIGN_PARALLELISM: usize = 8;

/// Default page size when listing objects.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

const _: () = assert!(DEFAULT_PART_SIZE >= MIN_PART_SIZE);
const _: () = assert!(MAX_PARTS > 0);
const _: () = assert!(MAX_SINGLE_PUT_SIZE >= MIN_PART_SIZE);
const _: () = assert!(DEFAULT_PRESIGN_PARALLELISM > 0);
const _: () = assert!(DEFAULT_PRESIGN_TTL.as_secs() <= MAX_PRESIGN_TTL.as_secs());
const _: () = assert!(DEFAULT_LIST_PAGE_SIZE > 0);
