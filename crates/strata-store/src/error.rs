/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The multipart upload does not exist (never started, completed,
    /// aborted, or expired).
    #[error("multipart upload not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    /// The object key is malformed or escapes its project prefix.
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The part list handed to a completion call is unusable.
    #[error("invalid part list: {0}")]
    InvalidParts(String),

    /// The presign request itself is malformed (missing size, too large).
    #[error("invalid presign request: {0}")]
    InvalidRequest(String),

    /// A presigned URL failed signature or expiry verification.
    #[error("presigned URL rejected: {0}")]
    Signature(String),

    /// The storage backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` for errors caused by the caller's input rather than
    /// the backend.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey { .. } | Self::InvalidParts(_) | Self::InvalidRequest(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
