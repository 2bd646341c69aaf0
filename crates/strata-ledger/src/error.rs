use strata_types::{BranchId, CommitId};

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("commit not found: {0}")]
    NotFound(CommitId),

    #[error("commit already exists: {0}")]
    AlreadyExists(CommitId),

    #[error("branch {branch} already has a commit at index {index}")]
    DuplicateIndex { branch: BranchId, index: u64 },

    #[error("invalid file changes: {0}")]
    InvalidChanges(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
