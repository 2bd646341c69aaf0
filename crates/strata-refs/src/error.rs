//! Error types for branch and lock operations.

use strata_types::{BranchId, CommitId};
use thiserror::Error;

/// Errors that can occur during branch operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The branch was not found (or is soft-deleted where a live branch is
    /// required).
    #[error("branch not found: {0}")]
    NotFound(BranchId),

    /// A live branch with this name already exists in the project.
    #[error("branch already exists: {name}")]
    AlreadyExists { name: String },

    /// The project or branch name is invalid.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A compare-and-set repoint found a different head than expected.
    #[error("branch {branch} moved: expected head {expected}, found {actual}")]
    StaleHead {
        branch: BranchId,
        expected: CommitId,
        actual: CommitId,
    },

    /// The storage backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for branch operations.
pub type Result<T> = std::result::Result<T, RefError>;
