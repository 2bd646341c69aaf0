use std::time::Duration;

use strata_ledger::LedgerError;
use strata_refs::RefError;
use strata_store::StoreError;
use strata_types::TypeError;
use thiserror::Error;

/// Classification every core error falls into.
///
/// Boundary layers map kinds to their own status codes; they never need to
/// look at the concrete variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    Upstream,
    Invalid,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Upstream => "upstream",
            Self::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("ref error: {0}")]
    Ref(RefError),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    #[error("upstream error: {0}")]
    Upstream(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Timeout { .. } | Self::Upstream(_) => ErrorKind::Upstream,
            Self::Store(e) => match e {
                StoreError::NotFound { .. } | StoreError::UploadNotFound { .. } => {
                    ErrorKind::NotFound
                }
                StoreError::Signature(_) => ErrorKind::Forbidden,
                StoreError::Backend(_) => ErrorKind::Upstream,
                _ if e.is_invalid_input() => ErrorKind::Invalid,
                _ => ErrorKind::Upstream,
            },
            Self::Ref(e) => match e {
                RefError::NotFound(_) => ErrorKind::NotFound,
                RefError::AlreadyExists { .. } | RefError::StaleHead { .. } => {
                    ErrorKind::Conflict
                }
                RefError::InvalidName { .. } => ErrorKind::Invalid,
                RefError::Backend(_) => ErrorKind::Upstream,
            },
            Self::Ledger(e) => match e {
                LedgerError::NotFound(_) => ErrorKind::NotFound,
                LedgerError::AlreadyExists(_) | LedgerError::DuplicateIndex { .. } => {
                    ErrorKind::Conflict
                }
                LedgerError::InvalidChanges(_) => ErrorKind::Invalid,
                LedgerError::Backend(_) => ErrorKind::Upstream,
            },
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn conflict(what: impl std::fmt::Display) -> Self {
        Self::Conflict(what.to_string())
    }

    pub fn invalid(what: impl std::fmt::Display) -> Self {
        Self::Invalid(what.to_string())
    }
}

impl From<TypeError> for CoreError {
    fn from(e: TypeError) -> Self {
        Self::Invalid(e.to_string())
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<RefError> for CoreError {
    fn from(e: RefError) -> Self {
        Self::Ref(e)
    }
}

impl From<LedgerError> for CoreError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use strata_types::{BranchId, CommitId};

    use super::*;

    #[test]
    fn lower_errors_keep_their_kind() {
        let cases: Vec<(CoreError, ErrorKind)> = vec![
            (
                StoreError::NotFound { key: "k".into() }.into(),
                ErrorKind::NotFound,
            ),
            (
                StoreError::InvalidParts("dup".into()).into(),
                ErrorKind::Invalid,
            ),
            (StoreError::Backend("down".into()).into(), ErrorKind::Upstream),
            (
                RefError::StaleHead {
                    branch: BranchId::new(),
                    expected: CommitId::new(),
                    actual: CommitId::new(),
                }
                .into(),
                ErrorKind::Conflict,
            ),
            (
                LedgerError::InvalidChanges("x".into()).into(),
                ErrorKind::Invalid,
            ),
            (
                TypeError::InvalidVersion(0).into(),
                ErrorKind::Invalid,
            ),
            (
                CoreError::Timeout {
                    operation: "branch lookup",
                    after: Duration::from_secs(5),
                },
                ErrorKind::Upstream,
            ),
        ];
        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }
}
