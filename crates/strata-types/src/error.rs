use thiserror::Error;

/// Errors produced when constructing foundation types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid content hash {value:?}: {reason}")]
    InvalidHash { value: String, reason: String },

    #[error("invalid path {value:?}: {reason}")]
    InvalidPath { value: String, reason: String },

    #[error("invalid identifier {value:?}: {reason}")]
    InvalidId { value: String, reason: String },

    #[error("invalid version {0}: versions start at 1")]
    InvalidVersion(u32),
}
