//! Foundation types for Strata.
//!
//! Every other Strata crate depends on `strata-types`. The types here are
//! plain values: they validate on construction and carry no storage logic.
//!
//! # Key Types
//!
//! - [`ProjectId`], [`BranchId`], [`CommitId`]: UUID v7 record identifiers
//! - [`TeamId`], [`UserId`]: opaque identities resolved outside the core
//! - [`ContentHash`]: digest of a file's bytes, used as the blob key
//! - [`RepoPath`]: validated relative file path inside a project
//! - [`FileEntry`]: `{hash, version}` pair stored per path in a commit

pub mod entry;
pub mod error;
pub mod hash;
pub mod id;
pub mod path;

pub use entry::FileEntry;
pub use error::TypeError;
pub use hash::ContentHash;
pub use id::{BranchId, CommitId, ProjectId, TeamId, UserId};
pub use path::RepoPath;
