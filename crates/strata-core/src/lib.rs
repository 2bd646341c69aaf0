//! Core services of Strata.
//!
//! This crate ties the stores together into the operations a request
//! handler calls. It provides:
//! - [`ProjectRegistry`]: project and branch lifecycle, cascading deletes
//! - [`LockCoordinator`]: path locks on branches
//! - [`CommitService`]: lock-checked, compare-and-set commits
//! - [`BlobService`]: project-scoped presigned URLs and bandwidth metering
//! - [`GarbageCollector`]: deletion of blobs no commit references
//! - [`Strata`]: one handle over all of the above
//!
//! Backends are passed in explicitly through [`Deps`]; nothing in this
//! crate reaches for global state. Every document-store call runs under
//! the document timeout and every storage call under the storage timeout.

pub mod blobs;
pub mod commits;
pub mod config;
pub mod deps;
pub mod error;
pub mod gc;
pub mod locks;
pub mod project;
pub mod registry;
pub mod strata;
pub mod usage;

pub use blobs::BlobService;
pub use commits::{BranchWithCommit, CommitRequest, CommitService};
pub use config::CoreConfig;
pub use deps::{in_memory_object_store, Deps};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use gc::{GarbageCollector, ReconcileReport, ReconcileStatus};
pub use locks::LockCoordinator;
pub use project::{InMemoryProjectStore, Project, ProjectPatch, ProjectStore, StorageGrant};
pub use registry::{DeleteReport, ProjectRegistry};
pub use strata::Strata;
pub use usage::{InMemoryUsageMeter, UsageMeter};

// Re-export the types callers need to build requests.
pub use strata_ledger::{Commit, CommitPatch, FileChanges, FileMap, ValidationReport};
pub use strata_refs::{Branch, LockSet};
pub use strata_store::{
    CompletedPart, Method, ObjectMeta, PresignOptions, PresignedRequest, UploadId,
};
pub use strata_types::{
    BranchId, CommitId, ContentHash, FileEntry, ProjectId, RepoPath, TeamId, TypeError, UserId,
};
