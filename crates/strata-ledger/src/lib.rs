//! Commit ledger for Strata.
//!
//! This crate stores the immutable history of every branch. It provides:
//! - [`Commit`] records carrying a full path → `{hash, version}` map
//! - [`FileChanges::apply`], the versioning rule applied on every commit
//! - The [`CommitStore`] trait boundary
//! - [`InMemoryCommitStore`] for tests and embedding
//! - History validation (index contiguity, linkage, version counters)

pub mod changes;
pub mod error;
pub mod memory;
pub mod records;
pub mod traits;
pub mod validation;

pub use changes::FileChanges;
pub use error::{LedgerError, Result};
pub use memory::InMemoryCommitStore;
pub use records::{Commit, CommitPatch, FileMap};
pub use traits::CommitStore;
pub use validation::{HistoryValidator, ValidationReport, Violation, ViolationKind};
