//! Branch pointers and lock sets for Strata.
//!
//! A branch is a named, mutable pointer to the latest commit of a line of
//! work inside a project. It also carries the branch's lock set: the paths
//! collaborators have reserved against concurrent edits.
//!
//! # Architecture
//!
//! - **Heads** move only by compare-and-set ([`BranchStore::advance`]), so
//!   two writers racing on the same branch cannot both win.
//! - **Locks** change only through atomic set updates
//!   ([`BranchStore::add_locks`], [`BranchStore::remove_locks`]).
//! - **Deletion** is soft by default; soft-deleted branches free their name.
//!
//! # Modules
//!
//! - [`error`]: Error types for branch operations
//! - [`types`]: [`Branch`], [`LockSet`], [`LockEntry`]
//! - [`traits`]: The [`BranchStore`] trait
//! - [`names`]: Project and branch name validation
//! - [`memory`]: In-memory [`InMemoryBranchStore`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use memory::InMemoryBranchStore;
pub use names::{validate_branch_name, validate_project_name};
pub use traits::BranchStore;
pub use types::{Branch, LockConflict, LockEntry, LockSet};
