use std::fmt;

use strata_types::{ContentHash, ProjectId, RepoPath};

use crate::error::{StoreError, StoreResult};

/// A storage key, always namespaced by project: `{projectID}/{name}`.
///
/// `name` is either a content hash (committed blobs) or a relative path.
/// The project prefix scopes presigned access and lets the garbage
/// collector enumerate a project's objects with one prefix listing.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    project: ProjectId,
    name: String,
}

impl ObjectKey {
    /// Build a key from a project and a relative name.
    pub fn new(project: ProjectId, name: impl Into<String>) -> StoreResult<Self> {
        let name = name.into();
        RepoPath::new(name.clone()).map_err(|e| StoreError::InvalidKey {
            key: format!("{project}/{name}"),
            reason: e.to_string(),
        })?;
        Ok(Self { project, name })
    }

    /// Key of the blob holding `hash` within `project`.
    pub fn for_hash(project: ProjectId, hash: &ContentHash) -> Self {
        Self {
            project,
            name: hash.as_str().to_string(),
        }
    }

    /// Parse a raw `{projectID}/{name}` key as returned by a listing.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let (project, name) = raw.split_once('/').ok_or_else(|| StoreError::InvalidKey {
            key: raw.to_string(),
            reason: "missing project prefix".into(),
        })?;
        let project = project.parse().map_err(|_| StoreError::InvalidKey {
            key: raw.to_string(),
            reason: "prefix is not a project identifier".into(),
        })?;
        Self::new(project, name)
    }

    /// Listing prefix covering every object of `project`.
    pub fn project_prefix(project: &ProjectId) -> String {
        format!("{project}/")
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    /// The part after the project prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full key string.
    pub fn to_key_string(&self) -> String {
        format!("{}/{}", self.project, self.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({}/{})", self.project.short_id(), self.name)
    }
}
