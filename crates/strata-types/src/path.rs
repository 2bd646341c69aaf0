//! Relative file paths inside a project.
//!
//! A valid path:
//! - is non-empty and at most [`MAX_PATH_LEN`] bytes
//! - uses `/` as the only separator (no `\`)
//! - does not start or end with `/`
//! - has no empty, `.` or `..` components
//! - contains no NUL or other control characters

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest accepted path, in bytes.
pub const MAX_PATH_LEN: usize = 1024;

/// A validated relative file path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        validate(&value).map_err(|reason| TypeError::InvalidPath {
            value: value.clone(),
            reason: reason.into(),
        })?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final component of the path.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

fn validate(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("must not be empty");
    }
    if value.len() > MAX_PATH_LEN {
        return Err("too long");
    }
    if value.chars().any(|c| c.is_control()) {
        return Err("must not contain control characters");
    }
    if value.contains('\\') {
        return Err("must use '/' as separator");
    }
    if value.starts_with('/') || value.ends_with('/') {
        return Err("must not start or end with '/'");
    }
    for component in value.split('/') {
        match component {
            "" => return Err("must not contain empty components"),
            "." | ".." => return Err("must not contain '.' or '..' components"),
            _ => {}
        }
    }
    Ok(())
}

impl fmt::Debug for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoPath({})", self.0)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepoPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepoPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
