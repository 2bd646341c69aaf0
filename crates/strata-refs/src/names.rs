//! Project and branch name validation.
//!
//! Valid names:
//! - Are non-empty and at most [`MAX_NAME_LEN`] characters
//! - Contain no whitespace, control characters, `~`, `^`, `:`, `?`, `*`,
//!   `[`, `\`, `..` or `@{`
//! - Do not start or end with `.` or `/`, and do not end with `.lock`
//! - Branch names may be hierarchical (`feature/auth`) but must not contain
//!   `//` or components starting with `.`; project names contain no `/`

use crate::error::{RefError, Result};

/// Longest accepted project or branch name.
pub const MAX_NAME_LEN: usize = 100;

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Validate a branch name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use strata_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("stable").is_ok());
/// assert!(validate_branch_name("feature/auth").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    check_common(name)?;
    if name.contains("//") {
        return invalid(name, "must not contain consecutive slashes '//'");
    }
    if let Some(component) = name.split('/').find(|c| c.starts_with('.')) {
        return Err(RefError::InvalidName {
            name: name.to_string(),
            reason: format!("component must not start with '.': {component:?}"),
        });
    }
    Ok(())
}

/// Validate a project name. Same rules as branch names, without `/`.
pub fn validate_project_name(name: &str) -> Result<()> {
    check_common(name)?;
    if name.contains('/') {
        return invalid(name, "project names must not contain '/'");
    }
    Ok(())
}

fn check_common(name: &str) -> Result<()> {
    if name.is_empty() {
        return invalid(name, "name must not be empty");
    }
    if name.chars().count() > MAX_NAME_LEN {
        return invalid(name, "name is too long");
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return invalid(name, "must not contain whitespace or control characters");
    }
    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return Err(RefError::InvalidName {
            name: name.to_string(),
            reason: format!("contains forbidden character: {ch:?}"),
        });
    }
    if name.contains("..") {
        return invalid(name, "must not contain '..'");
    }
    if name.contains("@{") {
        return invalid(name, "must not contain '@{'");
    }
    if name.starts_with(&['.', '/'][..]) || name.ends_with(&['.', '/'][..]) {
        return invalid(name, "must not start or end with '.' or '/'");
    }
    if name.ends_with(".lock") {
        return invalid(name, "must not end with '.lock'");
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> Result<()> {
    Err(RefError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_branch_names() {
        for name in ["stable", "develop", "v1.0", "feature/auth", "user/alice/fix-123"] {
            assert!(validate_branch_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn reject_bad_branch_names() {
        for name in [
            "",
            "bad..name",
            "has space",
            "has\ttab",
            "a~b",
            "a:b",
            "a[b",
            "a\\b",
            ".hidden",
            "trailing.",
            "/leading",
            "trailing/",
            "a//b",
            "stable.lock",
            "ref@{0}",
            "feature/.hidden",
        ] {
            assert!(validate_branch_name(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn project_names_are_flat() {
        assert!(validate_project_name("p1").is_ok());
        assert!(validate_project_name("space-game_2").is_ok());
        assert!(validate_project_name("a/b").is_err());
    }

    #[test]
    fn long_names_are_rejected() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(validate_project_name(&long).is_err());
        assert!(validate_branch_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
    }
}
