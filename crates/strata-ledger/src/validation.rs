use strata_types::BranchId;

use crate::error::Result;
use crate::records::Commit;
use crate::traits::CommitStore;

/// Result of validating one branch's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub branch: BranchId,
    pub commit_count: u64,
    pub indices_contiguous: bool,
    pub linkage_consistent: bool,
    pub versions_consistent: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub index: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    IndexGap,
    ForeignBranch,
    ProjectMismatch,
    VersionRule,
}

/// Branch history validator.
pub struct HistoryValidator;

impl HistoryValidator {
    /// Load and validate every commit of `branch`.
    pub async fn validate_branch<S>(store: &S, branch: &BranchId) -> Result<ValidationReport>
    where
        S: CommitStore + ?Sized,
    {
        let commits = store.list_by_branch(branch).await?;
        Ok(Self::validate_commits(branch, &commits))
    }

    /// Validate commits already sorted by index.
    ///
    /// Checks that indices run 1, 2, 3, ... without gaps, that every commit
    /// names the same branch and project, and that each path's version moves
    /// by exactly the rule applied on commit: new paths start at 1, a changed
    /// hash adds one, an unchanged hash keeps its version.
    pub fn validate_commits(branch: &BranchId, commits: &[Commit]) -> ValidationReport {
        let mut violations = Vec::new();
        let mut indices_contiguous = true;
        let mut linkage_consistent = true;
        let mut versions_consistent = true;
        let project = commits.first().map(|c| c.project_id);

        for (position, commit) in commits.iter().enumerate() {
            let expected_index = (position + 1) as u64;
            if commit.index != expected_index {
                indices_contiguous = false;
                violations.push(Violation {
                    index: commit.index,
                    kind: ViolationKind::IndexGap,
                    description: format!(
                        "expected index {expected_index}, got {}",
                        commit.index
                    ),
                });
            }

            if &commit.branch_id != branch {
                linkage_consistent = false;
                violations.push(Violation {
                    index: commit.index,
                    kind: ViolationKind::ForeignBranch,
                    description: format!("commit belongs to branch {}", commit.branch_id),
                });
            }
            if Some(commit.project_id) != project {
                linkage_consistent = false;
                violations.push(Violation {
                    index: commit.index,
                    kind: ViolationKind::ProjectMismatch,
                    description: format!("commit belongs to project {}", commit.project_id),
                });
            }

            // The first commit may carry a map copied from another branch.
            let Some(previous) = position.checked_sub(1).map(|p| &commits[p].files) else {
                continue;
            };
            for (path, entry) in &commit.files {
                let expected = match previous.get(path) {
                    Some(prev) if prev.hash == entry.hash => prev.version,
                    Some(prev) => prev.version.saturating_add(1),
                    None => 1,
                };
                if entry.version != expected {
                    versions_consistent = false;
                    violations.push(Violation {
                        index: commit.index,
                        kind: ViolationKind::VersionRule,
                        description: format!(
                            "{path}: expected version {expected}, got {}",
                            entry.version
                        ),
                    });
                }
            }
        }

        ValidationReport {
            branch: *branch,
            commit_count: commits.len() as u64,
            indices_contiguous,
            linkage_consistent,
            versions_consistent,
            violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use strata_types::{ContentHash, FileEntry, ProjectId, RepoPath};

    use super::*;
    use crate::changes::FileChanges;
    use crate::memory::InMemoryCommitStore;
    use crate::records::FileMap;

    fn p(s: &str) -> RepoPath {
        RepoPath::new(s).unwrap()
    }

    fn h(s: &str) -> ContentHash {
        ContentHash::new(s).unwrap()
    }

    fn history(project: ProjectId, branch: BranchId, hashes: &[&str]) -> Vec<Commit> {
        let mut commits = vec![Commit::initial(project, branch, "Initial commit", FileMap::new())];
        for (i, hash) in hashes.iter().enumerate() {
            let changes = FileChanges {
                modified: vec![p("a.txt")],
                hashes: BTreeMap::from([(p("a.txt"), h(hash))]),
                ..Default::default()
            };
            let mut next = commits[i].clone();
            next.id = strata_types::CommitId::new();
            next.index = (i + 2) as u64;
            next.files = changes.apply(&commits[i].files).unwrap();
            commits.push(next);
        }
        commits
    }

    #[tokio::test]
    async fn valid_history_passes() {
        let store = InMemoryCommitStore::new();
        let (project, branch) = (ProjectId::new(), BranchId::new());
        for commit in history(project, branch, &["h1", "h2", "h2", "h3"]) {
            store.insert(&commit).await.unwrap();
        }
        let report = HistoryValidator::validate_branch(&store, &branch)
            .await
            .unwrap();
        assert!(report.is_valid(), "{:?}", report.violations);
        assert_eq!(report.commit_count, 5);
    }

    #[tokio::test]
    async fn empty_branch_is_valid() {
        let store = InMemoryCommitStore::new();
        let report = HistoryValidator::validate_branch(&store, &BranchId::new())
            .await
            .unwrap();
        assert!(report.is_valid());
        assert_eq!(report.commit_count, 0);
    }

    #[test]
    fn detects_index_gap() {
        let (project, branch) = (ProjectId::new(), BranchId::new());
        let mut commits = history(project, branch, &["h1"]);
        commits[1].index = 3;
        let report = HistoryValidator::validate_commits(&branch, &commits);
        assert!(!report.indices_contiguous);
        assert_eq!(report.violations[0].kind, ViolationKind::IndexGap);
    }

    #[test]
    fn detects_skipped_version() {
        let (project, branch) = (ProjectId::new(), BranchId::new());
        let mut commits = history(project, branch, &["h1", "h2"]);
        commits[2]
            .files
            .insert(p("a.txt"), FileEntry::with_version(h("h2"), 5).unwrap());
        let report = HistoryValidator::validate_commits(&branch, &commits);
        assert!(!report.versions_consistent);
        assert!(report
            .violations
            .iter()
            .all(|v| v.kind == ViolationKind::VersionRule));
    }

    #[test]
    fn detects_linkage_errors() {
        let (project, branch) = (ProjectId::new(), BranchId::new());
        let mut commits = history(project, branch, &["h1"]);
        commits[1].project_id = ProjectId::new();
        let report = HistoryValidator::validate_commits(&branch, &commits);
        assert!(!report.linkage_consistent);
        assert_eq!(report.violations[0].kind, ViolationKind::ProjectMismatch);
    }
}
