//! Merge-state detection
//!
//! Inspects repository control markers to determine whether a merge,
//! rebase or cherry-pick is in progress, and enumerates conflicted vs.
//! merge-affected files. Markers are resolved through
//! `git rev-parse --git-path`, which handles linked worktrees whose
//! `.git` is a pointer to a separate common directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::exec::run_git;
use super::status::git_status;
use super::utils::{get_conflict_files, get_git_repo_root, GitError};

/// Kind of in-progress merge operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeOperationType {
    Merge,
    Rebase,
    CherryPick,
}

impl MergeOperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeOperationType::Merge => "merge",
            MergeOperationType::Rebase => "rebase",
            MergeOperationType::CherryPick => "cherry-pick",
        }
    }
}

/// Transient snapshot of the repository's merge state.
///
/// Invariants: `is_clean_merge == conflict_files.is_empty()` and
/// `merge_operation_type.is_some() == is_merging`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeStateInfo {
    pub is_merging: bool,
    pub merge_operation_type: Option<MergeOperationType>,
    pub is_clean_merge: bool,
    pub merge_affected_files: Vec<String>,
    pub conflict_files: Vec<String>,
}

impl MergeStateInfo {
    fn not_merging() -> Self {
        Self {
            is_merging: false,
            merge_operation_type: None,
            is_clean_merge: true,
            merge_affected_files: vec![],
            conflict_files: vec![],
        }
    }
}

/// Whether the current HEAD is a merge commit, and which files it touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCommitInfo {
    pub is_merge_commit: bool,
    pub files: Vec<String>,
}

/// Resolve a control marker path and check whether it exists.
///
/// The path printed by `--git-path` is relative to the working directory
/// unless the control directory lives elsewhere.
async fn marker_exists(cwd: &Path, marker: &str) -> bool {
    let output = match run_git(cwd, &["rev-parse", "--git-path", marker]).await {
        Ok(out) if out.success() => out,
        _ => return false,
    };
    let printed = output.stdout.trim();
    if printed.is_empty() {
        return false;
    }
    let path = PathBuf::from(printed);
    let resolved = if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    };
    resolved.exists()
}

/// Detect whether a merge/rebase/cherry-pick is in progress.
///
/// Marker priority is fixed: merge, then the two rebase forms, then
/// cherry-pick; the first match wins. The file-list sub-queries are
/// best-effort; a failure there degrades to an empty list and never
/// aborts detection itself.
pub async fn detect_merge_state(cwd: &Path) -> Result<MergeStateInfo, GitError> {
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let operation = if marker_exists(cwd, "MERGE_HEAD").await {
        Some(MergeOperationType::Merge)
    } else if marker_exists(cwd, "rebase-merge").await
        || marker_exists(cwd, "rebase-apply").await
    {
        Some(MergeOperationType::Rebase)
    } else if marker_exists(cwd, "CHERRY_PICK_HEAD").await {
        Some(MergeOperationType::CherryPick)
    } else {
        None
    };

    let Some(operation) = operation else {
        return Ok(MergeStateInfo::not_merging());
    };

    let conflict_files = get_conflict_files(cwd).await;

    let merge_affected_files = match git_status(cwd).await {
        Ok(entries) => entries
            .into_iter()
            .filter(|e| {
                e.is_merge_affected
                    || (e.index_status != ' ' && e.index_status != '?' && e.index_status != '!')
            })
            .map(|e| e.path)
            .collect(),
        Err(e) => {
            warn!(cwd = %cwd.display(), error = %e, "status query failed during merge-state detection");
            vec![]
        }
    };

    Ok(MergeStateInfo {
        is_merging: true,
        merge_operation_type: Some(operation),
        is_clean_merge: conflict_files.is_empty(),
        merge_affected_files,
        conflict_files,
    })
}

/// Check whether HEAD is a merge commit.
///
/// The absence of a second parent is the normal, expected case. When a
/// second parent exists, the affected files are taken from a diff against
/// the first parent.
pub async fn detect_merge_commit(cwd: &Path) -> Result<MergeCommitInfo, GitError> {
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let second_parent = run_git(cwd, &["rev-parse", "--verify", "--quiet", "HEAD^2"]).await?;
    if !second_parent.success() {
        return Ok(MergeCommitInfo {
            is_merge_commit: false,
            files: vec![],
        });
    }

    let files = match run_git(cwd, &["diff", "--name-only", "HEAD^1", "HEAD"]).await {
        Ok(out) if out.success() => out
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect(),
        Ok(out) => {
            warn!(cwd = %cwd.display(), message = %out.message(), "merge-commit diff failed");
            vec![]
        }
        Err(e) => {
            warn!(cwd = %cwd.display(), error = %e, "merge-commit diff failed");
            vec![]
        }
    };

    Ok(MergeCommitInfo {
        is_merge_commit: true,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_merging_invariants() {
        let info = MergeStateInfo::not_merging();
        assert!(!info.is_merging);
        assert!(info.merge_operation_type.is_none());
        assert!(info.is_clean_merge);
        assert!(info.conflict_files.is_empty());
    }

    #[test]
    fn test_operation_type_labels() {
        assert_eq!(MergeOperationType::Merge.as_str(), "merge");
        assert_eq!(MergeOperationType::Rebase.as_str(), "rebase");
        assert_eq!(MergeOperationType::CherryPick.as_str(), "cherry-pick");
    }

    #[test]
    fn test_operation_type_serializes_kebab_case() {
        let json = serde_json::to_string(&MergeOperationType::CherryPick).unwrap();
        assert_eq!(json, "\"cherry-pick\"");
    }
}
