//! Shared git types and helper queries
//!
//! Error type, repository predicates, and small read-only queries used
//! across the service modules.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::exec::run_git;

/// Error type for git operations.
///
/// Expected git-domain outcomes (conflicts, divergence, destination
/// exists) are NOT errors; they are fields on the per-service result
/// structs. These variants cover validation, preconditions and genuinely
/// unexpected failures.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not a git repository")]
    NotAGitRepo,
    #[error("Path escapes workspace root")]
    PathEscape,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Git command timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Git command failed: {0}")]
    CommandFailed(String),
}

/// Check if the path is inside a git repository and return the repo root.
pub async fn get_git_repo_root(cwd: &Path) -> Option<String> {
    let output = run_git(cwd, &["rev-parse", "--show-toplevel"]).await.ok()?;
    if output.success() {
        Some(output.stdout.trim().to_string())
    } else {
        None
    }
}

/// Check if the path is inside a git working tree.
pub async fn is_git_repo(cwd: &Path) -> bool {
    get_git_repo_root(cwd).await.is_some()
}

/// Check whether the repository has at least one commit.
pub async fn has_commits(cwd: &Path) -> bool {
    match run_git(cwd, &["rev-parse", "--verify", "--quiet", "HEAD"]).await {
        Ok(out) => out.success(),
        Err(_) => false,
    }
}

/// Get the current branch name.
///
/// Returns Ok(None) on detached HEAD or an unborn branch.
pub async fn current_branch(cwd: &Path) -> Result<Option<String>, GitError> {
    let output = run_git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    if !output.success() {
        // Unborn branch (no commits yet) reports an error here.
        return Ok(None);
    }
    let branch = output.stdout.trim().to_string();
    if branch.is_empty() || branch == "HEAD" {
        Ok(None)
    } else {
        Ok(Some(branch))
    }
}

/// Get the short SHA of HEAD.
pub async fn get_short_head_sha(cwd: &Path) -> Option<String> {
    let output = run_git(cwd, &["rev-parse", "--short", "HEAD"]).await.ok()?;
    if output.success() {
        Some(output.stdout.trim().to_string())
    } else {
        None
    }
}

/// List files currently in the unmerged state.
pub async fn get_conflict_files(cwd: &Path) -> Vec<String> {
    match run_git(cwd, &["diff", "--name-only", "--diff-filter=U"]).await {
        Ok(out) if out.success() => out
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect(),
        _ => vec![],
    }
}

/// Validate that a relative path stays within the given root.
///
/// Rejects absolute paths outright; `..` components are only accepted when
/// the canonicalized result still lives under the root.
pub fn validate_path(root: &Path, path: &str) -> Result<PathBuf, GitError> {
    if Path::new(path).is_absolute() {
        return Err(GitError::PathEscape);
    }
    if path.contains("..") {
        let full_path = root.join(path);
        let canonical = full_path.canonicalize().map_err(|_| GitError::PathEscape)?;
        let root_canonical = root.canonicalize().map_err(GitError::Io)?;
        if !canonical.starts_with(&root_canonical) {
            return Err(GitError::PathEscape);
        }
        return Ok(canonical);
    }
    Ok(root.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_rejects_absolute() {
        let root = Path::new("/tmp");
        assert!(matches!(
            validate_path(root, "/etc/passwd"),
            Err(GitError::PathEscape)
        ));
    }

    #[test]
    fn test_validate_path_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_path(dir.path(), "../outside.txt"),
            Err(GitError::PathEscape)
        ));
    }

    #[test]
    fn test_validate_path_plain_relative() {
        let root = Path::new("/work");
        let p = validate_path(root, "src/main.rs").unwrap();
        assert_eq!(p, PathBuf::from("/work/src/main.rs"));
    }

    #[tokio::test]
    async fn test_is_git_repo_negative() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_git_repo(dir.path()).await);
    }
}
