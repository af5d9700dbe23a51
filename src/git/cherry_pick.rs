//! Cherry-pick service
//!
//! Applies a list of commits onto the current branch in a single git
//! invocation. The operation is atomic from the caller's view: a conflict
//! aborts the whole pick and restores the worktree, never leaving a
//! half-applied sequence behind.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::exec::run_git;
use super::lock::lock_worktree;
use super::sync::{classify_git_failure, FailureKind};
use super::utils::{get_conflict_files, get_git_repo_root, GitError};

/// Options for a cherry-pick operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CherryPickOptions {
    /// Stage the changes without creating commits (`--no-commit`).
    #[serde(default)]
    pub no_commit: bool,
}

/// Structured outcome of a cherry-pick operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CherryPickResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub picked: Vec<String>,
    pub has_conflicts: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub conflict_files: Vec<String>,
    /// Set when a conflicted pick was rolled back.
    pub aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A plausible commit hash: 4 to 40 hex digits. Checked before anything is
/// spawned so malformed input never reaches git.
pub fn is_valid_commit_hash(hash: &str) -> bool {
    (4..=40).contains(&hash.len()) && hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Cherry-pick the given commits, in order, onto the current branch.
pub async fn cherry_pick_commits(
    cwd: &Path,
    hashes: &[String],
    opts: &CherryPickOptions,
) -> Result<CherryPickResult, GitError> {
    if hashes.is_empty() {
        return Err(GitError::InvalidInput("no commit hashes given".to_string()));
    }
    for hash in hashes {
        if !is_valid_commit_hash(hash) {
            return Err(GitError::InvalidInput(format!(
                "invalid commit hash: '{}'",
                hash
            )));
        }
    }
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let _guard = lock_worktree(cwd).await;

    // Resolve every hash up front; the first unknown one fails the call.
    for hash in hashes {
        let rev = format!("{}^{{commit}}", hash);
        let verify = run_git(cwd, &["rev-parse", "--verify", "--quiet", &rev]).await?;
        if !verify.success() {
            return Err(GitError::InvalidInput(format!(
                "commit not found in repository: '{}'",
                hash
            )));
        }
    }

    let mut args: Vec<&str> = vec!["cherry-pick"];
    if opts.no_commit {
        args.push("--no-commit");
    }
    args.extend(hashes.iter().map(String::as_str));

    let output = run_git(cwd, &args).await?;
    if output.success() {
        info!(count = hashes.len(), "cherry-picked commits");
        return Ok(CherryPickResult {
            success: true,
            picked: hashes.to_vec(),
            message: Some(format!("Cherry-picked {} commit(s)", hashes.len())),
            ..Default::default()
        });
    }

    let text = output.combined();
    if classify_git_failure(&text) == FailureKind::Conflict {
        let conflict_files = get_conflict_files(cwd).await;
        let abort = run_git(cwd, &["cherry-pick", "--abort"]).await?;
        if !abort.success() {
            warn!(message = %abort.message(), "cherry-pick abort failed");
        }
        return Ok(CherryPickResult {
            has_conflicts: true,
            conflict_files,
            aborted: abort.success(),
            message: Some(output.message()),
            ..Default::default()
        });
    }

    Err(GitError::CommandFailed(output.message()))
}
