//! Sync engine
//!
//! Full pull-then-push cycle for a worktree's current branch: divergence
//! handling, one auto-resolve retry, and structured conflict reporting.
//! Conflict vs. divergence detection is textual over the command output;
//! the vocabulary is centralized in `classify_git_failure` and pinned by
//! the executor's LC_ALL=C.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::exec::run_git;
use super::lock::lock_worktree;
use super::push::push_attempt;
use super::utils::{current_branch, get_conflict_files, get_git_repo_root, GitError};
use super::branches::tracking_remote;

/// How the pull half of a sync reconciles remote commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    #[default]
    Merge,
    Rebase,
}

/// Options for a sync operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Remote to sync with; defaults to the tracking remote, then "origin".
    pub remote: Option<String>,
    #[serde(default)]
    pub strategy: SyncStrategy,
    /// On push rejection after a clean pull, re-pull and retry once.
    #[serde(default)]
    pub auto_resolve: bool,
}

/// Structured outcome of a sync operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub pulled: bool,
    pub pushed: bool,
    pub is_fast_forward: bool,
    pub is_merge: bool,
    pub diverged: bool,
    pub has_conflicts: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub conflict_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_source: Option<String>,
    pub auto_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Classified failure of a git command, judged from its combined output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Conflict,
    Diverged,
    Other,
}

/// Classify a failed command's output into conflict / divergence / other.
///
/// This is a heuristic over documented phrases, not a structured signal;
/// divergence is checked first because push rejections also contain the
/// word "failed". The executor pins LC_ALL=C so the phrases are stable for
/// a given git version; contract tests below track the vocabulary.
pub(crate) fn classify_git_failure(text: &str) -> FailureKind {
    const DIVERGED: &[&str] = &[
        "rejected",
        "non-fast-forward",
        "diverged",
        "fetch first",
        "behind its remote",
    ];
    const CONFLICT: &[&str] = &[
        "CONFLICT",
        "could not apply",
        "Automatic merge failed",
        "needs merge",
        "unmerged",
        "fix conflicts",
    ];

    if DIVERGED.iter().any(|phrase| text.contains(phrase)) {
        return FailureKind::Diverged;
    }
    if CONFLICT.iter().any(|phrase| text.contains(phrase)) {
        return FailureKind::Conflict;
    }
    FailureKind::Other
}

/// Outcome of the pull step.
enum PullStep {
    /// Nothing to pull (already up to date, or no matching remote ref yet).
    NoOp,
    Pulled { fast_forward: bool, merged: bool },
    Conflicted { files: Vec<String>, message: String },
    Failed { message: String },
}

async fn pull_step(
    cwd: &Path,
    remote: &str,
    branch: &str,
    strategy: SyncStrategy,
) -> Result<PullStep, GitError> {
    let args: [&str; 5] = match strategy {
        SyncStrategy::Merge => ["pull", "--no-rebase", "--no-edit", remote, branch],
        SyncStrategy::Rebase => ["pull", "--rebase", "--no-edit", remote, branch],
    };
    let output = run_git(cwd, &args).await?;
    let text = output.combined();

    if output.success() {
        if text.contains("Already up to date") {
            return Ok(PullStep::NoOp);
        }
        let fast_forward = text.contains("Fast-forward");
        let merged = text.contains("Merge made by");
        return Ok(PullStep::Pulled {
            fast_forward,
            merged,
        });
    }

    // A branch that was never pushed has no remote ref yet; that is a
    // normal first-sync case, not a failure.
    if text.contains("couldn't find remote ref") {
        return Ok(PullStep::NoOp);
    }

    match classify_git_failure(&text) {
        FailureKind::Conflict => Ok(PullStep::Conflicted {
            files: get_conflict_files(cwd).await,
            message: output.message(),
        }),
        _ => Ok(PullStep::Failed {
            message: output.message(),
        }),
    }
}

/// Perform a full pull-then-push cycle for the worktree's current branch.
///
/// Re-running a sync that is already up to date and already pushed is a
/// no-op success (`pulled=false, pushed=false`).
pub async fn perform_sync(cwd: &Path, opts: &SyncOptions) -> Result<SyncResult, GitError> {
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let _guard = lock_worktree(cwd).await;

    // Start: detached HEAD is a structured failure, not a thrown error.
    let Some(branch) = current_branch(cwd).await? else {
        return Ok(SyncResult {
            error: Some("HEAD is detached; checkout a branch before syncing".to_string()),
            ..Default::default()
        });
    };

    let remote = match &opts.remote {
        Some(r) => r.clone(),
        None => tracking_remote(cwd)
            .await
            .unwrap_or_else(|| "origin".to_string()),
    };

    let mut result = SyncResult {
        branch: Some(branch.clone()),
        ..Default::default()
    };

    // Pull
    match pull_step(cwd, &remote, &branch, opts.strategy).await? {
        PullStep::NoOp => {}
        PullStep::Pulled {
            fast_forward,
            merged,
        } => {
            result.pulled = true;
            result.is_fast_forward = fast_forward;
            result.is_merge = merged;
            info!(branch = %branch, remote = %remote, fast_forward, merged, "pulled remote changes");
        }
        PullStep::Conflicted { files, message } => {
            // Terminal: repository stays mid-merge for manual resolution.
            result.has_conflicts = true;
            result.conflict_files = files;
            result.conflict_source = Some("pull".to_string());
            result.message = Some(message);
            return Ok(result);
        }
        PullStep::Failed { message } => {
            result.error = Some(message);
            return Ok(result);
        }
    }

    // Push (only reached when the pull succeeded or was a no-op).
    let push = push_attempt(cwd, &branch, &remote, false, opts.auto_resolve).await?;
    result.pushed = push.pushed;
    result.auto_resolved = push.auto_resolved;

    if push.success {
        result.success = true;
        result.message = push.message;
        return Ok(result);
    }

    if push.has_conflicts {
        result.has_conflicts = true;
        result.conflict_files = push.conflict_files;
        result.conflict_source = Some("push".to_string());
        result.message = push.message;
        return Ok(result);
    }

    if push.diverged {
        result.diverged = true;
        result.conflict_source = Some("push".to_string());
        result.message = push.message;
        result.error = push.error;
        return Ok(result);
    }

    result.error = push.error.or(push.message);
    Ok(result)
}
