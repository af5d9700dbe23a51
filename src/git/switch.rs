//! Switch-branch service
//!
//! Safely switches the working branch: local changes to tracked files are
//! stashed (untracked-only changes survive a checkout on their own), the
//! stash is reapplied after checkout, and a conflicted reapply keeps the
//! stash entry so no work is ever lost. The stash is addressed by its
//! commit hash, captured at creation; ordinals shift whenever the stash
//! list mutates, so they are only resolved at the moment of the drop.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::branches::{local_branch_exists, remotes_with_branch};
use super::exec::run_git;
use super::lock::lock_worktree;
use super::status::{git_status, has_tracked_changes};
use super::utils::{current_branch, get_conflict_files, get_git_repo_root, GitError};

/// Stash message tag so our entries are recognizable in `stash list`.
const STASH_TAG: &str = "treeline-switch";

/// Structured outcome of a branch switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchBranchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub stashed_changes: bool,
    pub reapplied: bool,
    pub has_conflicts: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub conflict_files: Vec<String>,
    /// Commit hash of a retained stash entry (set only on conflicted reapply).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Find the ordinal (`stash@{N}`) currently holding the given stash commit.
async fn find_stash_ordinal(cwd: &Path, hash: &str) -> Option<String> {
    let output = run_git(cwd, &["stash", "list", "--format=%H %gd"]).await.ok()?;
    if !output.success() {
        return None;
    }
    output.stdout.lines().find_map(|line| {
        let (h, ordinal) = line.split_once(' ')?;
        if h == hash {
            Some(ordinal.trim().to_string())
        } else {
            None
        }
    })
}

/// Drop the stash entry holding `hash`. The ordinal is resolved from the
/// hash at the last moment, right before the drop.
async fn drop_stash_entry(cwd: &Path, hash: &str) -> Result<(), GitError> {
    match find_stash_ordinal(cwd, hash).await {
        Some(ordinal) => {
            let drop = run_git(cwd, &["stash", "drop", &ordinal]).await?;
            if !drop.success() {
                warn!(ordinal = %ordinal, message = %drop.message(), "could not drop stash entry");
            }
        }
        None => warn!(hash = %hash, "stash entry not found in stash list"),
    }
    Ok(())
}

/// Switch the worktree to `target`, preserving uncommitted work.
pub async fn switch_branch(cwd: &Path, target: &str) -> Result<SwitchBranchResult, GitError> {
    if target.trim().is_empty() {
        return Err(GitError::InvalidInput("branch name is empty".to_string()));
    }
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let _guard = lock_worktree(cwd).await;

    let previous = current_branch(cwd).await?;
    if previous.as_deref() == Some(target) {
        return Ok(SwitchBranchResult {
            success: true,
            previous_branch: previous.clone(),
            branch: previous,
            message: Some(format!("Already on '{}'", target)),
            ..Default::default()
        });
    }

    // Resolve the target: local branch, or a remote-tracking ref to base a
    // new local tracking branch on.
    let track_remote = if local_branch_exists(cwd, target).await {
        None
    } else {
        let remotes = remotes_with_branch(cwd, target).await?;
        match remotes.into_iter().next() {
            Some(remote) => Some(remote),
            None => {
                return Ok(SwitchBranchResult {
                    previous_branch: previous,
                    branch: Some(target.to_string()),
                    error: Some(format!(
                        "Branch '{}' not found locally or on any remote",
                        target
                    )),
                    ..Default::default()
                });
            }
        }
    };

    // Stash when any tracked file changed; untracked files ride along so
    // tracked and untracked work moves together.
    let entries = git_status(cwd).await?;
    let mut stash_hash: Option<String> = None;
    if has_tracked_changes(&entries) {
        let from = previous.as_deref().unwrap_or("detached");
        let tag = format!(
            "{}: {} -> {} at {}",
            STASH_TAG,
            from,
            target,
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        );
        let stash = run_git(cwd, &["stash", "push", "--include-untracked", "-m", &tag]).await?;
        if !stash.success() {
            return Ok(SwitchBranchResult {
                previous_branch: previous,
                branch: Some(target.to_string()),
                error: Some(format!("Failed to stash local changes: {}", stash.message())),
                ..Default::default()
            });
        }
        let sha = run_git(cwd, &["rev-parse", "refs/stash"]).await?;
        if sha.success() {
            stash_hash = Some(sha.stdout.trim().to_string());
        }
        info!(tag = %tag, "stashed local changes before switch");
    }

    // Checkout
    let checkout = match &track_remote {
        None => run_git(cwd, &["checkout", target]).await?,
        Some(remote) => {
            let upstream = format!("{}/{}", remote, target);
            run_git(cwd, &["checkout", "-b", target, "--track", &upstream]).await?
        }
    };
    if !checkout.success() {
        // Put the stashed work back before reporting the failure,
        // addressing the entry by its captured hash.
        if let Some(hash) = &stash_hash {
            let apply = run_git(cwd, &["stash", "apply", hash]).await?;
            if apply.success() {
                drop_stash_entry(cwd, hash).await?;
            } else {
                warn!(hash = %hash, message = %apply.message(), "could not restore stash after failed checkout");
            }
        }
        return Ok(SwitchBranchResult {
            previous_branch: previous,
            branch: Some(target.to_string()),
            error: Some(format!("Checkout failed: {}", checkout.message())),
            ..Default::default()
        });
    }

    // Reapply stashed changes.
    if let Some(hash) = &stash_hash {
        let apply = run_git(cwd, &["stash", "apply", hash]).await?;
        if apply.success() {
            drop_stash_entry(cwd, hash).await?;
            return Ok(SwitchBranchResult {
                success: true,
                previous_branch: previous,
                branch: Some(target.to_string()),
                stashed_changes: true,
                reapplied: true,
                message: Some(format!("Switched to '{}' and reapplied local changes", target)),
                ..Default::default()
            });
        }

        // Conflicted reapply: the stash entry is preserved so nothing is
        // lost; the caller resolves manually.
        let conflict_files = get_conflict_files(cwd).await;
        return Ok(SwitchBranchResult {
            previous_branch: previous,
            branch: Some(target.to_string()),
            stashed_changes: true,
            has_conflicts: true,
            conflict_files,
            stash_ref: stash_hash.clone(),
            message: Some(format!(
                "Switched to '{}' but reapplying local changes hit conflicts; the stash entry was kept",
                target
            )),
            ..Default::default()
        });
    }

    Ok(SwitchBranchResult {
        success: true,
        previous_branch: previous,
        branch: Some(target.to_string()),
        message: Some(format!("Switched to '{}'", target)),
        ..Default::default()
    })
}
