//! Push service
//!
//! Pushes the current branch to a remote, classifying rejections into
//! divergence vs. conflict and optionally auto-resolving divergence with
//! a local merge before a single retry.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::exec::run_git;
use super::lock::lock_worktree;
use super::sync::{classify_git_failure, FailureKind};
use super::utils::{current_branch, get_conflict_files, get_git_repo_root, GitError};
use super::branches::tracking_remote;

/// Options for a push operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushOptions {
    /// Remote to push to; defaults to the tracking remote, then "origin".
    pub remote: Option<String>,
    /// Bypass divergence handling entirely.
    pub force: bool,
    /// On divergence, merge the remote branch locally and retry once.
    pub auto_resolve: bool,
}

/// Structured outcome of a push operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub pushed: bool,
    pub diverged: bool,
    pub has_conflicts: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub conflict_files: Vec<String>,
    pub auto_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extract the "Create a pull request" URL hint some remotes print on the
/// first push of a branch. Feeds the external PR-metadata flow.
pub(crate) fn parse_pr_hint(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .filter(|line| line.trim_start().starts_with("remote:"))
        .flat_map(|line| line.split_whitespace())
        .find(|token| token.starts_with("https://") && token.contains("/pull/"))
        .map(|token| token.to_string())
}

/// Push the current branch.
pub async fn perform_push(cwd: &Path, opts: &PushOptions) -> Result<PushResult, GitError> {
    if opts.force && opts.auto_resolve {
        return Err(GitError::InvalidInput(
            "force and auto_resolve cannot be combined".to_string(),
        ));
    }
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let _guard = lock_worktree(cwd).await;

    let Some(branch) = current_branch(cwd).await? else {
        return Ok(PushResult {
            error: Some("HEAD is detached; checkout a branch before pushing".to_string()),
            ..Default::default()
        });
    };

    let remote = match &opts.remote {
        Some(r) => r.clone(),
        None => tracking_remote(cwd)
            .await
            .unwrap_or_else(|| "origin".to_string()),
    };

    push_attempt(cwd, &branch, &remote, opts.force, opts.auto_resolve).await
}

/// Push `branch` to `remote`. Assumes the worktree lock is already held.
pub(crate) async fn push_attempt(
    cwd: &Path,
    branch: &str,
    remote: &str,
    force: bool,
    auto_resolve: bool,
) -> Result<PushResult, GitError> {
    let has_upstream = tracking_remote(cwd).await.is_some();

    let output = run_push(cwd, branch, remote, force, has_upstream).await?;
    if output.success() {
        let pushed = !output.combined().contains("Everything up-to-date");
        if pushed {
            info!(branch, remote, "pushed branch");
        }
        return Ok(PushResult {
            success: true,
            branch: Some(branch.to_string()),
            pushed,
            pr_url: parse_pr_hint(&output.stderr),
            message: Some(if pushed {
                format!("Pushed {} to {}", branch, remote)
            } else {
                "Everything up to date".to_string()
            }),
            ..Default::default()
        });
    }

    match classify_git_failure(&output.combined()) {
        FailureKind::Diverged if auto_resolve => {
            // Remote is ahead: merge it locally, then retry once.
            let pull = run_git(cwd, &["pull", "--no-rebase", "--no-edit", remote, branch]).await?;
            if !pull.success() {
                if classify_git_failure(&pull.combined()) == FailureKind::Conflict {
                    let conflict_files = get_conflict_files(cwd).await;
                    // Never leave the worktree half-merged on our account.
                    let _ = run_git(cwd, &["merge", "--abort"]).await;
                    return Ok(PushResult {
                        branch: Some(branch.to_string()),
                        diverged: true,
                        has_conflicts: true,
                        conflict_files,
                        message: Some(
                            "Auto-resolve merge conflicted; aborted and restored the worktree"
                                .to_string(),
                        ),
                        ..Default::default()
                    });
                }
                return Ok(PushResult {
                    branch: Some(branch.to_string()),
                    diverged: true,
                    error: Some(pull.message()),
                    ..Default::default()
                });
            }

            let retry = run_push(cwd, branch, remote, false, has_upstream).await?;
            if retry.success() {
                info!(branch, remote, "pushed after auto-resolve merge");
                return Ok(PushResult {
                    success: true,
                    branch: Some(branch.to_string()),
                    pushed: true,
                    auto_resolved: true,
                    pr_url: parse_pr_hint(&retry.stderr),
                    message: Some(format!(
                        "Merged {}/{} and pushed {}",
                        remote, branch, branch
                    )),
                    ..Default::default()
                });
            }
            Ok(PushResult {
                branch: Some(branch.to_string()),
                diverged: true,
                error: Some(retry.message()),
                ..Default::default()
            })
        }
        FailureKind::Diverged => Ok(PushResult {
            branch: Some(branch.to_string()),
            diverged: true,
            message: Some(format!(
                "Push rejected: {} has commits {} lacks. Pull first or enable auto_resolve.",
                remote, branch
            )),
            ..Default::default()
        }),
        FailureKind::Conflict => Ok(PushResult {
            branch: Some(branch.to_string()),
            has_conflicts: true,
            conflict_files: get_conflict_files(cwd).await,
            message: Some(output.message()),
            ..Default::default()
        }),
        FailureKind::Other => Ok(PushResult {
            branch: Some(branch.to_string()),
            error: Some(output.message()),
            ..Default::default()
        }),
    }
}

async fn run_push(
    cwd: &Path,
    branch: &str,
    remote: &str,
    force: bool,
    has_upstream: bool,
) -> Result<super::exec::GitOutput, GitError> {
    let mut args: Vec<&str> = vec!["push"];
    if force {
        args.push("--force");
    }
    if !has_upstream {
        args.push("-u");
    }
    args.push(remote);
    args.push(branch);
    run_git(cwd, &args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pr_hint_github_style() {
        let stderr = "\
remote:
remote: Create a pull request for 'feature/x' on GitHub by visiting:
remote:      https://github.com/acme/widgets/pull/new/feature/x
remote:
To github.com:acme/widgets.git";
        assert_eq!(
            parse_pr_hint(stderr).as_deref(),
            Some("https://github.com/acme/widgets/pull/new/feature/x")
        );
    }

    #[test]
    fn test_parse_pr_hint_absent() {
        assert_eq!(parse_pr_hint("To github.com:acme/widgets.git"), None);
        assert_eq!(parse_pr_hint(""), None);
    }

    #[tokio::test]
    async fn test_force_with_auto_resolve_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PushOptions {
            force: true,
            auto_resolve: true,
            ..Default::default()
        };
        let err = perform_push(dir.path(), &opts).await.unwrap_err();
        assert!(matches!(err, GitError::InvalidInput(_)));
    }
}
