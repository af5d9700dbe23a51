//! Branch and remote inventory
//!
//! Read-only queries: local branches with tracking/ahead/behind info,
//! remotes with the branches they hold, and existence helpers used by the
//! mutating services.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::exec::{run_git, run_git_checked};
use super::utils::{get_git_repo_root, GitError};

/// A local branch with its tracking relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchEntry {
    pub name: String,
    pub full_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
}

/// A branch as known on a remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBranch {
    pub name: String,
    pub full_ref: String,
}

/// A configured remote and the branches it holds locally-known refs for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub name: String,
    pub url: String,
    pub branches: Vec<RemoteBranch>,
}

/// Parse `%(upstream:track)` output: "[ahead 1, behind 2]", "[ahead 1]",
/// "[behind 2]", "[gone]" or empty.
fn parse_track(track: &str) -> (u32, u32) {
    let inner = track.trim().trim_start_matches('[').trim_end_matches(']');
    let mut ahead = 0;
    let mut behind = 0;
    for part in inner.split(',') {
        let part = part.trim();
        if let Some(n) = part.strip_prefix("ahead ") {
            ahead = n.parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            behind = n.parse().unwrap_or(0);
        }
    }
    (ahead, behind)
}

/// List local branches with upstream and ahead/behind counts.
pub async fn list_branches(cwd: &Path) -> Result<Vec<BranchEntry>, GitError> {
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let output = run_git_checked(
        cwd,
        &[
            "for-each-ref",
            "refs/heads",
            "--format=%(refname:short)%00%(refname)%00%(upstream:short)%00%(upstream:track)",
        ],
    )
    .await?;

    let mut branches = Vec::new();
    for line in output.stdout.lines() {
        let fields: Vec<&str> = line.split('\x00').collect();
        if fields.len() < 4 || fields[0].is_empty() {
            continue;
        }
        let (ahead, behind) = parse_track(fields[3]);
        branches.push(BranchEntry {
            name: fields[0].to_string(),
            full_ref: fields[1].to_string(),
            upstream: if fields[2].is_empty() {
                None
            } else {
                Some(fields[2].to_string())
            },
            ahead,
            behind,
        });
    }

    Ok(branches)
}

/// List configured remotes with their locally-known branches.
pub async fn list_remotes(cwd: &Path) -> Result<Vec<RemoteInfo>, GitError> {
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let output = run_git_checked(cwd, &["remote", "-v"]).await?;

    // "name\turl (fetch)" / "name\turl (push)", keep the fetch entry.
    let mut remotes: Vec<(String, String)> = Vec::new();
    for line in output.stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        if line.ends_with("(push)") && remotes.iter().any(|(n, _)| n == name) {
            continue;
        }
        if !remotes.iter().any(|(n, _)| n == name) {
            remotes.push((name.to_string(), url.to_string()));
        }
    }

    let mut result = Vec::new();
    for (name, url) in remotes {
        let branches = remote_branches(cwd, &name).await;
        result.push(RemoteInfo {
            name,
            url,
            branches,
        });
    }

    Ok(result)
}

/// Branches a remote holds, per the local remote-tracking refs.
/// Best-effort: a failure degrades to an empty list.
async fn remote_branches(cwd: &Path, remote: &str) -> Vec<RemoteBranch> {
    let prefix = format!("refs/remotes/{}", remote);
    let output = match run_git(
        cwd,
        &[
            "for-each-ref",
            &prefix,
            "--format=%(refname:short)%00%(refname)",
        ],
    )
    .await
    {
        Ok(out) if out.success() => out,
        _ => return vec![],
    };

    output
        .stdout
        .lines()
        .filter_map(|line| {
            let (short, full) = line.split_once('\x00')?;
            let name = short.strip_prefix(&format!("{}/", remote))?;
            if name == "HEAD" {
                return None;
            }
            Some(RemoteBranch {
                name: name.to_string(),
                full_ref: full.to_string(),
            })
        })
        .collect()
}

/// Which remotes already hold the given branch name.
pub async fn remotes_with_branch(cwd: &Path, branch: &str) -> Result<Vec<String>, GitError> {
    let remotes = list_remotes(cwd).await?;
    Ok(remotes
        .into_iter()
        .filter(|r| r.branches.iter().any(|b| b.name == branch))
        .map(|r| r.name)
        .collect())
}

/// Check a local branch ref exists.
pub async fn local_branch_exists(cwd: &Path, branch: &str) -> bool {
    let refname = format!("refs/heads/{}", branch);
    match run_git(cwd, &["show-ref", "--verify", "--quiet", &refname]).await {
        Ok(out) => out.success(),
        Err(_) => false,
    }
}

/// Check a remote-tracking ref exists for the branch on the given remote.
pub async fn remote_branch_exists(cwd: &Path, remote: &str, branch: &str) -> bool {
    let refname = format!("refs/remotes/{}/{}", remote, branch);
    match run_git(cwd, &["show-ref", "--verify", "--quiet", &refname]).await {
        Ok(out) => out.success(),
        Err(_) => false,
    }
}

/// Remote the current branch tracks, if any.
pub async fn tracking_remote(cwd: &Path) -> Option<String> {
    let output = run_git(
        cwd,
        &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{upstream}"],
    )
    .await
    .ok()?;
    if !output.success() {
        return None;
    }
    let upstream = output.stdout.trim();
    upstream.split_once('/').map(|(remote, _)| remote.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_full() {
        assert_eq!(parse_track("[ahead 3, behind 2]"), (3, 2));
    }

    #[test]
    fn test_parse_track_partial() {
        assert_eq!(parse_track("[ahead 1]"), (1, 0));
        assert_eq!(parse_track("[behind 4]"), (0, 4));
    }

    #[test]
    fn test_parse_track_empty_and_gone() {
        assert_eq!(parse_track(""), (0, 0));
        assert_eq!(parse_track("[gone]"), (0, 0));
    }
}
