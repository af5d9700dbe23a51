//! Git status parsing and queries
//!
//! Parses `git status --porcelain` v1 output into structured per-file
//! status, including merge/conflict classification. Status is derived
//! fresh on every query and never cached: a stale entry would corrupt
//! stage/unstage and conflict decisions downstream.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::exec::run_git;
use super::utils::{get_git_repo_root, GitError};

/// Structured status for a single file (porcelain v1: X=index, Y=worktree).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub index_status: char,
    pub work_tree_status: char,
    pub status_text: String,
    pub is_merge_affected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_type: Option<String>,
}

/// Human-readable text for a single status character.
fn status_char_text(c: char) -> &'static str {
    match c {
        'M' => "modified",
        'A' => "added",
        'D' => "deleted",
        'R' => "renamed",
        'C' => "copied",
        'T' => "type changed",
        'U' => "unmerged",
        _ => "",
    }
}

/// Both-sides classification for unmerged entries.
fn merge_type(x: char, y: char) -> Option<String> {
    let t = match (x, y) {
        ('U', 'U') => "both_modified",
        ('A', 'A') => "added_by_both",
        ('D', 'D') => "deleted_by_both",
        ('A', 'U') => "added_by_us",
        ('U', 'A') => "added_by_them",
        ('D', 'U') => "deleted_by_us",
        ('U', 'D') => "deleted_by_them",
        _ => return None,
    };
    Some(t.to_string())
}

/// A file is merge-affected when either side is unmerged, or when both
/// sides simultaneously added or simultaneously deleted it (both-sides
/// changes during an active merge).
fn is_merge_affected(x: char, y: char) -> bool {
    x == 'U' || y == 'U' || (x == 'A' && y == 'A') || (x == 'D' && y == 'D')
}

/// Combined status text: untracked/ignored pairs first, otherwise the
/// staged text, falling back to the worktree text, with both qualified
/// when present and different.
fn status_text(x: char, y: char) -> String {
    if x == '?' && y == '?' {
        return "untracked".to_string();
    }
    if x == '!' && y == '!' {
        return "ignored".to_string();
    }
    let staged = status_char_text(x);
    let unstaged = status_char_text(y);
    match (staged.is_empty(), unstaged.is_empty()) {
        (false, false) if staged != unstaged => {
            format!("{} (staged), {} (unstaged)", staged, unstaged)
        }
        (false, _) => staged.to_string(),
        (true, false) => unstaged.to_string(),
        (true, true) => String::new(),
    }
}

/// Parse `git status --porcelain` v1 line output.
///
/// Fixed-column format: XY, a space, then the path. The rename form
/// `old -> new` keeps only the new path. Lines shorter than the path
/// offset are tolerated as empty paths rather than rejected.
pub fn parse_porcelain_status(output: &str) -> Vec<FileStatus> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut chars = line.chars();
            let x = chars.next().unwrap_or(' ');
            let y = chars.next().unwrap_or(' ');
            // Byte offset 3 may fall inside a multibyte character on a
            // malformed line; such lines degrade to an empty path.
            let raw_path = line.get(3..).unwrap_or("");
            // Rename form: "old -> new" keeps the new path.
            let path = match raw_path.split_once(" -> ") {
                Some((_, new_path)) => new_path.to_string(),
                None => raw_path.to_string(),
            };
            FileStatus {
                path,
                index_status: x,
                work_tree_status: y,
                status_text: status_text(x, y),
                is_merge_affected: is_merge_affected(x, y),
                merge_type: merge_type(x, y),
            }
        })
        .collect()
}

/// Get the full working-tree status for a worktree.
pub async fn git_status(cwd: &Path) -> Result<Vec<FileStatus>, GitError> {
    if get_git_repo_root(cwd).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let output = run_git(cwd, &["status", "--porcelain"]).await?;
    if !output.success() {
        return Err(GitError::CommandFailed(output.message()));
    }

    Ok(parse_porcelain_status(&output.stdout))
}

/// True when the worktree has any change to a tracked file (untracked-only
/// changes do not count; they survive a checkout harmlessly).
pub fn has_tracked_changes(entries: &[FileStatus]) -> bool {
    entries.iter().any(|e| {
        !(e.index_status == '?' && e.work_tree_status == '?')
            && !(e.index_status == '!' && e.work_tree_status == '!')
    })
}
