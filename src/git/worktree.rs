//! Worktree lifecycle and project-file provisioning
//!
//! Creating a worktree gives an agent an isolated checkout; provisioning
//! copies the untracked project files (env files, local configs) a fresh
//! checkout lacks. Copying is best-effort per file and both endpoints of
//! every transfer are validated against their roots.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::exec::run_git;
use super::lock::lock_worktree;
use super::utils::{get_git_repo_root, validate_path, GitError};

/// Structured outcome of adding or removing a worktree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorktreeOpResult {
    pub success: bool,
    /// The destination already existed (add) or never existed (remove).
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-file report of a provisioning copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyResult {
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

/// Structured outcome of a move within a root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveResult {
    pub success: bool,
    /// False for the self-move no-op.
    pub moved: bool,
    /// The destination already exists.
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create a worktree at `path` checked out to `branch` (`-b` when the
/// branch does not exist yet is the caller's concern; an existing branch
/// is checked out as-is).
pub async fn add_worktree(
    repo_root: &Path,
    path: &Path,
    branch: &str,
) -> Result<WorktreeOpResult, GitError> {
    if branch.trim().is_empty() {
        return Err(GitError::InvalidInput("branch name is empty".to_string()));
    }
    if get_git_repo_root(repo_root).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let _guard = lock_worktree(repo_root).await;

    if path.exists() {
        return Ok(WorktreeOpResult {
            exists: true,
            path: Some(path.display().to_string()),
            error: Some(format!("Destination already exists: {}", path.display())),
            ..Default::default()
        });
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let path_str = path.display().to_string();
    let output = run_git(repo_root, &["worktree", "add", &path_str, branch]).await?;
    if !output.success() {
        return Ok(WorktreeOpResult {
            path: Some(path_str),
            error: Some(output.message()),
            ..Default::default()
        });
    }

    info!(path = %path.display(), branch, "created worktree");
    Ok(WorktreeOpResult {
        success: true,
        path: Some(path_str),
        message: Some(format!("Created worktree for '{}'", branch)),
        ..Default::default()
    })
}

/// Remove a worktree. Falls back to deleting the directory when git
/// refuses (stale or corrupted worktree metadata), then prunes.
pub async fn remove_worktree(
    repo_root: &Path,
    path: &Path,
    force: bool,
) -> Result<WorktreeOpResult, GitError> {
    if get_git_repo_root(repo_root).await.is_none() {
        return Err(GitError::NotAGitRepo);
    }

    let _guard = lock_worktree(repo_root).await;

    let path_str = path.display().to_string();
    let mut args: Vec<&str> = vec!["worktree", "remove"];
    if force {
        args.push("--force");
    }
    args.push(&path_str);

    let output = run_git(repo_root, &args).await?;
    if !output.success() {
        if !force {
            return Ok(WorktreeOpResult {
                exists: path.exists(),
                path: Some(path_str),
                error: Some(output.message()),
                ..Default::default()
            });
        }
        warn!(message = %output.message(), "worktree remove failed, deleting directory");
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
    }

    let prune = run_git(repo_root, &["worktree", "prune"]).await?;
    if !prune.success() {
        warn!(message = %prune.message(), "worktree prune failed");
    }

    info!(path = %path.display(), "removed worktree");
    Ok(WorktreeOpResult {
        success: true,
        path: Some(path_str),
        message: Some("Removed worktree".to_string()),
        ..Default::default()
    })
}

fn copy_one_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    Ok(())
}

/// Copy the listed project files (or directories, recursively) from the
/// source root into a worktree. Missing sources are skipped; individual
/// copy failures are recorded and do not stop the rest.
pub async fn copy_project_files(
    source_root: &Path,
    worktree_path: &Path,
    files: &[String],
) -> Result<CopyResult, GitError> {
    let mut result = CopyResult::default();

    for rel in files {
        let src = match validate_path(source_root, rel) {
            Ok(p) => p,
            Err(e) => {
                result.errors.push(format!("{}: {}", rel, e));
                continue;
            }
        };
        let dst = match validate_path(worktree_path, rel) {
            Ok(p) => p,
            Err(e) => {
                result.errors.push(format!("{}: {}", rel, e));
                continue;
            }
        };

        if !src.exists() {
            result.skipped.push(rel.clone());
            continue;
        }

        if src.is_dir() {
            for entry in WalkDir::new(&src).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(suffix) = entry.path().strip_prefix(&src) else {
                    continue;
                };
                let target = dst.join(suffix);
                let shown = entry
                    .path()
                    .strip_prefix(source_root)
                    .unwrap_or(entry.path())
                    .display()
                    .to_string();
                match copy_one_file(entry.path(), &target) {
                    Ok(()) => result.copied.push(shown),
                    Err(e) => {
                        warn!(file = %shown, error = %e, "copy failed");
                        result.errors.push(format!("{}: {}", shown, e));
                    }
                }
            }
        } else {
            match copy_one_file(&src, &dst) {
                Ok(()) => result.copied.push(rel.clone()),
                Err(e) => {
                    warn!(file = %rel, error = %e, "copy failed");
                    result.errors.push(format!("{}: {}", rel, e));
                }
            }
        }
    }

    info!(
        copied = result.copied.len(),
        skipped = result.skipped.len(),
        errors = result.errors.len(),
        "provisioned project files"
    );
    Ok(result)
}

/// Move a file or directory within a root. Moving a path onto itself is a
/// successful no-op; an occupied destination is reported, never replaced.
pub async fn move_path(root: &Path, from: &str, to: &str) -> Result<MoveResult, GitError> {
    let src = validate_path(root, from)?;
    let dst = validate_path(root, to)?;

    let same = match (src.canonicalize(), dst.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => src == dst,
    };
    if same {
        return Ok(MoveResult {
            success: true,
            ..Default::default()
        });
    }

    if !src.exists() {
        return Ok(MoveResult {
            error: Some(format!("Source does not exist: {}", from)),
            ..Default::default()
        });
    }
    if dst.exists() {
        return Ok(MoveResult {
            exists: true,
            error: Some(format!("Destination already exists: {}", to)),
            ..Default::default()
        });
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&src, &dst)?;

    Ok(MoveResult {
        success: true,
        moved: true,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_skips_missing_and_copies_present() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join(".env"), "KEY=1").unwrap();

        let files = vec![".env".to_string(), ".env.local".to_string()];
        let result = copy_project_files(src.path(), dst.path(), &files)
            .await
            .unwrap();

        assert_eq!(result.copied, vec![".env"]);
        assert_eq!(result.skipped, vec![".env.local"]);
        assert!(result.errors.is_empty());
        assert_eq!(fs::read_to_string(dst.path().join(".env")).unwrap(), "KEY=1");
    }

    #[tokio::test]
    async fn test_copy_directory_recurses() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("config/sub")).unwrap();
        fs::write(src.path().join("config/a.toml"), "a").unwrap();
        fs::write(src.path().join("config/sub/b.toml"), "b").unwrap();

        let result = copy_project_files(src.path(), dst.path(), &["config".to_string()])
            .await
            .unwrap();

        assert_eq!(result.copied.len(), 2);
        assert!(dst.path().join("config/a.toml").is_file());
        assert!(dst.path().join("config/sub/b.toml").is_file());
    }

    #[tokio::test]
    async fn test_copy_rejects_escaping_paths() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        let files = vec!["../outside".to_string(), "/etc/passwd".to_string()];
        let result = copy_project_files(src.path(), dst.path(), &files)
            .await
            .unwrap();

        assert!(result.copied.is_empty());
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_move_self_is_noop() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "x").unwrap();

        let result = move_path(root.path(), "a.txt", "a.txt").await.unwrap();
        assert!(result.success && !result.moved);
        assert!(root.path().join("a.txt").is_file());
    }

    #[tokio::test]
    async fn test_move_refuses_occupied_destination() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "a").unwrap();
        fs::write(root.path().join("b.txt"), "b").unwrap();

        let result = move_path(root.path(), "a.txt", "b.txt").await.unwrap();
        assert!(!result.success && result.exists);
        assert_eq!(fs::read_to_string(root.path().join("b.txt")).unwrap(), "b");
    }

    #[tokio::test]
    async fn test_move_renames() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "x").unwrap();

        let result = move_path(root.path(), "a.txt", "dir/b.txt").await.unwrap();
        assert!(result.success && result.moved);
        assert!(!root.path().join("a.txt").exists());
        assert_eq!(
            fs::read_to_string(root.path().join("dir/b.txt")).unwrap(),
            "x"
        );
    }
}
