//! Git command execution
//!
//! Runs the system git binary with an argument array (never a shell
//! string), a filtered environment, bounded output and a timeout. This is
//! the single process boundary every other git module goes through.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::utils::GitError;

/// Maximum captured bytes per stream (1MB)
pub const MAX_OUTPUT_SIZE: usize = 1_048_576;

/// Default per-command timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Resolved path of the git binary, looked up once.
static GIT_BIN: LazyLock<PathBuf> =
    LazyLock::new(|| which::which("git").unwrap_or_else(|_| PathBuf::from("git")));

/// Environment variables passed through to git. Everything else is
/// dropped so behavior does not depend on the host shell.
const ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "USER", "LANG", "TMPDIR", "GIT_ASKPASS"];
const ENV_ALLOWED_PREFIXES: &[&str] = &["XDG_", "SSH_"];

/// Captured result of a finished git process.
///
/// A non-zero exit is not an executor error; callers inspect the output
/// to classify expected git outcomes (conflict, rejection, ...).
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr concatenated, for textual failure classification.
    pub fn combined(&self) -> String {
        let mut s = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        s.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stderr.is_empty() {
            s.push('\n');
        }
        s.push_str(&self.stderr);
        s
    }

    /// Trimmed stderr, falling back to stdout, for error messages.
    pub fn message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        self.stdout.trim().to_string()
    }
}

/// Per-invocation executor options.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub timeout: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ExecOptions {
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(secs),
        }
    }
}

/// Build the filtered environment for a git invocation.
///
/// LC_ALL=C pins the message vocabulary the failure classifiers match on;
/// GIT_TERMINAL_PROMPT/GIT_EDITOR keep every command non-interactive.
fn build_env() -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = std::env::vars()
        .filter(|(k, _)| {
            ENV_ALLOWLIST.contains(&k.as_str())
                || ENV_ALLOWED_PREFIXES.iter().any(|p| k.starts_with(p))
        })
        .collect();
    env.push(("LC_ALL".to_string(), "C".to_string()));
    env.push(("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()));
    env.push(("GIT_EDITOR".to_string(), "true".to_string()));
    env
}

/// Cap a captured stream at MAX_OUTPUT_SIZE, breaking at a line boundary
/// when possible.
fn cap_output(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_SIZE {
        return text.to_string();
    }
    let mut end = MAX_OUTPUT_SIZE;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let capped = &text[..end];
    match capped.rfind('\n') {
        Some(nl) => capped[..=nl].to_string(),
        None => capped.to_string(),
    }
}

/// Run git with default options.
pub async fn run_git(cwd: &Path, args: &[&str]) -> Result<GitOutput, GitError> {
    run_git_with(cwd, args, &ExecOptions::default()).await
}

/// Run git in `cwd` with the given argument array.
///
/// Returns Ok even when git exits non-zero; spawn failure and timeout are
/// the only executor-level errors. No retry happens at this layer.
pub async fn run_git_with(
    cwd: &Path,
    args: &[&str],
    opts: &ExecOptions,
) -> Result<GitOutput, GitError> {
    debug!(cwd = %cwd.display(), args = ?args, "running git");

    let mut cmd = Command::new(&*GIT_BIN);
    cmd.args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(build_env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(opts.timeout, cmd.output()).await {
        Ok(result) => result.map_err(GitError::Io)?,
        Err(_) => {
            warn!(cwd = %cwd.display(), args = ?args, "git command timed out");
            return Err(GitError::Timeout {
                seconds: opts.timeout.as_secs(),
            });
        }
    };

    let stdout = cap_output(&String::from_utf8_lossy(&output.stdout));
    let stderr = cap_output(&String::from_utf8_lossy(&output.stderr));

    Ok(GitOutput {
        stdout,
        stderr,
        exit_code: output.status.code(),
    })
}

/// Run git and map a non-zero exit to `GitError::CommandFailed` carrying
/// the trimmed stderr (falling back to stdout).
pub async fn run_git_checked(cwd: &Path, args: &[&str]) -> Result<GitOutput, GitError> {
    let output = run_git(cwd, args).await?;
    if output.success() {
        Ok(output)
    } else {
        let msg = output.message();
        Err(GitError::CommandFailed(if msg.is_empty() {
            format!("git {} failed", args.first().unwrap_or(&""))
        } else {
            msg
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_output_short() {
        assert_eq!(cap_output("hello"), "hello");
    }

    #[test]
    fn test_cap_output_breaks_at_newline() {
        let mut text = "a".repeat(MAX_OUTPUT_SIZE - 10);
        text.push('\n');
        text.push_str(&"b".repeat(100));
        let capped = cap_output(&text);
        assert!(capped.len() <= MAX_OUTPUT_SIZE);
        assert!(capped.ends_with('\n'));
    }

    #[test]
    fn test_build_env_pins_locale() {
        let env = build_env();
        assert!(env.iter().any(|(k, v)| k == "LC_ALL" && v == "C"));
        assert!(env.iter().any(|(k, v)| k == "GIT_TERMINAL_PROMPT" && v == "0"));
        // Nothing outside the allowlist leaks through.
        assert!(!env.iter().any(|(k, _)| k == "CARGO_MANIFEST_DIR"));
    }

    #[tokio::test]
    async fn test_run_git_version() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_git(dir.path(), &["--version"]).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("git version"));
    }

    #[tokio::test]
    async fn test_run_git_with_custom_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ExecOptions::with_timeout_secs(5);
        let out = run_git_with(dir.path(), &["--version"], &opts).await.unwrap();
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_run_git_checked_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_git_checked(dir.path(), &["rev-parse", "HEAD"])
            .await
            .unwrap_err();
        match err {
            GitError::CommandFailed(msg) => assert!(!msg.is_empty()),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }
}
