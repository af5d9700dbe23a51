//! Project configuration parsing (.treeline.toml)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::git::SyncStrategy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// Project configuration from .treeline.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub worktree: WorktreeSection,
    #[serde(default)]
    pub exec: ExecSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncSection {
    #[serde(default)]
    pub strategy: SyncStrategy,
    #[serde(default)]
    pub auto_resolve: bool,
    /// Remote to sync and push against; falls back to the tracking remote.
    pub remote: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorktreeSection {
    /// Untracked files copied into each new worktree (.env files and such).
    #[serde(default)]
    pub copy_files: Vec<String>,
    /// Directory new worktrees are created under, relative to the repo.
    pub base_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExecSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

impl ExecSection {
    /// Executor options derived from this section.
    pub fn options(&self) -> crate::git::ExecOptions {
        crate::git::ExecOptions::with_timeout_secs(self.timeout_secs)
    }
}

impl ProjectConfig {
    /// Load config from a project directory
    pub fn load(project_path: &Path) -> Result<Self, ConfigError> {
        let config_path = project_path.join(".treeline.toml");
        if !config_path.exists() {
            // Return default config if no config file
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProjectConfig::default();
        assert_eq!(config.sync.strategy, SyncStrategy::Merge);
        assert!(!config.sync.auto_resolve);
        assert_eq!(config.exec.timeout_secs, 60);
        assert!(config.worktree.copy_files.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[sync]
strategy = "rebase"
auto_resolve = true
remote = "upstream"

[worktree]
copy_files = [".env", ".env.local", "config/local"]

[exec]
timeout_secs = 120
"#;
        let config: ProjectConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sync.strategy, SyncStrategy::Rebase);
        assert!(config.sync.auto_resolve);
        assert_eq!(config.sync.remote.as_deref(), Some("upstream"));
        assert_eq!(config.worktree.copy_files.len(), 3);
        assert_eq!(config.exec.timeout_secs, 120);
    }

    #[test]
    fn test_exec_section_to_options() {
        let section = ExecSection { timeout_secs: 5 };
        assert_eq!(section.options().timeout.as_secs(), 5);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.exec.timeout_secs, 60);
    }

    #[test]
    fn test_load_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".treeline.toml"), "[sync\nbroken").unwrap();
        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
