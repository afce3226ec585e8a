//! Sync task configuration and up-front validation.
//!
//! Validation failures here are the only errors that abort an operation
//! before it starts; everything past this point is handled per entry.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source path is empty")]
    EmptySource,
    #[error("target path is empty")]
    EmptyTarget,
    #[error("source and target resolve to the same directory: {0}")]
    SamePath(PathBuf),
    #[error("source directory does not exist: {0}")]
    SourceMissing(PathBuf),
    #[error("source is not a directory: {0}")]
    SourceNotADirectory(PathBuf),
}

/// How a bulk pass decides whether to copy a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Copy only when the file is new or changed; detect conflicts.
    #[default]
    Smart,
    /// Unconditional mirror copy of every file. No conflict detection.
    Force,
}

/// What to do when the target copy of a file changed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Overwrite the target, logging a warning.
    SourceWins,
    /// Keep the target, logging the skip.
    TargetWins,
    /// Keep the target and raise a must-acknowledge error.
    #[default]
    LogAndSkip,
    /// Prompt the user per conflicting file.
    Ask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Last time a sync actually mutated the target tree. The live watcher's
    /// "modified since last sync" conflict check is scoped to this instant.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncConfig {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ignore_patterns: Vec::new(),
            mode: SyncMode::default(),
            conflict_policy: ConflictPolicy::default(),
            last_sync: None,
        }
    }

    /// Checks the invariants every operation relies on. The source must be an
    /// existing directory and must not be the target; the target is created
    /// on demand and may be absent here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.as_os_str().is_empty() {
            return Err(ConfigError::EmptySource);
        }
        if self.target.as_os_str().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if !self.source.exists() {
            return Err(ConfigError::SourceMissing(self.source.clone()));
        }
        if !self.source.is_dir() {
            return Err(ConfigError::SourceNotADirectory(self.source.clone()));
        }
        let source = self
            .source
            .canonicalize()
            .map_err(|_| ConfigError::SourceMissing(self.source.clone()))?;
        // The target usually does not exist yet; fall back to the raw path.
        let target = self.target.canonicalize().unwrap_or_else(|_| self.target.clone());
        if source == target {
            return Err(ConfigError::SamePath(source));
        }
        Ok(())
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        crate::ignore::IgnoreMatcher::new(&config.ignore_patterns)
            .with_context(|| format!("invalid ignore patterns in {}", path.display()))?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: &Path) -> Result<()> {
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_accepts_existing_source() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let config = SyncConfig::new(source.path(), target.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_missing_target() {
        let source = TempDir::new().unwrap();
        let config = SyncConfig::new(source.path(), source.path().join("not-yet-created"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let source = TempDir::new().unwrap();
        assert!(matches!(
            SyncConfig::new("", "/tmp/x").validate(),
            Err(ConfigError::EmptySource)
        ));
        assert!(matches!(
            SyncConfig::new(source.path(), "").validate(),
            Err(ConfigError::EmptyTarget)
        ));
    }

    #[test]
    fn test_validate_rejects_missing_source() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::new(dir.path().join("nope"), dir.path());
        assert!(matches!(config.validate(), Err(ConfigError::SourceMissing(_))));
    }

    #[test]
    fn test_validate_rejects_same_path() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::new(dir.path(), dir.path());
        assert!(matches!(config.validate(), Err(ConfigError::SamePath(_))));
    }

    #[test]
    fn test_validate_rejects_file_source() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        let config = SyncConfig::new(&file, dir.path().join("out"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SourceNotADirectory(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("task.yaml");

        let mut config = SyncConfig::new("/data/source", "/data/target");
        config.ignore_patterns = vec!["**/node_modules".to_string(), "*.tmp".to_string()];
        config.mode = SyncMode::Force;
        config.conflict_policy = ConflictPolicy::TargetWins;
        config.to_yaml_file(&path).unwrap();

        let loaded = SyncConfig::from_yaml_file(&path).unwrap();
        assert_eq!(loaded.source, config.source);
        assert_eq!(loaded.target, config.target);
        assert_eq!(loaded.ignore_patterns, config.ignore_patterns);
        assert_eq!(loaded.mode, SyncMode::Force);
        assert_eq!(loaded.conflict_policy, ConflictPolicy::TargetWins);
    }

    #[test]
    fn test_yaml_load_rejects_bad_patterns_as_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("task.yaml");

        // An over-long pattern made of multi-byte chars must come back as a
        // configuration error, not a panic.
        let mut config = SyncConfig::new("/data/source", "/data/target");
        config.ignore_patterns = vec!["€".repeat(300)];
        config.to_yaml_file(&path).unwrap();
        assert!(SyncConfig::from_yaml_file(&path).is_err());

        config.ignore_patterns = vec!["a[unclosed".to_string()];
        config.to_yaml_file(&path).unwrap();
        assert!(SyncConfig::from_yaml_file(&path).is_err());
    }
}
