//! Engine configuration.
//!
//! Loaded from a JSON file; every field has a default so partial files
//! are fine and a missing file means "all defaults".

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ask before moving items to the trash
    pub confirm_trash: bool,

    /// Ask before permanently deleting items
    pub confirm_delete: bool,

    /// Hold new pausable jobs in the queue while others are running
    pub queue_new_jobs: bool,

    /// How many rows the scheduler starts on its own
    pub max_running_jobs: usize,

    /// Minimum spacing of routine progress updates delivered to the UI
    pub progress_interval_ms: u64,

    /// Jobs running at least this long send a completion notification
    pub completion_notice_after_ms: u64,

    /// Items under these roots are deleted without confirmation instead of trashed
    pub transient_roots: Vec<PathBuf>,

    /// Trash directory used by the local backend
    pub trash_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            confirm_trash: true,
            confirm_delete: true,
            queue_new_jobs: false,
            max_running_jobs: 1,
            progress_interval_ms: 100,
            completion_notice_after_ms: 10_000,
            transient_roots: Vec::new(),
            trash_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file, or return defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        info!("Loading config from {:?}", path);
        let json = fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&json).map_err(|source| EngineError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config.normalized())
    }

    /// Clamp values that would stall the scheduler.
    pub fn normalized(mut self) -> Self {
        if self.max_running_jobs == 0 {
            self.max_running_jobs = 1;
        }
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn completion_notice_after(&self) -> Duration {
        Duration::from_millis(self.completion_notice_after_ms)
    }

    /// True if `path` lies under one of the transient roots.
    pub fn is_transient(&self, path: &Path) -> bool {
        self.transient_roots.iter().any(|root| path.starts_with(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = EngineConfig::load_from(&temp_dir.path().join("none.json"))
            .expect("Missing config should not fail");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("fileops.json");
        fs::write(&path, r#"{ "confirm_trash": false, "max_running_jobs": 0 }"#)
            .expect("Failed to write config");

        let config = EngineConfig::load_from(&path).expect("Failed to load config");
        assert!(!config.confirm_trash);
        assert!(config.confirm_delete);
        assert_eq!(config.max_running_jobs, 1, "zero is clamped to one");
        assert_eq!(config.progress_interval_ms, 100);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("fileops.json");
        fs::write(&path, "{ not json").expect("Failed to write config");

        let result = EngineConfig::load_from(&path);
        assert!(matches!(result, Err(EngineError::ConfigParse { .. })));
    }

    #[test]
    fn test_transient_roots() {
        let config = EngineConfig {
            transient_roots: vec![PathBuf::from("/run/burn")],
            ..EngineConfig::default()
        };
        assert!(config.is_transient(Path::new("/run/burn/disc/a.iso")));
        assert!(!config.is_transient(Path::new("/home/user/a.iso")));
    }
}
