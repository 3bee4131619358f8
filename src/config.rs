//! # Configuration Module
//!
//! This module handles configuration management and data directory setup for Segue.
//! It provides platform-appropriate data storage locations and the tunable
//! parameters of the player.
//!
//! ## Data Storage
//!
//! Segue stores its files in the platform-standard data directory:
//! - Linux: `~/.local/share/segue/`
//! - macOS: `~/Library/Application Support/segue/`
//! - Windows: `%APPDATA%\segue\`
//!
//! Two files live there: `config.json` (optional, player tuning) and
//! `state.db` (the persisted playback snapshot).

use crate::history::DEFAULT_HISTORY_SIZE;
use crate::selector::SelectionPolicy;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the platform-appropriate data directory for Segue, creating it
/// when missing.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The segue subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let segue_dir = data_dir.join("segue");
    fs::create_dir_all(&segue_dir).with_context(|| {
        format!(
            "Failed to create Segue data directory at {}. Please check file permissions.",
            segue_dir.display()
        )
    })?;

    Ok(segue_dir)
}

/// Path of the optional JSON configuration file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.json"))
}

/// Path of the SQLite file holding the persisted playback snapshot.
pub fn get_state_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("state.db"))
}

/// Tunable parameters of the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Number of recently played items remembered
    pub history_size: usize,
    /// Scoring blend used to pick the next item
    #[serde(flatten)]
    pub policy: SelectionPolicy,
    /// Seconds moved by a relative seek (arrow keys)
    pub seek_step: f64,
    /// Prefix applied to catalog source attributes
    pub storage_root: String,
    /// Fixed random seed, for reproducible selection
    pub seed: Option<u64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            policy: SelectionPolicy::default(),
            seek_step: 5.0,
            storage_root: "storage/".to_string(),
            seed: None,
        }
    }
}

impl PlayerConfig {
    /// Replace out-of-range values with defaults.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        if self.history_size == 0 {
            warn!("history_size must be at least 1, using 1");
            self.history_size = 1;
        }
        if !self.policy.jitter.is_finite() || self.policy.jitter < 0.0 {
            warn!("Invalid jitter {}, using {}", self.policy.jitter, defaults.policy.jitter);
            self.policy.jitter = defaults.policy.jitter;
        }
        if !self.policy.repeat_penalty.is_finite() {
            warn!(
                "Invalid repeat_penalty {}, using {}",
                self.policy.repeat_penalty, defaults.policy.repeat_penalty
            );
            self.policy.repeat_penalty = defaults.policy.repeat_penalty;
        }
        if !self.seek_step.is_finite() || self.seek_step <= 0.0 {
            warn!("Invalid seek_step {}, using {}", self.seek_step, defaults.seek_step);
            self.seek_step = defaults.seek_step;
        }

        self
    }

    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        Ok(config.sanitized())
    }
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the snapshot database
    pub state_db_path: PathBuf,
    pub player: PlayerConfig,
}

impl RuntimeConfig {
    /// Resolve paths from the data directory and read `config.json`.
    pub fn new() -> Result<Self> {
        Ok(Self {
            state_db_path: get_state_db_path()?,
            player: PlayerConfig::load(&get_config_path()?)?,
        })
    }

    /// Create configuration with an explicit snapshot database path
    pub fn with_state_db_path(state_db_path: PathBuf) -> Self {
        Self {
            state_db_path,
            player: PlayerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.history_size, 100);
        assert_eq!(config.policy.jitter, 0.01);
        assert_eq!(config.policy.repeat_penalty, 5.0);
        assert_eq!(config.seek_step, 5.0);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = PlayerConfig::load(&temp_dir.path().join("absent.json")).expect("defaults");
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"history_size": 20, "repeat_penalty": 2.5, "seed": 9}"#)
            .expect("Failed to write config");

        let config = PlayerConfig::load(&path).expect("valid config");
        assert_eq!(config.history_size, 20);
        assert_eq!(config.policy.repeat_penalty, 2.5);
        assert_eq!(config.policy.jitter, 0.01);
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn test_invalid_values_are_sanitized() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"history_size": 0, "jitter": -1.0, "seek_step": 0.0}"#)
            .expect("Failed to write config");

        let config = PlayerConfig::load(&path).expect("valid config");
        assert_eq!(config.history_size, 1);
        assert_eq!(config.policy.jitter, 0.01);
        assert_eq!(config.seek_step, 5.0);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "not json").expect("Failed to write config");

        assert!(PlayerConfig::load(&path).is_err());
    }

    #[test]
    fn test_data_dir_paths() {
        let state = get_state_db_path().expect("Should get valid path");
        assert!(state.to_string_lossy().contains("segue"));
        assert!(state.ends_with("state.db"));
        assert!(get_config_path().expect("path").ends_with("config.json"));
    }
}
