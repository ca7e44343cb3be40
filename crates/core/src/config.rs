//! Issue model configuration
//!
//! Manages the aggregation settings:
//! - Maximum number of issues kept for display
//! - Slow-source reporting threshold
//! - Which context observers are notified on

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use tracing::{info, debug};

use crate::error::{IssueError, Result};

/// Default maximum number of issues shown before the overflow marker.
pub const DEFAULT_ISSUE_CAP: usize = 200;

/// Where observer notifications and change-triggered recomputes run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherKind {
    /// Inline on whichever thread finished the recompute
    #[default]
    Immediate,
    /// On a dedicated notification thread
    Thread,
    /// On the ambient tokio runtime
    Tokio,
}

/// Main issue model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuesConfig {
    /// Configuration version for migrations
    pub version: u32,
    /// Maximum issues retained; the rest collapse into one overflow marker
    pub cap: usize,
    /// Collect calls slower than this are logged (0 disables the warning)
    pub slow_source_threshold_ms: u64,
    /// Notification context
    pub dispatcher: DispatcherKind,
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            version: 1,
            cap: DEFAULT_ISSUE_CAP,
            slow_source_threshold_ms: 250,
            dispatcher: DispatcherKind::default(),
        }
    }
}

impl IssuesConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "issuehub", "issuehub")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("issues.toml"))
    }

    /// Load configuration from the platform config file, writing defaults if absent
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| IssueError::Config("Cannot determine config path".into()))?;

        if config_file.exists() {
            Self::load_from(&config_file).await
        } else {
            info!("Config file not found, using defaults");
            let config = IssuesConfig::default();
            config.save_to(&config_file).await?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit path
    pub async fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        let config: IssuesConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an explicit path
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    /// Reject settings the aggregator cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.cap == 0 {
            return Err(IssueError::Config("cap must be at least 1".into()));
        }
        Ok(())
    }

    /// Slow-source threshold, if enabled
    pub fn slow_source_threshold(&self) -> Option<Duration> {
        match self.slow_source_threshold_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
