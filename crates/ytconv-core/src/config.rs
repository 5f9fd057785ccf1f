//! Application configuration management.
//!
//! Settings are stored as JSON under the platform config directory
//! (`<config>/ytconv/config.json`). Every field has a serde default, so older
//! or hand-edited files load without complaint.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default maximum number of concurrent downloads.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Minimum allowed concurrent downloads.
pub const MIN_CONCURRENT_DOWNLOADS: usize = 1;

/// Upper bound for the runtime-configurable concurrency limit.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 20;

/// Default number of worker loops. Never below [`MAX_CONCURRENT_DOWNLOADS`].
pub const DEFAULT_WORKER_COUNT: usize = MAX_CONCURRENT_DOWNLOADS;

static RATE_LIMIT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?[KMG]?$").ok());

/// Action to run once the queue drains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostQueueAction {
    /// Do nothing.
    #[default]
    None,
    /// Power off the machine.
    Shutdown,
    /// Suspend the machine.
    Sleep,
}

impl std::fmt::Display for PostQueueAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Sleep => write!(f, "sleep"),
        }
    }
}

impl std::str::FromStr for PostQueueAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "do nothing" => Ok(Self::None),
            "shutdown" => Ok(Self::Shutdown),
            "sleep" => Ok(Self::Sleep),
            other => Err(Error::InvalidInput(format!(
                "unknown post-queue action '{other}'"
            ))),
        }
    }
}

/// Configuration for the download queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of concurrent downloads.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,
    /// Number of worker loops in the pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

const fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

const fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

impl QueueConfig {
    /// Clamp values into their valid ranges.
    ///
    /// The worker count is raised to the concurrency cap so a waiting worker
    /// is always available when the limit is increased at runtime.
    pub fn validate(&mut self) {
        self.max_concurrent_downloads = clamp_concurrency(self.max_concurrent_downloads);
        self.worker_count = self.worker_count.max(MAX_CONCURRENT_DOWNLOADS);
    }
}

/// Clamp a concurrency limit into `MIN..=MAX`.
#[must_use]
pub const fn clamp_concurrency(n: usize) -> usize {
    if n < MIN_CONCURRENT_DOWNLOADS {
        MIN_CONCURRENT_DOWNLOADS
    } else if n > MAX_CONCURRENT_DOWNLOADS {
        MAX_CONCURRENT_DOWNLOADS
    } else {
        n
    }
}

/// Check a rate limit such as `500K`, `1.5M` or `2G`.
pub fn validate_rate_limit(limit: &str) -> Result<()> {
    let valid = RATE_LIMIT_RE
        .as_ref()
        .is_some_and(|re| re.is_match(limit.trim()));
    if valid {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "Invalid rate limit '{limit}', expected e.g. 500K or 2M"
        )))
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    /// Output directory. `None` uses the platform download folder.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
    /// Download queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Global download rate limit.
    #[serde(default)]
    pub rate_limit: Option<String>,
    /// Action run when the queue drains.
    #[serde(default)]
    pub post_queue_action: PostQueueAction,
    /// Explicit `yt-dlp` binary; looked up on `PATH` when unset.
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,
    /// Explicit `ffmpeg` binary; looked up on `PATH` when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default location, or create it.
    pub fn load() -> Result<Self> {
        let path = config_file_path();
        if !path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save() {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific file.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| Error::FileSystem {
            path: path.to_path_buf(),
            message: format!("Failed to read config file: {e}"),
        })?;

        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
        config.validate()?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| Error::FileSystem {
                path: parent.to_path_buf(),
                message: format!("Failed to create config directory: {e}"),
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| Error::FileSystem {
            path: path.to_path_buf(),
            message: format!("Failed to write config file: {e}"),
        })?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp queue settings and reject malformed values.
    pub fn validate(&mut self) -> Result<()> {
        self.queue.validate();
        if let Some(limit) = &self.rate_limit {
            if limit.trim().is_empty() {
                self.rate_limit = None;
            } else {
                validate_rate_limit(limit)?;
            }
        }
        Ok(())
    }

    /// Get the path to the default config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("ytconv")
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.queue.max_concurrent_downloads, 3);
        assert_eq!(config.queue.worker_count, 20);
        assert_eq!(config.post_queue_action, PostQueueAction::None);
        assert!(config.output_directory.is_none());
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn test_queue_config_validate_clamps() {
        let mut config = QueueConfig {
            max_concurrent_downloads: 0,
            worker_count: 2,
        };
        config.validate();
        assert_eq!(config.max_concurrent_downloads, MIN_CONCURRENT_DOWNLOADS);
        assert_eq!(config.worker_count, MAX_CONCURRENT_DOWNLOADS);

        config.max_concurrent_downloads = 99;
        config.validate();
        assert_eq!(config.max_concurrent_downloads, MAX_CONCURRENT_DOWNLOADS);
    }

    #[test]
    fn test_rate_limit_validation() {
        for ok in ["500K", "2M", "1.5M", "1G", "1024"] {
            assert!(validate_rate_limit(ok).is_ok(), "{ok} should be valid");
        }
        for bad in ["", "fast", "2MB", "-1K", "1.M"] {
            assert!(validate_rate_limit(bad).is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn test_post_queue_action_parsing() {
        assert_eq!(
            "Shutdown".parse::<PostQueueAction>().unwrap(),
            PostQueueAction::Shutdown
        );
        assert_eq!(
            "do nothing".parse::<PostQueueAction>().unwrap(),
            PostQueueAction::None
        );
        assert!("reboot".parse::<PostQueueAction>().is_err());
        assert_eq!(PostQueueAction::Sleep.to_string(), "sleep");
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let temp = TempDir::new().expect("Should create temp dir");
        let path = temp.path().join("nested").join("config.json");

        let config = AppConfig {
            output_directory: Some(temp.path().join("out")),
            rate_limit: Some("2M".to_string()),
            post_queue_action: PostQueueAction::Sleep,
            ..Default::default()
        };
        config.save_to(&path).expect("Should save");

        let loaded = AppConfig::load_from(&path).expect("Should load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().expect("Should create temp dir");
        let loaded = AppConfig::load_from(&temp.path().join("absent.json")).expect("Should load");
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let temp = TempDir::new().expect("Should create temp dir");
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"queue": {"max_concurrent_downloads": 50}}"#).expect("Should write");

        let loaded = AppConfig::load_from(&path).expect("Should load");
        assert_eq!(loaded.queue.max_concurrent_downloads, MAX_CONCURRENT_DOWNLOADS);
        assert_eq!(loaded.queue.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(loaded.post_queue_action, PostQueueAction::None);
    }

    #[test]
    fn test_invalid_rate_limit_in_file_is_rejected() {
        let temp = TempDir::new().expect("Should create temp dir");
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"rate_limit": "fast"}"#).expect("Should write");

        let result = AppConfig::load_from(&path);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_config_file_path_uses_correct_name() {
        let path = AppConfig::config_file_path();
        assert!(path.ends_with("ytconv/config.json"));
    }
}
