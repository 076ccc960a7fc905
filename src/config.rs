//! Session and storage configuration.
//!
//! The defaults mirror the behaviour hosts expect from a phone camera: a
//! 2.5 s bound on opening, a longer but finite bound on closing, and a
//! preview capped at 480x480 regardless of display size.

use crate::sizing::{Size, StillSizePolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timing, sizing and device selection settings for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bound on waiting for the device lock in `open()`.
    pub open_lock_timeout_ms: u64,
    /// Bound on waiting for the device lock in `close()`.
    pub close_lock_timeout_ms: u64,
    /// How long the caller waits for the worker to acknowledge open/close.
    pub command_timeout_ms: u64,
    /// How long stopping the worker may take to drain.
    pub worker_shutdown_timeout_ms: u64,
    /// Preview width cap.
    pub max_preview_width: u32,
    /// Preview height cap.
    pub max_preview_height: u32,
    /// Buffers on the session-lifetime JPEG reader.
    pub preview_reader_max_images: u32,
    /// Buffers on the transient still-capture reader.
    pub still_reader_max_images: u32,
    /// How the still-capture size is picked.
    pub still_size: StillSizePolicy,
    /// Skip front-facing sensors when selecting a device.
    pub skip_front_facing: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_lock_timeout_ms: 2500,
            close_lock_timeout_ms: 10_000,
            command_timeout_ms: 5000,
            worker_shutdown_timeout_ms: 5000,
            max_preview_width: 480,
            max_preview_height: 480,
            preview_reader_max_images: 2,
            still_reader_max_images: 1,
            still_size: StillSizePolicy::Largest,
            skip_front_facing: true,
        }
    }
}

impl SessionConfig {
    /// How long `open` waits for camera ownership.
    pub fn open_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.open_lock_timeout_ms)
    }

    /// How long `close` waits for camera ownership.
    pub fn close_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.close_lock_timeout_ms)
    }

    /// How long the foreground waits for the worker to answer a command.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Grace period for the worker to drain its queue on stop.
    pub fn worker_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_shutdown_timeout_ms)
    }

    /// The fixed preview cap.
    pub fn max_preview(&self) -> Size {
        Size::new(self.max_preview_width, self.max_preview_height)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.open_lock_timeout_ms == 0
            || self.close_lock_timeout_ms == 0
            || self.command_timeout_ms == 0
            || self.worker_shutdown_timeout_ms == 0
        {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_preview_width == 0 || self.max_preview_height == 0 {
            return Err(ConfigError::InvalidPreviewCap);
        }
        if self.preview_reader_max_images == 0 || self.still_reader_max_images == 0 {
            return Err(ConfigError::InvalidReaderDepth);
        }
        Ok(())
    }
}

/// Where captured stills are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root pictures directory.
    pub pictures_root: PathBuf,
    /// Application folder below the root.
    pub app_folder: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pictures_root: dirs::picture_dir().unwrap_or_else(|| PathBuf::from("Pictures")),
            app_folder: "Camera".to_owned(),
        }
    }
}

impl StorageConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let folder = self.app_folder.trim();
        if folder.is_empty() || folder.contains(['/', '\\']) || folder == ".." {
            return Err(ConfigError::InvalidAppFolder(self.app_folder.clone()));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A timeout of zero.
    #[error("timeouts must be non-zero")]
    InvalidTimeout,
    /// A zero preview cap dimension.
    #[error("preview cap must be non-zero in both dimensions")]
    InvalidPreviewCap,
    /// Zero image reader buffers.
    #[error("image readers need at least one buffer")]
    InvalidReaderDepth,
    /// Empty folder name, or one containing a path separator.
    #[error("invalid application folder name: {0:?}")]
    InvalidAppFolder(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[session]` table.
    #[serde(default)]
    pub session: SessionConfig,
    /// `[storage]` table.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.session.validate()?;
        config.storage.validate()?;
        Ok(config)
    }
}
