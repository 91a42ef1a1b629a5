//! Configuration management for cardscan
//!
//! Provides loading, saving and validation of the scanner's tunables:
//! alternate readings consulted by the parser, the tracking level requested
//! from the tracker, and how the scan lane queues frames and runs extraction.

use crate::errors::ScanError;
use crate::parser::MAX_ALTERNATES;
use crate::types::TrackingLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Largest frame queue the lane accepts.
pub const MAX_FRAME_QUEUE_DEPTH: usize = 4;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub parser: ParserConfig,
    pub tracking: TrackingConfig,
    pub lane: LaneConfig,
}

/// Digit parsing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Ranked alternates consulted per text fragment (1-10)
    pub max_alternates: usize,
}

/// Tracking configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Requested tracker precision
    pub level: TrackingLevel,
}

/// Threaded lane configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Frames buffered while the lane is busy; newer frames are dropped
    pub frame_queue_depth: usize,
    /// Run recognition on a dedicated extraction thread
    pub offload_extraction: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_alternates: MAX_ALTERNATES,
        }
    }
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            frame_queue_depth: 1,
            offload_extraction: true,
        }
    }
}

impl ScannerConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScanError::ConfigIo(format!("Failed to read config file: {}", e)))?;

        let config: ScannerConfig = toml::from_str(&contents)
            .map_err(|e| ScanError::ConfigIo(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ScanError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ScanError::ConfigIo(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ScanError::ConfigIo(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ScanError::ConfigIo(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("cardscan.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.parser.max_alternates == 0 || self.parser.max_alternates > MAX_ALTERNATES {
            return Err(ScanError::InvalidConfig(format!(
                "max_alternates must be between 1 and {}",
                MAX_ALTERNATES
            )));
        }
        if self.lane.frame_queue_depth == 0 || self.lane.frame_queue_depth > MAX_FRAME_QUEUE_DEPTH {
            return Err(ScanError::InvalidConfig(format!(
                "frame_queue_depth must be between 1 and {}",
                MAX_FRAME_QUEUE_DEPTH
            )));
        }
        Ok(())
    }
}
