// src/config.rs
//
// TOML configuration for the binary.
//
// Every field has a default, so a missing file or a partial file is fine.
// Lookup order for the file: explicit path, $CLIPSHRINK_CONFIG, then
// `<config dir>/clipshrink/config.toml`.

use crate::engine::{EncodeSettings, MAX_PNG_OPTIMIZATION};
use crate::error::{Result, ShrinkError};
use crate::history::DEFAULT_MAX_ENTRIES;
use crate::ops::{Constraints, DEFAULT_MAX_BYTES, DEFAULT_MAX_DIMENSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const APP_DIR: &str = "clipshrink";
const CONFIG_ENV: &str = "CLIPSHRINK_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_dimension: u32,
    pub max_bytes: usize,
    pub poll_interval_ms: u64,
    pub self_write_grace_ms: u64,
    /// oxipng preset, 0..=6
    pub png_optimization: u8,
    pub jpeg_fast_mode: bool,
    /// Defaults to `<data dir>/clipshrink/history.jsonl`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,
    /// Where encoded results are saved when `save_outputs` is on.
    /// Defaults to `<data dir>/clipshrink/outputs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub max_history_entries: usize,
    pub save_outputs: bool,
    pub notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        let encode = EncodeSettings::default();
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_bytes: DEFAULT_MAX_BYTES,
            poll_interval_ms: 500,
            self_write_grace_ms: 1500,
            png_optimization: encode.png_optimization,
            jpeg_fast_mode: encode.jpeg_fast_mode,
            history_path: None,
            output_dir: None,
            max_history_entries: DEFAULT_MAX_ENTRIES,
            save_outputs: false,
            notifications: true,
        }
    }
}

/// `<config dir>/clipshrink/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Config {
    /// Parse and validate TOML text. `origin` only labels errors.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)
            .map_err(|e| ShrinkError::config_parse_failed(origin.to_string(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(default_config_path),
        };
        let Some(path) = path else {
            debug!("no config directory, using defaults");
            return Ok(Self::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), "loading config");
                Self::from_toml_str(&text, &path.display().to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ShrinkError::file_read_failed(path.display().to_string(), e)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        Constraints::new(self.max_dimension, self.max_bytes)?;
        if self.png_optimization > MAX_PNG_OPTIMIZATION {
            return Err(ShrinkError::invalid_argument(
                "png_optimization",
                self.png_optimization.to_string(),
                format!("must be between 0 and {MAX_PNG_OPTIMIZATION}"),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ShrinkError::invalid_argument(
                "poll_interval_ms",
                "0",
                "must be at least 1",
            ));
        }
        if self.max_history_entries == 0 {
            return Err(ShrinkError::invalid_argument(
                "max_history_entries",
                "0",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn constraints(&self) -> Result<Constraints> {
        Constraints::new(self.max_dimension, self.max_bytes)
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            png_optimization: self.png_optimization.min(MAX_PNG_OPTIMIZATION),
            jpeg_fast_mode: self.jpeg_fast_mode,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn self_write_grace(&self) -> Duration {
        Duration::from_millis(self.self_write_grace_ms)
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_path
            .clone()
            .unwrap_or_else(|| data_dir().join("history.jsonl"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("outputs"))
    }
}
