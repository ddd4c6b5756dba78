//! Sheetflow configuration
//!
//! Config is stored in `~/.config/sheetflow/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Command-line flags
//! 2. Environment variables (`SHEETFLOW_PREVIEW_ROWS`, `SHEETFLOW_OUTPUT_DIR`,
//!    `SHEETFLOW_RUN_TIMEOUT_SECS`), including those loaded from `.env`
//! 3. Config file
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_PREVIEW_ROWS;
use crate::error::{Result, SheetflowError};

pub const ENV_PREVIEW_ROWS: &str = "SHEETFLOW_PREVIEW_ROWS";
pub const ENV_OUTPUT_DIR: &str = "SHEETFLOW_OUTPUT_DIR";
pub const ENV_RUN_TIMEOUT_SECS: &str = "SHEETFLOW_RUN_TIMEOUT_SECS";

/// Output directory used when nothing else is configured
pub const DEFAULT_OUTPUT_DIR: &str = "uploads";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SheetflowConfig {
    #[serde(default)]
    pub preview: PreviewSettings,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub run: RunSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreviewSettings {
    /// Rows shown per table by `preview`
    pub max_rows: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputSettings {
    /// Directory receiving output tables and execution records
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    /// Wall-clock limit for `run`; unset means no limit
    pub timeout_secs: Option<u64>,
}

impl SheetflowConfig {
    /// Returns `~/.config/sheetflow/` on Unix, `%APPDATA%/sheetflow/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sheetflow")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load the user config file
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SheetflowError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| SheetflowError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    /// Merge with variables from an arbitrary lookup; empty values are ignored
    pub fn with_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(raw) = var(ENV_PREVIEW_ROWS) {
            self.preview.max_rows = Some(parse_var(ENV_PREVIEW_ROWS, &raw)?);
        }

        if let Some(dir) = var(ENV_OUTPUT_DIR) {
            self.output.dir = Some(PathBuf::from(dir));
        }

        if let Some(raw) = var(ENV_RUN_TIMEOUT_SECS) {
            self.run.timeout_secs = Some(parse_var(ENV_RUN_TIMEOUT_SECS, &raw)?);
        }

        Ok(self)
    }

    pub fn preview_rows(&self) -> usize {
        self.preview.max_rows.unwrap_or(DEFAULT_PREVIEW_ROWS)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// `None` (or zero) means runs are not time-limited
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| SheetflowError::ConfigError {
        reason: format!("{} must be a non-negative integer, got '{}'", name, raw),
    })
}
