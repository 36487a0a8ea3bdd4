//! On-disk configuration for the jsplay playground (`jsplay.json`).
//!
//! The file is optional: every section has defaults that match the
//! behaviour of the playground when no configuration exists.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "jsplay.json";

/// Bounds accepted for `execution.timeout_ms`
pub const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 5_000..=15_000;

/// Bounds accepted for `auto_run.debounce_ms`
pub const DEBOUNCE_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=5_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub execution: ExecutionConfig,
    pub auto_run: AutoRunConfig,
    pub cache: CacheConfig,

    #[serde(skip)]
    path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock budget for a single job
    pub timeout_ms: u64,
    /// Records accepted per job before output is truncated
    pub max_records: usize,
    /// Echo a non-undefined top-level `return` value as a log line
    pub report_return_value: bool,
    pub capabilities: Capabilities,
}

/// Host bindings injected into sandboxed code. `console` is always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Capabilities {
    pub timers: bool,
    pub fetch: bool,
    /// `host` or `host:port` entries; empty denies all network access
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoRunConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// When off, every auto-triggered run executes
    pub smart_mode: bool,
    pub capacity: usize,
    pub recent_window_ms: u64,
    pub freshness_window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("execution.timeout_ms must be between {min} and {max}, got {got}", min = TIMEOUT_RANGE_MS.start(), max = TIMEOUT_RANGE_MS.end())]
    Timeout { got: u64 },
    #[error("execution.max_records must be greater than 0")]
    MaxRecords,
    #[error("auto_run.debounce_ms must be between {min} and {max}, got {got}", min = DEBOUNCE_RANGE_MS.start(), max = DEBOUNCE_RANGE_MS.end())]
    Debounce { got: u64 },
    #[error("cache.capacity must be greater than 0")]
    CacheCapacity,
    #[error(
        "cache.freshness_window_ms ({freshness}) must not be shorter than cache.recent_window_ms ({recent})"
    )]
    CacheWindows { recent: u64, freshness: u64 },
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_records: 1_000,
            report_return_value: true,
            capabilities: Capabilities::default(),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            timers: true,
            fetch: false,
            allowed_hosts: vec![],
        }
    }
}

impl Default for AutoRunConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: 1_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            smart_mode: true,
            capacity: 50,
            recent_window_ms: 5_000,
            freshness_window_ms: 30_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            auto_run: AutoRunConfig::default(),
            cache: CacheConfig::default(),
            path: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Utf8PathBuf {
        Utf8PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    #[must_use]
    pub fn with_path(mut self, path: &Utf8Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn path(&self) -> Utf8PathBuf {
        self.path.clone().unwrap_or_else(Self::default_path)
    }

    /// Loads and validates the config at `path`
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not valid JSON, or holds values
    /// outside their accepted ranges
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed reading config at {path}"))?;
        let cfg: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Config at {path} is not valid"))?;
        cfg.validate()
            .with_context(|| format!("Config at {path} is not valid"))?;
        debug!("Loaded config from {path}");

        Ok(cfg.with_path(path))
    }

    /// Loads the config at `path`, falling back to defaults when it does not exist
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`] for files that do exist
    pub fn load_or_default(path: &Utf8Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {path}, using defaults");
            Ok(Self::default().with_path(path))
        }
    }

    /// Writes the config as pretty JSON to its path
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid or the file cannot be written
    pub fn save(&self) -> Result<()> {
        self.validate()?;
        let path = self.path();
        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed creating directory {parent}"))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("Failed writing config to {path}"))?;
        debug!("Saved config to {path}");

        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first field found outside its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !TIMEOUT_RANGE_MS.contains(&self.execution.timeout_ms) {
            return Err(ConfigError::Timeout {
                got: self.execution.timeout_ms,
            });
        }
        if self.execution.max_records == 0 {
            return Err(ConfigError::MaxRecords);
        }
        if !DEBOUNCE_RANGE_MS.contains(&self.auto_run.debounce_ms) {
            return Err(ConfigError::Debounce {
                got: self.auto_run.debounce_ms,
            });
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::CacheCapacity);
        }
        if self.cache.freshness_window_ms < self.cache.recent_window_ms {
            return Err(ConfigError::CacheWindows {
                recent: self.cache.recent_window_ms,
                freshness: self.cache.freshness_window_ms,
            });
        }
        Ok(())
    }
}
