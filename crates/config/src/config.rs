//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Run loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Execute queued jobs concurrently, one worker per job
    #[serde(default)]
    pub parallel: bool,
    /// Delay before a scheduled host shutdown, in seconds
    #[serde(default = "default_shutdown_delay_secs")]
    pub shutdown_delay_secs: u64,
    /// Pause between jobs in sequential mode, in seconds
    #[serde(default = "default_job_gap_secs")]
    pub job_gap_secs: u64,
}

fn default_shutdown_delay_secs() -> u64 {
    60
}

fn default_job_gap_secs() -> u64 {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            shutdown_delay_secs: default_shutdown_delay_secs(),
            job_gap_secs: default_job_gap_secs(),
        }
    }
}

/// Subtitle discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtitleConfig {
    /// File extensions considered during `auto` subtitle discovery
    #[serde(default = "default_subtitle_extensions")]
    pub extensions: Vec<String>,
}

fn default_subtitle_extensions() -> Vec<String> {
    vec!["ass".to_string(), "ssa".to_string()]
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            extensions: default_subtitle_extensions(),
        }
    }
}

/// Progress monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressConfig {
    /// Seconds between progress log polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Bytes read per backward step while tailing the log
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: u64,
    /// Minimum number of trailing lines to collect before parsing
    #[serde(default = "default_min_lines")]
    pub min_lines: usize,
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_chunk_bytes() -> u64 {
    400
}

fn default_min_lines() -> usize {
    12
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            chunk_bytes: default_chunk_bytes(),
            min_lines: default_min_lines(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub subtitle: SubtitleConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

impl Settings {
    /// Load configuration from a TOML file
    ///
    /// Parses the TOML file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - RIPRUN_PARALLEL -> run.parallel
    /// - RIPRUN_SHUTDOWN_DELAY_SECS -> run.shutdown_delay_secs
    /// - RIPRUN_SUBTITLE_EXTENSIONS -> subtitle.extensions (comma-separated)
    /// - RIPRUN_PROGRESS_POLL_SECS -> progress.poll_interval_secs
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RIPRUN_PARALLEL") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.run.parallel = true,
                "false" | "0" | "no" => self.run.parallel = false,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Ok(val) = env::var("RIPRUN_SHUTDOWN_DELAY_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.run.shutdown_delay_secs = secs;
            }
        }

        if let Ok(val) = env::var("RIPRUN_SUBTITLE_EXTENSIONS") {
            let exts: Vec<String> = val
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !exts.is_empty() {
                self.subtitle.extensions = exts;
            }
        }

        if let Ok(val) = env::var("RIPRUN_PROGRESS_POLL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.progress.poll_interval_secs = secs;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut settings = Self::load_from_file(path)?;
        settings.apply_env_overrides();
        Ok(settings)
    }
}
