// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for structured logging.

use cloudmux_config::ObservabilityConfig;
use std::io;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during logging configuration
#[derive(Error, Debug)]
pub enum LogError {
    /// Unparseable level or filter directive
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Unknown format name
    #[error("Unknown format: {0}. Expected one of: pretty, compact, json")]
    InvalidFormat(String),

    /// Unknown output name
    #[error("Unknown output: {0}. Expected one of: stderr, stdout")]
    InvalidOutput(String),

    /// Writing logs failed
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// A global subscriber is already installed
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Output format for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,

    /// Compact single-line format
    Compact,

    /// JSON format for machine-readable logs
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Write to standard error
    #[default]
    Stderr,

    /// Write to standard output
    Stdout,
}

impl FromStr for LogOutput {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stderr" => Ok(LogOutput::Stderr),
            "stdout" => Ok(LogOutput::Stdout),
            _ => Err(LogError::InvalidOutput(s.to_string())),
        }
    }
}

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format for logs
    pub format: LogFormat,

    /// Filter directive (e.g. "info", "cloudmux_blobstore=debug");
    /// `RUST_LOG` is consulted when unset
    pub level: Option<String>,

    /// Whether to use colored output
    pub use_color: bool,

    /// Whether to include timestamps in output
    pub use_timestamps: bool,

    /// Whether to include thread IDs in output
    pub include_thread_ids: bool,

    /// Whether to include target module names
    pub include_targets: bool,

    /// Output destination (stderr by default)
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Pretty,
            level: None,
            use_color: true,
            use_timestamps: true,
            include_thread_ids: false,
            include_targets: true,
            output: LogOutput::Stderr,
        }
    }
}

impl LogConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Logging settings from a loaded configuration file
    pub fn from_settings(settings: &ObservabilityConfig) -> Result<Self, LogError> {
        Ok(LogConfig {
            format: settings.log_format.parse()?,
            level: Some(settings.log_level.clone()).filter(|l| !l.is_empty()),
            use_color: settings.use_color,
            use_timestamps: settings.use_timestamps,
            include_thread_ids: settings.include_thread_ids,
            include_targets: settings.include_targets,
            output: settings.log_output.parse()?,
        })
    }

    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Enable or disable color output
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// Enable or disable timestamps
    pub fn with_timestamps(mut self, use_timestamps: bool) -> Self {
        self.use_timestamps = use_timestamps;
        self
    }

    /// Enable or disable thread IDs
    pub fn with_thread_ids(mut self, include_thread_ids: bool) -> Self {
        self.include_thread_ids = include_thread_ids;
        self
    }

    /// Enable or disable target module names
    pub fn with_targets(mut self, include_targets: bool) -> Self {
        self.include_targets = include_targets;
        self
    }

    /// Set the output destination
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Get the effective log level from config or environment
    pub fn get_effective_level(&self) -> String {
        self.level
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info".to_string())
    }
}

impl TryFrom<&ObservabilityConfig> for LogConfig {
    type Error = LogError;

    fn try_from(settings: &ObservabilityConfig) -> Result<Self, Self::Error> {
        LogConfig::from_settings(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("COMPACT".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("Json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LogError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_log_output_parsing() {
        assert_eq!("stdout".parse::<LogOutput>().unwrap(), LogOutput::Stdout);
        assert!("syslog".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_from_settings() {
        let settings = ObservabilityConfig {
            log_level: "warn,cloudmux_core=trace".to_string(),
            log_format: "json".to_string(),
            log_output: "stdout".to_string(),
            use_color: false,
            ..Default::default()
        };
        let config = LogConfig::try_from(&settings).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
        assert_eq!(config.get_effective_level(), "warn,cloudmux_core=trace");
        assert!(!config.use_color);
        assert!(config.include_targets);
    }

    #[test]
    fn test_effective_level_from_config() {
        let config = LogConfig::new().with_level("debug");
        assert_eq!(config.get_effective_level(), "debug");
    }
}
