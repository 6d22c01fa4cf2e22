// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing a configuration file failed
    #[error("IO error reading configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML syntax or shape error
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// YAML syntax or shape error
    #[error("Failed to parse YAML configuration: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    /// JSON syntax or shape error
    #[error("Failed to parse JSON configuration: {0}")]
    JsonParseError(#[from] serde_json::error::Error),

    /// Writing a configuration failed
    #[error("Failed to serialize configuration: {0}")]
    SerializationError(String),

    /// Cross-field validation failure
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// File extension is not toml, yaml, yml or json
    #[error("Unsupported configuration format: {0}. Supported formats: toml, yaml, json")]
    UnsupportedFormat(String),

    /// No file at the given path
    #[error("Configuration file not found at path: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Path without an extension
    #[error("Invalid configuration path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// An override variable holds an unusable value
    #[error("Environment variable parsing error: {variable_name}={value}. {reason}")]
    EnvVarParsingError {
        /// Variable name
        variable_name: String,
        /// Raw value
        value: String,
        /// What was expected
        reason: String,
    },

    /// A field holds an unusable value
    #[error("Invalid configuration value for field '{field}': {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `providers.aws.regions`
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// A required field is empty or absent
    #[error("Missing required configuration field: {0}")]
    MissingRequired(String),

    /// A provider name that is not configured
    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),
}

impl ConfigError {
    /// Create a ValidationError
    pub fn validation_error(message: impl Into<String>) -> Self {
        ConfigError::ValidationError(message.into())
    }

    /// Create an EnvVarParsingError
    pub fn env_var_parsing_error(
        variable_name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::EnvVarParsingError {
            variable_name: variable_name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a MissingRequired error
    pub fn missing(field: impl Into<String>) -> Self {
        ConfigError::MissingRequired(field.into())
    }

    /// Field path the error points at, when it has one
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { field, .. } => Some(field),
            ConfigError::MissingRequired(field) => Some(field),
            _ => None,
        }
    }
}

/// Result alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
