// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::{ConfigError, ConfigResult};
use crate::schema::*;

/// Validator for configuration settings
pub trait Validator {
    /// Check the settings, naming the offending field on failure
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Config {
    fn validate(&self) -> ConfigResult<()> {
        for (name, provider) in &self.providers {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "providers",
                    "provider names must not be empty",
                ));
            }
            validate_provider(&format!("providers.{}", name), provider)?;
        }
        self.http.validate()?;
        self.polling.validate()?;
        self.blobstore.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

fn validate_provider(path: &str, provider: &ProviderConfig) -> ConfigResult<()> {
    match provider {
        ProviderConfig::Transient => Ok(()),
        ProviderConfig::Filesystem(fs) => {
            if fs.base_dir.as_os_str().is_empty() {
                return Err(ConfigError::missing(format!("{}.base_dir", path)));
            }
            Ok(())
        }
        ProviderConfig::S3(s3) => validate_s3(path, s3),
        ProviderConfig::AzureBlob(azure) => validate_azure(path, azure),
        ProviderConfig::Swift(swift) => validate_swift(path, swift),
        ProviderConfig::GoogleCompute(gce) => {
            if gce.project.is_empty() {
                return Err(ConfigError::missing(format!("{}.project", path)));
            }
            if let Some(endpoint) = &gce.endpoint {
                require_http_url(&format!("{}.endpoint", path), endpoint)?;
            }
            Ok(())
        }
    }
}

fn validate_s3(path: &str, s3: &S3Provider) -> ConfigResult<()> {
    if s3.regions.iter().any(|r| r.trim().is_empty()) {
        return Err(ConfigError::invalid_value(
            format!("{}.regions", path),
            "region names must not be empty",
        ));
    }
    if let Some(default_region) = &s3.default_region {
        if !s3.regions.is_empty() && !s3.regions.contains(default_region) {
            return Err(ConfigError::invalid_value(
                format!("{}.default_region", path),
                format!("'{}' is not one of the configured regions", default_region),
            ));
        }
    }
    if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
        return Err(ConfigError::invalid_value(
            format!("{}.access_key_id", path),
            "access_key_id and secret_access_key must be set together",
        ));
    }
    if let Some(endpoint) = &s3.endpoint {
        require_http_url(&format!("{}.endpoint", path), endpoint)?;
    }
    Ok(())
}

fn validate_azure(path: &str, azure: &AzureBlobProvider) -> ConfigResult<()> {
    if azure.connection_string.is_some() {
        if azure.account.is_some() || azure.account_key.is_some() {
            return Err(ConfigError::validation_error(format!(
                "{}: connection_string excludes account and account_key",
                path
            )));
        }
        return Ok(());
    }

    let account = azure
        .account
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ConfigError::missing(format!("{}.account", path)))?;
    if account.len() < 3
        || account.len() > 24
        || !account
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(ConfigError::invalid_value(
            format!("{}.account", path),
            "account name must be 3-24 lowercase letters or digits",
        ));
    }
    if azure.account_key.as_deref().is_none_or(str::is_empty) {
        return Err(ConfigError::validation_error(format!(
            "{}: Azure Blob requires either account_key or connection_string",
            path
        )));
    }
    if let Some(endpoint) = &azure.endpoint {
        require_http_url(&format!("{}.endpoint", path), endpoint)?;
    }
    Ok(())
}

fn validate_swift(path: &str, swift: &SwiftProvider) -> ConfigResult<()> {
    require_http_url(&format!("{}.identity_endpoint", path), &swift.identity_endpoint)?;
    if swift.username.is_empty() {
        return Err(ConfigError::missing(format!("{}.username", path)));
    }
    if swift.project.is_empty() {
        return Err(ConfigError::missing(format!("{}.project", path)));
    }
    let interfaces = ["public", "internal", "admin"];
    if !interfaces.contains(&swift.interface.as_str()) {
        return Err(ConfigError::invalid_value(
            format!("{}.interface", path),
            format!("must be one of: {}", interfaces.join(", ")),
        ));
    }
    if let Some(default_region) = &swift.default_region {
        if !swift.regions.is_empty() && !swift.regions.contains(default_region) {
            return Err(ConfigError::invalid_value(
                format!("{}.default_region", path),
                format!("'{}' is not one of the configured regions", default_region),
            ));
        }
    }
    Ok(())
}

fn require_http_url(field: &str, value: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(ConfigError::missing(field));
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::invalid_value(
            field,
            format!("expected an http(s) URL, got '{}'", value),
        ));
    }
    Ok(())
}

impl Validator for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_retries > 20 {
            return Err(ConfigError::invalid_value(
                "http.max_retries",
                format!("must be at most 20, got {}", self.max_retries),
            ));
        }
        if self.retry_delay_ms > self.max_retry_delay_ms {
            return Err(ConfigError::invalid_value(
                "http.retry_delay_ms",
                "must not exceed http.max_retry_delay_ms",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "http.request_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "http.connect_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Validator for PollingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "polling.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.initial_period_ms == 0 {
            return Err(ConfigError::invalid_value(
                "polling.initial_period_ms",
                "must be greater than 0",
            ));
        }
        if self.initial_period_ms > self.max_period_ms {
            return Err(ConfigError::invalid_value(
                "polling.initial_period_ms",
                "must not exceed polling.max_period_ms",
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::invalid_value(
                "polling.backoff_factor",
                format!("must be a number >= 1.0, got {}", self.backoff_factor),
            ));
        }
        Ok(())
    }
}

impl Validator for BlobStoreConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.part_concurrency == 0 || self.part_concurrency > 64 {
            return Err(ConfigError::invalid_value(
                "blobstore.part_concurrency",
                format!("must be between 1 and 64, got {}", self.part_concurrency),
            ));
        }
        Ok(())
    }
}

impl Validator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        let level_ok = self.log_level.split(',').all(|directive| {
            let level = directive.rsplit('=').next().unwrap_or_default();
            valid_levels.contains(&level.trim().to_lowercase().as_str())
        });
        if self.log_level.is_empty() || !level_ok {
            return Err(ConfigError::invalid_value(
                "observability.log_level",
                format!("must use levels from: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        let valid_outputs = ["stderr", "stdout"];
        if !valid_outputs.contains(&self.log_output.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_output",
                format!("must be one of: {}", valid_outputs.join(", ")),
            ));
        }
        Ok(())
    }
}
