// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{Config, ProviderConfig};
use crate::validation::Validator;
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Prefix of every override variable
pub const ENV_PREFIX: &str = "CLOUDMUX";

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }

    fn parse_value(&self, content: &str) -> ConfigResult<Value> {
        let value = match self {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str::<Option<Value>>(content)?
                .unwrap_or_else(|| Value::Object(Default::default())),
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(value)
    }

    fn render(&self, config: &Config) -> ConfigResult<String> {
        match self {
            ConfigFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| ConfigError::SerializationError(e.to_string())),
            ConfigFormat::Yaml => serde_yaml::to_string(config)
                .map_err(|e| ConfigError::SerializationError(e.to_string())),
            ConfigFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| ConfigError::SerializationError(e.to_string())),
        }
    }
}

/// Configuration loader
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let value = self.read_value(path.as_ref()).await?;
        self.finish(value)
    }

    /// Load configuration from a string
    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let value = format.parse_value(content)?;
        debug!("Configuration loaded from {}", format.name());
        self.finish(value)
    }

    /// Load configuration with environment variable overrides
    pub async fn load_with_overrides<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let value = self.read_value(path.as_ref()).await?;
        let mut config: Config = serde_json::from_value(value)?;
        self.apply_env_overrides(&mut config)?;
        if self.validate {
            config.validate()?;
        }
        Ok(config)
    }

    /// Merge several files, later files winning field by field
    ///
    /// Tables merge recursively; any other value (including arrays) from a
    /// later file replaces the earlier one.
    pub async fn load_and_merge<P: AsRef<Path>>(&self, paths: &[P]) -> ConfigResult<Config> {
        if paths.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one configuration file must be provided".to_string(),
            ));
        }

        let mut merged = Value::Object(Default::default());
        for path in paths {
            let overlay = self.read_value(path.as_ref()).await?;
            merge_values(&mut merged, overlay);
        }
        self.finish(merged)
    }

    /// Write `config` in the format implied by the path's extension
    pub async fn save<P: AsRef<Path>>(&self, config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let rendered = format.render(config)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, rendered).await?;
        info!("Saved {} configuration to {}", format.name(), path.display());
        Ok(())
    }

    /// Apply `CLOUDMUX_*` environment variable overrides
    pub fn apply_env_overrides(&self, config: &mut Config) -> ConfigResult<()> {
        apply_overrides(config, |name| std::env::var(name).ok())
    }

    async fn read_value(&self, path: &Path) -> ConfigResult<Value> {
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await?;
        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );
        format.parse_value(&content)
    }

    fn finish(&self, value: Value) -> ConfigResult<Config> {
        let config: Config = serde_json::from_value(value)?;
        if self.validate {
            config.validate()?;
            info!("Configuration validated successfully");
        }
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply overrides read through `lookup`
///
/// Global settings use fixed names (`CLOUDMUX_LOG_LEVEL`, ...). Provider
/// secrets use `CLOUDMUX_<NAME>_<FIELD>` where `<NAME>` is the provider name
/// upper-cased with `-` and `.` turned into `_`.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| {
        let name = format!("{}_{}", ENV_PREFIX, suffix);
        lookup(&name).map(|value| (name, value))
    };

    // Observability
    if let Some((_, value)) = var("LOG_LEVEL") {
        config.observability.log_level = value;
    }
    if let Some((_, value)) = var("LOG_FORMAT") {
        config.observability.log_format = value;
    }
    if let Some((_, value)) = var("LOG_OUTPUT") {
        config.observability.log_output = value;
    }
    if let Some((name, value)) = var("LOG_COLOR") {
        config.observability.use_color = parse_bool(&name, &value)?;
    }

    // HTTP
    if let Some((name, value)) = var("HTTP_MAX_RETRIES") {
        config.http.max_retries = parse_number(&name, &value)?;
    }
    if let Some((name, value)) = var("HTTP_REQUEST_TIMEOUT_SECS") {
        config.http.request_timeout_secs = parse_number(&name, &value)?;
    }
    if let Some((_, value)) = var("HTTP_USER_AGENT") {
        config.http.user_agent = Some(value);
    }

    // Polling
    if let Some((name, value)) = var("POLL_TIMEOUT_SECS") {
        config.polling.timeout_secs = parse_number(&name, &value)?;
    }

    // Blob store
    if let Some((name, value)) = var("PART_CONCURRENCY") {
        config.blobstore.part_concurrency = parse_number(&name, &value)?;
    }

    // Provider secrets
    for (provider_name, provider) in config.providers.iter_mut() {
        let key = provider_name.to_uppercase().replace(['-', '.'], "_");
        let secret = |field: &str| var(&format!("{}_{}", key, field)).map(|(_, value)| value);
        match provider {
            ProviderConfig::S3(s3) => {
                if let Some(value) = secret("ACCESS_KEY_ID") {
                    s3.access_key_id = Some(value);
                }
                if let Some(value) = secret("SECRET_ACCESS_KEY") {
                    s3.secret_access_key = Some(value);
                }
                if let Some(value) = secret("ENDPOINT") {
                    s3.endpoint = Some(value);
                }
            }
            ProviderConfig::AzureBlob(azure) => {
                if let Some(value) = secret("ACCOUNT_KEY") {
                    azure.account_key = Some(value);
                }
                if let Some(value) = secret("CONNECTION_STRING") {
                    azure.connection_string = Some(value);
                }
            }
            ProviderConfig::Swift(swift) => {
                if let Some(value) = secret("PASSWORD") {
                    swift.password = value;
                }
                if let Some(value) = secret("TEMP_URL_KEY") {
                    swift.temp_url_key = Some(value);
                }
            }
            ProviderConfig::GoogleCompute(gce) => {
                if let Some(value) = secret("ACCESS_TOKEN") {
                    gce.access_token = value;
                }
            }
            ProviderConfig::Transient | ProviderConfig::Filesystem(_) => {}
        }
    }

    Ok(())
}

/// Deep-merge `overlay` into `base`
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_var_parsing_error(name, value, "expected a non-negative integer"))
}

/// Parse boolean from string (accepts: true, false, yes, no, 1, 0, on, off)
fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::env_var_parsing_error(
            name,
            value,
            "expected 'true', 'false', 'yes', 'no', '1', '0', 'on', or 'off'",
        )),
    }
}
