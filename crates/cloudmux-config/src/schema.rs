// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::{ConfigError, ConfigResult};
use cloudmux_core::{HttpSettings, PollSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Named provider instances
    pub providers: BTreeMap<String, ProviderConfig>,

    /// REST client tuning shared by every adapter
    pub http: HttpConfig,

    /// Operation and copy polling
    pub polling: PollingConfig,

    /// Blob store tuning
    pub blobstore: BlobStoreConfig,

    /// Logging
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Provider configuration by name
    pub fn provider(&self, name: &str) -> ConfigResult<&ProviderConfig> {
        self.providers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))
    }

    /// Add or replace a provider
    pub fn set_provider(&mut self, name: impl Into<String>, provider: ProviderConfig) {
        self.providers.insert(name.into(), provider);
    }

    /// Configured provider names, sorted
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

/// One provider instance, tagged by `provider`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider")]
pub enum ProviderConfig {
    /// In-memory blob store
    #[serde(rename = "transient")]
    Transient,

    /// Directory-backed blob store
    #[serde(rename = "filesystem")]
    Filesystem(FilesystemProvider),

    /// AWS S3 or an S3-compatible service
    #[serde(rename = "s3")]
    S3(S3Provider),

    /// Azure Blob Storage
    #[serde(rename = "azureblob")]
    AzureBlob(AzureBlobProvider),

    /// OpenStack Swift behind Keystone v3
    #[serde(rename = "swift")]
    Swift(SwiftProvider),

    /// Google Compute Engine operations
    #[serde(rename = "google-compute")]
    GoogleCompute(GoogleComputeProvider),
}

impl ProviderConfig {
    /// Provider identifier as written in configuration files
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Transient => "transient",
            ProviderConfig::Filesystem(_) => "filesystem",
            ProviderConfig::S3(_) => "s3",
            ProviderConfig::AzureBlob(_) => "azureblob",
            ProviderConfig::Swift(_) => "swift",
            ProviderConfig::GoogleCompute(_) => "google-compute",
        }
    }

    /// Whether the provider offers blob storage
    pub fn is_blobstore(&self) -> bool {
        !self.is_compute()
    }

    /// Whether the provider offers compute operations
    pub fn is_compute(&self) -> bool {
        matches!(self, ProviderConfig::GoogleCompute(_))
    }
}

/// Filesystem provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilesystemProvider {
    /// Directory holding one sub-directory per container
    pub base_dir: PathBuf,
}

/// S3 provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct S3Provider {
    /// Regions to open a store in; empty means `us-east-1`
    #[serde(default)]
    pub regions: Vec<String>,

    /// Region used when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,

    /// S3-compatible endpoint (MinIO, LocalStack)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Static access key id (can be overridden via env)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    /// Static secret access key (can be overridden via env)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    /// Path-style bucket addressing
    #[serde(default)]
    pub force_path_style: bool,
}

/// Azure Blob provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AzureBlobProvider {
    /// Storage account name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Base64 account key (can be overridden via env)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,

    /// Blob service endpoint; defaults to the public cloud
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Connection string (alternative to account/account_key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

/// Swift provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwiftProvider {
    /// Keystone v3 endpoint
    pub identity_endpoint: String,

    /// User name
    pub username: String,

    /// Password (can be overridden via env)
    #[serde(default)]
    pub password: String,

    /// Domain of the user
    #[serde(default = "default_domain")]
    pub user_domain: String,

    /// Project (tenant) name
    pub project: String,

    /// Domain of the project
    #[serde(default = "default_domain")]
    pub project_domain: String,

    /// Regions to expose; empty means every catalog region
    #[serde(default)]
    pub regions: Vec<String>,

    /// Region used when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,

    /// Catalog interface
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Account TempURL key (can be overridden via env)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_url_key: Option<String>,
}

/// Google Compute provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleComputeProvider {
    /// Project id
    pub project: String,

    /// OAuth2 bearer token (can be overridden via env)
    #[serde(default)]
    pub access_token: String,

    /// API endpoint; defaults to the public one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// REST client tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// First retry delay in milliseconds
    pub retry_delay_ms: u64,

    /// Retry delay cap in milliseconds
    pub max_retry_delay_ms: u64,

    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle pooled connections per host
    pub max_idle_per_host: usize,

    /// User-Agent override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let defaults = HttpSettings::default();
        HttpConfig {
            max_retries: defaults.max_retries,
            retry_delay_ms: millis(defaults.retry_delay),
            max_retry_delay_ms: millis(defaults.max_retry_delay),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            max_idle_per_host: defaults.max_idle_per_host,
            user_agent: None,
        }
    }
}

impl HttpConfig {
    /// Settings for a [`RestClient`](cloudmux_core::RestClient)
    pub fn to_settings(&self) -> HttpSettings {
        let defaults = HttpSettings::default();
        HttpSettings {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_idle_per_host: self.max_idle_per_host,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

/// Polling timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// Give up after this many seconds
    pub timeout_secs: u64,

    /// First sleep in milliseconds
    pub initial_period_ms: u64,

    /// Longest sleep in milliseconds
    pub max_period_ms: u64,

    /// Sleep growth per attempt
    pub backoff_factor: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let defaults = PollSettings::default();
        PollingConfig {
            timeout_secs: defaults.timeout.as_secs(),
            initial_period_ms: millis(defaults.initial_period),
            max_period_ms: millis(defaults.max_period),
            backoff_factor: defaults.backoff_factor,
        }
    }
}

impl PollingConfig {
    /// Settings for a [`RetryablePredicate`](cloudmux_core::RetryablePredicate)
    pub fn to_settings(&self) -> PollSettings {
        PollSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            initial_period: Duration::from_millis(self.initial_period_ms),
            max_period: Duration::from_millis(self.max_period_ms),
            backoff_factor: self.backoff_factor,
        }
    }
}

/// Blob store tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlobStoreConfig {
    /// Parts uploaded at the same time
    pub part_concurrency: usize,

    /// Seconds container lookups stay cached
    pub container_cache_ttl_secs: u64,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        BlobStoreConfig {
            part_concurrency: 4,
            container_cache_ttl_secs: 60,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Level or filter directive (`info`, `cloudmux_blobstore=debug`)
    pub log_level: String,

    /// Log format (pretty, compact, json)
    pub log_format: String,

    /// Log destination (stderr, stdout)
    pub log_output: String,

    /// ANSI colors
    pub use_color: bool,

    /// Timestamps on every line
    pub use_timestamps: bool,

    /// Module path of each event
    pub include_targets: bool,

    /// Thread ids of each event
    pub include_thread_ids: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            log_output: "stderr".to_string(),
            use_color: true,
            use_timestamps: true,
            include_targets: true,
            include_thread_ids: false,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_domain() -> String {
    "Default".to_string()
}

fn default_interface() -> String {
    "public".to_string()
}
