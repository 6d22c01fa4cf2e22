// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider contexts built from configuration
//!
//! A [`ContextBuilder`] owns a validated [`Config`] and one shared
//! [`RestClient`]. Asking it for a provider by name yields either a
//! [`BlobStoreContext`] (one store per region) or a [`ComputeContext`]
//! (operation lookups plus a waiter).

use crate::error::{Error, Result};
use cloudmux_blobstore::azure::auth::AzureCredentials;
use cloudmux_blobstore::s3::{self, S3Config};
use cloudmux_blobstore::swift::keystone::KeystoneCredentials;
use cloudmux_blobstore::swift::{self, SwiftConfig};
use cloudmux_blobstore::{
    AzureBlobStore, BlobStore, FilesystemBlobStore, RegionScopedBlobStoreContext,
    TransientBlobStore,
};
use cloudmux_compute::{GoogleComputeApi, Operation, OperationApi, OperationWaiter};
use cloudmux_config::{
    AzureBlobProvider, Config, ConfigError, ConfigLoader, GoogleComputeProvider, ProviderConfig,
    S3Provider, SwiftProvider, Validator,
};
use cloudmux_core::{CloudResult, PollSettings, RestClient};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Blob stores of one configured provider, keyed by region
pub type BlobStoreContext = RegionScopedBlobStoreContext;

/// Region registered for single-location stores
const DEFAULT_REGION: &str = "default";

/// Compute operations of one configured provider
#[derive(Clone)]
pub struct ComputeContext {
    provider: String,
    api: Arc<dyn OperationApi>,
    waiter: OperationWaiter,
}

impl fmt::Debug for ComputeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeContext")
            .field("provider", &self.provider)
            .field("api", &self.api)
            .field("poll", self.waiter.settings())
            .finish()
    }
}

impl ComputeContext {
    /// Context around an operations API
    pub fn new(
        provider: impl Into<String>,
        api: Arc<dyn OperationApi>,
        poll: PollSettings,
    ) -> Self {
        ComputeContext {
            provider: provider.into(),
            waiter: OperationWaiter::with_settings(Arc::clone(&api), poll),
            api,
        }
    }

    /// Provider name in the configuration
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Operation lookups
    pub fn api(&self) -> Arc<dyn OperationApi> {
        Arc::clone(&self.api)
    }

    /// Waiter using the configured poll timing
    pub fn waiter(&self) -> &OperationWaiter {
        &self.waiter
    }

    /// Block until `operation` finishes
    pub async fn wait(&self, operation: Operation) -> CloudResult<Operation> {
        self.waiter.wait(operation).await
    }
}

/// Either kind of provider context
#[derive(Debug, Clone)]
pub enum ProviderContext {
    /// Blob storage
    BlobStore(BlobStoreContext),
    /// Compute operations
    Compute(ComputeContext),
}

/// Builds provider contexts from a configuration
#[derive(Clone)]
pub struct ContextBuilder {
    config: Config,
    http: RestClient,
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("providers", &self.config.provider_names())
            .field("http", &self.http)
            .finish()
    }
}

impl ContextBuilder {
    /// Validate `config` and prepare the shared HTTP client
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let http = RestClient::new(config.http.to_settings())?;
        Ok(ContextBuilder { config, http })
    }

    /// Builder for a configuration file, with `CLOUDMUX_*` overrides applied
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = ConfigLoader::new().load_with_overrides(path).await?;
        Self::new(config)
    }

    /// Share an existing client instead of the one built from `[http]`
    pub fn with_http_client(mut self, http: RestClient) -> Self {
        self.http = http;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Install the logging subscriber described by `[observability]`
    pub fn init_logging(&self) -> Result<()> {
        cloudmux_observability::init_from_settings(&self.config.observability)?;
        Ok(())
    }

    /// Context for any configured provider
    pub async fn build(&self, name: &str) -> Result<ProviderContext> {
        match self.config.provider(name)? {
            ProviderConfig::GoogleCompute(gce) => {
                Ok(ProviderContext::Compute(self.compute(name, gce)?))
            }
            provider => Ok(ProviderContext::BlobStore(
                self.blob_store(name, provider).await?,
            )),
        }
    }

    /// Blob store context for a storage provider
    pub async fn blob_store_context(&self, name: &str) -> Result<BlobStoreContext> {
        let provider = self.config.provider(name)?;
        if !provider.is_blobstore() {
            return Err(wrong_service(name, provider, "blob store"));
        }
        self.blob_store(name, provider).await
    }

    /// Compute context for a compute provider
    pub fn compute_context(&self, name: &str) -> Result<ComputeContext> {
        match self.config.provider(name)? {
            ProviderConfig::GoogleCompute(gce) => self.compute(name, gce),
            provider => Err(wrong_service(name, provider, "compute")),
        }
    }

    async fn blob_store(&self, name: &str, provider: &ProviderConfig) -> Result<BlobStoreContext> {
        let context = match provider {
            ProviderConfig::Transient => RegionScopedBlobStoreContext::single(
                DEFAULT_REGION,
                Arc::new(TransientBlobStore::new()),
            ),
            ProviderConfig::Filesystem(fs) => {
                let store = FilesystemBlobStore::new(&fs.base_dir).await?;
                RegionScopedBlobStoreContext::single("local", Arc::new(store))
            }
            ProviderConfig::S3(s3) => self.s3_context(s3).await?,
            ProviderConfig::AzureBlob(azure) => self.azure_context(name, azure)?,
            ProviderConfig::Swift(swift) => self.swift_context(swift).await?,
            ProviderConfig::GoogleCompute(_) => {
                return Err(wrong_service(name, provider, "blob store"))
            }
        };

        info!(
            provider = %name,
            kind = provider.kind(),
            regions = ?context.configured_regions(),
            "blob store context ready"
        );
        Ok(context)
    }

    async fn s3_context(&self, provider: &S3Provider) -> Result<BlobStoreContext> {
        let mut base = match provider.default_region.as_ref().or(provider.regions.first()) {
            Some(region) => S3Config::new(region.clone()),
            None => S3Config::default(),
        };
        if let Some(endpoint) = &provider.endpoint {
            base = base.with_endpoint(endpoint.clone());
        }
        if let (Some(id), Some(secret)) = (&provider.access_key_id, &provider.secret_access_key) {
            base = base.with_credentials(id.clone(), secret.clone());
        }
        base.force_path_style |= provider.force_path_style;
        base.part_concurrency = self.config.blobstore.part_concurrency;
        base.max_retries = self.config.http.max_retries + 1;
        base.initial_retry_delay_ms = self.config.http.retry_delay_ms;

        let context =
            s3::region_scoped_context(&base, &provider.regions, provider.default_region.as_deref())
                .await?;
        Ok(context)
    }

    fn azure_context(&self, name: &str, provider: &AzureBlobProvider) -> Result<BlobStoreContext> {
        let store = match &provider.connection_string {
            Some(raw) => AzureBlobStore::from_connection_string(raw, self.http.clone())?,
            None => {
                let account = provider
                    .account
                    .as_deref()
                    .ok_or_else(|| ConfigError::missing(format!("providers.{}.account", name)))?;
                let key = provider.account_key.as_deref().ok_or_else(|| {
                    ConfigError::missing(format!("providers.{}.account_key", name))
                })?;
                let endpoint = provider
                    .endpoint
                    .as_deref()
                    .map(Url::parse)
                    .transpose()
                    .map_err(|e| {
                        ConfigError::invalid_value(
                            format!("providers.{}.endpoint", name),
                            e.to_string(),
                        )
                    })?;
                let credentials = AzureCredentials::new(account, key)?;
                AzureBlobStore::new(credentials, endpoint, self.http.clone())?
            }
        };
        let store = store.with_copy_polling(self.config.polling.to_settings());
        let region = store.account().to_string();
        let store: Arc<dyn BlobStore> = Arc::new(store);
        Ok(RegionScopedBlobStoreContext::single(region, store))
    }

    async fn swift_context(&self, provider: &SwiftProvider) -> Result<BlobStoreContext> {
        let credentials = KeystoneCredentials {
            username: provider.username.clone(),
            password: provider.password.clone(),
            user_domain: provider.user_domain.clone(),
            project: provider.project.clone(),
            project_domain: provider.project_domain.clone(),
        };
        let mut config = SwiftConfig::new(provider.identity_endpoint.clone(), credentials)
            .with_regions(provider.regions.iter().cloned());
        config.default_region = provider.default_region.clone();
        config.interface = provider.interface.clone();
        config.temp_url_key = provider.temp_url_key.clone();
        config.container_cache_ttl =
            Duration::from_secs(self.config.blobstore.container_cache_ttl_secs);

        Ok(swift::region_scoped_context(&config, &self.http).await?)
    }

    fn compute(&self, name: &str, provider: &GoogleComputeProvider) -> Result<ComputeContext> {
        let mut api = GoogleComputeApi::new(
            self.http.clone(),
            provider.project.clone(),
            provider.access_token.clone(),
        )?;
        if let Some(endpoint) = &provider.endpoint {
            api = api.with_endpoint(endpoint)?;
        }

        info!(provider = %name, project = %provider.project, "compute context ready");
        Ok(ComputeContext::new(
            name,
            Arc::new(api),
            self.config.polling.to_settings(),
        ))
    }
}

fn wrong_service(name: &str, provider: &ProviderConfig, wanted: &'static str) -> Error {
    Error::WrongService {
        name: name.to_string(),
        kind: provider.kind(),
        wanted,
    }
}
