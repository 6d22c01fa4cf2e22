// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Region-scoped blob store context
//!
//! Multi-region providers (Swift, S3) expose one [`BlobStore`] per region.
//! The context keeps them side by side and hands out the store for a region,
//! so callers pick a region once and every call after that is routed there.

use crate::{BlobRequestSigner, BlobStore};
use cloudmux_core::{CloudError, CloudResult, Location};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Blob stores of one provider, keyed by region id
#[derive(Clone)]
pub struct RegionScopedBlobStoreContext {
    provider: String,
    stores: BTreeMap<String, Arc<dyn BlobStore>>,
    default_region: String,
    default_store: Arc<dyn BlobStore>,
}

impl fmt::Debug for RegionScopedBlobStoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionScopedBlobStoreContext")
            .field("provider", &self.provider)
            .field("regions", &self.stores.keys().collect::<Vec<_>>())
            .field("default_region", &self.default_region)
            .finish()
    }
}

impl RegionScopedBlobStoreContext {
    /// Group per-region stores
    ///
    /// `default_region` must be one of the regions; when `None` the first
    /// region in lexical order is the default.
    pub fn new(
        provider: impl Into<String>,
        stores: BTreeMap<String, Arc<dyn BlobStore>>,
        default_region: Option<&str>,
    ) -> CloudResult<Self> {
        let provider = provider.into();
        let (default_region, default_store) = match default_region {
            Some(region) => match stores.get(region) {
                Some(store) => (region.to_string(), Arc::clone(store)),
                None => {
                    return Err(CloudError::illegal_argument(format!(
                        "default region {} is not configured for {}",
                        region, provider
                    )))
                }
            },
            None => stores
                .iter()
                .next()
                .map(|(region, store)| (region.clone(), Arc::clone(store)))
                .ok_or_else(|| {
                    CloudError::illegal_argument(format!(
                        "no regions configured for {}",
                        provider
                    ))
                })?,
        };

        debug!(
            provider = %provider,
            regions = stores.len(),
            default_region = %default_region,
            "region-scoped blob store context ready"
        );
        Ok(RegionScopedBlobStoreContext {
            provider,
            stores,
            default_region,
            default_store,
        })
    }

    /// Context around a single store, registered under `region`
    pub fn single(region: impl Into<String>, store: Arc<dyn BlobStore>) -> Self {
        let region = region.into();
        let provider = store.provider_id().to_string();
        let mut stores = BTreeMap::new();
        stores.insert(region.clone(), Arc::clone(&store));
        RegionScopedBlobStoreContext {
            provider,
            stores,
            default_region: region,
            default_store: store,
        }
    }

    /// Provider identifier
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Regions with a store, in lexical order
    pub fn configured_regions(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }

    /// Region used by [`default_blob_store`](Self::default_blob_store)
    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Store of a region
    pub fn blob_store(&self, region: &str) -> CloudResult<Arc<dyn BlobStore>> {
        self.stores.get(region).cloned().ok_or_else(|| {
            CloudError::illegal_argument(format!(
                "region {} is not configured for {} (available: {})",
                region,
                self.provider,
                self.configured_regions().join(", ")
            ))
        })
    }

    /// Store of the default region
    pub fn default_blob_store(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.default_store)
    }

    /// Store owning a location, resolved through its region
    pub fn blob_store_for(&self, location: &Location) -> CloudResult<Arc<dyn BlobStore>> {
        match location.region_id() {
            Some(region) => self.blob_store(region),
            None => Ok(self.default_blob_store()),
        }
    }

    /// URL signer of a region
    pub fn signer(&self, region: &str) -> CloudResult<&dyn BlobRequestSigner> {
        let store = self.stores.get(region).ok_or_else(|| {
            CloudError::illegal_argument(format!(
                "region {} is not configured for {}",
                region, self.provider
            ))
        })?;
        store
            .signer()
            .ok_or_else(|| CloudError::unsupported(self.provider.clone(), "signer"))
    }
}

/// Reject a location that belongs to another region
///
/// Locations without a region (provider-wide) are accepted.
pub fn ensure_location_in_region(region: &str, location: Option<&Location>) -> CloudResult<()> {
    let Some(location) = location else {
        return Ok(());
    };
    match location.region_id() {
        Some(requested) if requested != region => Err(CloudError::illegal_argument(format!(
            "location {} is outside region {}",
            location, region
        ))),
        _ => Ok(()),
    }
}
