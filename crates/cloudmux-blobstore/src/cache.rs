// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Container metadata cache
//!
//! Existence checks and access lookups hit the provider on every blob
//! operation unless they are remembered. [`ContainerCache`] keeps the answer
//! per container name, including negative answers, until the entry is
//! invalidated by a mutation or expires.
//!
//! # Examples
//!
//! ```
//! use cloudmux_blobstore::cache::{ContainerCache, ContainerInfo};
//!
//! #[tokio::main]
//! async fn main() -> cloudmux_core::CloudResult<()> {
//!     let cache = ContainerCache::new(1_000, None);
//!
//!     let info = cache
//!         .get_or_load("logs", || async { Ok(Some(ContainerInfo::new("logs"))) })
//!         .await?;
//!     assert!(info.is_some());
//!
//!     cache.invalidate("logs").await;
//!     Ok(())
//! }
//! ```

use cloudmux_core::CloudResult;
use moka::future::Cache;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// What we remember about a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container name
    pub name: String,
    /// Anonymous read allowed
    pub public_read: bool,
    /// Blob count as of the last lookup
    pub object_count: Option<u64>,
    /// Bytes stored as of the last lookup
    pub bytes_used: Option<u64>,
}

impl ContainerInfo {
    /// Private container with unknown usage
    pub fn new(name: impl Into<String>) -> Self {
        ContainerInfo {
            name: name.into(),
            public_read: false,
            object_count: None,
            bytes_used: None,
        }
    }

    /// Set the public-read flag
    pub fn with_public_read(mut self, public_read: bool) -> Self {
        self.public_read = public_read;
        self
    }
}

/// Load-on-miss cache of container metadata
///
/// `None` values record containers known not to exist.
#[derive(Clone)]
pub struct ContainerCache {
    entries: Cache<String, Option<ContainerInfo>>,
}

impl fmt::Debug for ContainerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for ContainerCache {
    fn default() -> Self {
        Self::new(10_000, None)
    }
}

impl ContainerCache {
    /// Cache holding at most `capacity` containers, optionally expiring entries
    pub fn new(capacity: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        ContainerCache {
            entries: builder.build(),
        }
    }

    /// Cached value, loading it with `load` on a miss
    ///
    /// Errors from `load` are returned and nothing is cached.
    pub async fn get_or_load<F, Fut>(
        &self,
        container: &str,
        load: F,
    ) -> CloudResult<Option<ContainerInfo>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CloudResult<Option<ContainerInfo>>>,
    {
        if let Some(cached) = self.entries.get(container).await {
            debug!(container, "container cache hit");
            return Ok(cached);
        }

        debug!(container, "container cache miss");
        let loaded = load().await?;
        self.entries
            .insert(container.to_string(), loaded.clone())
            .await;
        Ok(loaded)
    }

    /// Cached value without loading
    pub async fn get(&self, container: &str) -> Option<Option<ContainerInfo>> {
        self.entries.get(container).await
    }

    /// Record a container
    pub async fn put(&self, info: ContainerInfo) {
        self.entries.insert(info.name.clone(), Some(info)).await;
    }

    /// Record that a container does not exist
    pub async fn put_missing(&self, container: &str) {
        self.entries.insert(container.to_string(), None).await;
    }

    /// Forget one container
    pub async fn invalidate(&self, container: &str) {
        self.entries.invalidate(container).await;
    }

    /// Forget everything
    pub async fn invalidate_all(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    /// Number of cached containers
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Whether nothing is cached
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudmux_core::CloudError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_loads_once() {
        let cache = ContainerCache::default();
        let loads = AtomicU32::new(0);

        for _ in 0..3 {
            let info = cache
                .get_or_load("photos", || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(ContainerInfo::new("photos").with_public_read(true)))
                })
                .await
                .unwrap();
            assert!(info.unwrap().public_read);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_negative_entries_are_cached() {
        let cache = ContainerCache::default();
        cache.put_missing("gone").await;
        let loads = AtomicU32::new(0);

        let info = cache
            .get_or_load("gone", || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Some(ContainerInfo::new("gone")))
            })
            .await
            .unwrap();
        assert!(info.is_none());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = ContainerCache::default();
        cache.put(ContainerInfo::new("a")).await;
        cache.invalidate("a").await;
        assert!(cache.get("a").await.is_none());

        let info = cache
            .get_or_load("a", || async { Ok(None) })
            .await
            .unwrap();
        assert!(info.is_none());
        assert_eq!(cache.get("a").await, Some(None));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = ContainerCache::default();
        let result = cache
            .get_or_load("x", || async { Err(CloudError::from_status(503, "head", "busy")) })
            .await;
        assert!(result.is_err());
        assert!(cache.get("x").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = ContainerCache::default();
        cache.put(ContainerInfo::new("a")).await;
        cache.put(ContainerInfo::new("b")).await;
        assert_eq!(cache.len().await, 2);

        cache.invalidate_all().await;
        assert!(cache.is_empty().await);
    }
}
