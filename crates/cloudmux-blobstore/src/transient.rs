// cloudmux - one API over many clouds
// Copyright (C) 2025 cloudmux Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! In-memory blob store
//!
//! Provides a thread-safe, in-memory implementation of [`BlobStore`](crate::BlobStore)
//! using `Arc<RwLock<..>>` for concurrent access. Clones share state, which
//! makes it convenient for tests and for wiring examples without a cloud
//! account.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cloudmux_blobstore::{Blob, BlobStore, GetOptions, PutOptions};
//! use cloudmux_blobstore::transient::TransientBlobStore;
//!
//! #[tokio::main]
//! async fn main() -> cloudmux_core::CloudResult<()> {
//!     let store = TransientBlobStore::new();
//!     store.create_container("test").await?;
//!
//!     let blob = Blob::builder("hello.txt").payload("hello world").build();
//!     store.put_blob("test", blob, &PutOptions::default()).await?;
//!
//!     let blob = store.get_blob("test", "hello.txt", &GetOptions::default()).await?;
//!     assert_eq!(blob.unwrap().payload, "hello world");
//!
//!     store.remove_blob("test", "hello.txt").await?;
//!     Ok(())
//! }
//! ```

use crate::domain::{
    Blob, BlobAccess, BlobMetadata, ContainerAccess, PageSet, StorageMetadata,
};
use crate::listing::apply_listing;
use crate::multipart::{
    composite_etag, put_multipart_blob, validate_parts, MultipartPart, MultipartUpload,
    DEFAULT_PART_CONCURRENCY,
};
use crate::options::{CreateContainerOptions, GetOptions, ListContainerOptions, PutOptions};
use crate::{check_blob_name, check_container_name, BlobStore};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use cloudmux_core::{CloudError, CloudResult, Location};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Provider id of the in-memory store
pub const PROVIDER_ID: &str = "transient";

/// Hex SHA-256 of a payload, used as etag by the in-process stores
pub fn content_etag(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

#[derive(Debug, Clone)]
struct StoredBlob {
    metadata: BlobMetadata,
    payload: Bytes,
    access: BlobAccess,
}

#[derive(Debug)]
struct TransientContainer {
    created: DateTime<Utc>,
    access: ContainerAccess,
    blobs: BTreeMap<String, StoredBlob>,
}

#[derive(Debug)]
struct PendingUpload {
    container: String,
    parts: BTreeMap<u32, (MultipartPart, Bytes)>,
}

#[derive(Debug, Default)]
struct TransientState {
    containers: BTreeMap<String, TransientContainer>,
    uploads: HashMap<String, PendingUpload>,
}

/// Part size limits of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    /// Smallest part
    pub min: u64,
    /// Largest part
    pub max: u64,
    /// Most parts
    pub max_parts: u32,
}

impl Default for PartLimits {
    fn default() -> Self {
        PartLimits {
            min: crate::DEFAULT_MIN_PART_SIZE,
            max: crate::DEFAULT_MAX_PART_SIZE,
            max_parts: crate::DEFAULT_MAX_PARTS,
        }
    }
}

/// In-memory blob store
///
/// # Thread Safety
///
/// This implementation is `Send + Sync` and can be safely shared across
/// threads and async tasks.
#[derive(Clone)]
pub struct TransientBlobStore {
    state: Arc<RwLock<TransientState>>,
    location: Location,
    limits: PartLimits,
}

impl TransientBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        TransientBlobStore {
            state: Arc::new(RwLock::new(TransientState::default())),
            location: Location::region("default", Location::provider(PROVIDER_ID)),
            limits: PartLimits::default(),
        }
    }

    /// Override the multipart part limits
    pub fn with_part_limits(mut self, limits: PartLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Report blobs and containers in another location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Number of containers
    pub async fn container_count(&self) -> usize {
        self.state.read().await.containers.len()
    }

    /// Number of unfinished multipart uploads
    pub async fn pending_uploads(&self) -> usize {
        self.state.read().await.uploads.len()
    }

    /// Drop everything
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.containers.clear();
        state.uploads.clear();
    }

    fn store_blob(
        &self,
        container: &mut TransientContainer,
        container_name: &str,
        mut metadata: BlobMetadata,
        payload: Bytes,
        access: BlobAccess,
        etag: String,
    ) -> String {
        let now = Utc::now();
        metadata.container = container_name.to_string();
        metadata.etag = Some(etag.clone());
        metadata.last_modified = Some(now);
        metadata.size = Some(payload.len() as u64);
        metadata.content.content_length = Some(payload.len() as u64);
        metadata.location = Some(self.location.clone());
        metadata.public_uri = None;

        container.blobs.insert(
            metadata.name.clone(),
            StoredBlob {
                metadata,
                payload,
                access,
            },
        );
        etag
    }
}

impl Default for TransientBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransientBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientBlobStore")
            .field("location", &self.location.id)
            .finish()
    }
}

fn missing_container(container: &str) -> CloudError {
    CloudError::container_not_found(container)
}

#[async_trait]
impl BlobStore for TransientBlobStore {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    async fn list_assignable_locations(&self) -> CloudResult<Vec<Location>> {
        Ok(vec![self.location.clone()])
    }

    async fn list_containers(
        &self,
        options: &ListContainerOptions,
    ) -> CloudResult<PageSet<StorageMetadata>> {
        let state = self.state.read().await;
        let entries = state.containers.iter().map(|(name, c)| {
            StorageMetadata::container(name.clone())
                .with_creation_date(c.created)
                .with_location(self.location.clone())
        });
        Ok(apply_listing(entries, &options.clone().recursive()))
    }

    async fn container_exists(&self, container: &str) -> CloudResult<bool> {
        check_container_name(container)?;
        Ok(self.state.read().await.containers.contains_key(container))
    }

    async fn create_container_in_location(
        &self,
        location: Option<&Location>,
        container: &str,
        options: &CreateContainerOptions,
    ) -> CloudResult<bool> {
        check_container_name(container)?;
        if let Some(location) = location {
            if location.region_id().is_some_and(|r| Some(r) != self.location.region_id()) {
                return Err(CloudError::illegal_argument(format!(
                    "location {} is not assignable",
                    location
                )));
            }
        }

        let mut state = self.state.write().await;
        if state.containers.contains_key(container) {
            return Ok(false);
        }
        state.containers.insert(
            container.to_string(),
            TransientContainer {
                created: Utc::now(),
                access: if options.public_read {
                    ContainerAccess::PublicRead
                } else {
                    ContainerAccess::Private
                },
                blobs: BTreeMap::new(),
            },
        );
        debug!(container, "created container");
        Ok(true)
    }

    async fn container_access(&self, container: &str) -> CloudResult<ContainerAccess> {
        let state = self.state.read().await;
        state
            .containers
            .get(container)
            .map(|c| c.access)
            .ok_or_else(|| missing_container(container))
    }

    async fn set_container_access(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> CloudResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| missing_container(container))?;
        entry.access = access;
        Ok(())
    }

    async fn list(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> CloudResult<PageSet<StorageMetadata>> {
        let state = self.state.read().await;
        let entry = state
            .containers
            .get(container)
            .ok_or_else(|| missing_container(container))?;
        let blobs = entry
            .blobs
            .values()
            .map(|b| b.metadata.to_storage_metadata());
        Ok(apply_listing(blobs, options))
    }

    async fn delete_container_if_empty(&self, container: &str) -> CloudResult<bool> {
        let mut state = self.state.write().await;
        match state.containers.get(container) {
            None => Ok(true),
            Some(entry) if !entry.blobs.is_empty() => Ok(false),
            Some(_) => {
                state.containers.remove(container);
                debug!(container, "deleted container");
                Ok(true)
            }
        }
    }

    async fn put_blob(
        &self,
        container: &str,
        blob: Blob,
        options: &PutOptions,
    ) -> CloudResult<String> {
        check_blob_name(container, blob.name())?;
        if options.multipart {
            return put_multipart_blob(self, container, blob, options, DEFAULT_PART_CONCURRENCY)
                .await;
        }

        let etag = content_etag(&blob.payload);
        let mut state = self.state.write().await;
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| missing_container(container))?;
        Ok(self.store_blob(
            entry,
            container,
            blob.metadata,
            blob.payload,
            options.blob_access,
            etag,
        ))
    }

    async fn blob_metadata(
        &self,
        container: &str,
        name: &str,
    ) -> CloudResult<Option<BlobMetadata>> {
        check_blob_name(container, name)?;
        let state = self.state.read().await;
        let entry = state
            .containers
            .get(container)
            .ok_or_else(|| missing_container(container))?;
        Ok(entry.blobs.get(name).map(|b| b.metadata.clone()))
    }

    async fn get_blob(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> CloudResult<Option<Blob>> {
        check_blob_name(container, name)?;
        let state = self.state.read().await;
        let entry = state
            .containers
            .get(container)
            .ok_or_else(|| missing_container(container))?;
        let Some(stored) = entry.blobs.get(name) else {
            return Ok(None);
        };

        if let Some(etag) = &stored.metadata.etag {
            options.check_preconditions(etag)?;
        }

        let mut metadata = stored.metadata.clone();
        let payload = match &options.range {
            Some(range) => {
                let bytes = range.resolve(stored.payload.len() as u64)?;
                stored.payload.slice(bytes)
            }
            None => stored.payload.clone(),
        };
        metadata.content.content_length = Some(payload.len() as u64);
        Ok(Some(Blob { metadata, payload }))
    }

    async fn remove_blob(&self, container: &str, name: &str) -> CloudResult<()> {
        check_blob_name(container, name)?;
        let mut state = self.state.write().await;
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| missing_container(container))?;
        entry.blobs.remove(name);
        Ok(())
    }

    async fn blob_access(&self, container: &str, name: &str) -> CloudResult<BlobAccess> {
        let state = self.state.read().await;
        let entry = state
            .containers
            .get(container)
            .ok_or_else(|| missing_container(container))?;
        entry
            .blobs
            .get(name)
            .map(|b| b.access)
            .ok_or_else(|| CloudError::key_not_found(container, name))
    }

    async fn set_blob_access(
        &self,
        container: &str,
        name: &str,
        access: BlobAccess,
    ) -> CloudResult<()> {
        let mut state = self.state.write().await;
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| missing_container(container))?;
        let blob = entry
            .blobs
            .get_mut(name)
            .ok_or_else(|| CloudError::key_not_found(container, name))?;
        blob.access = access;
        Ok(())
    }

    async fn initiate_multipart_upload(
        &self,
        container: &str,
        metadata: BlobMetadata,
        options: &PutOptions,
    ) -> CloudResult<MultipartUpload> {
        check_blob_name(container, &metadata.name)?;
        let mut state = self.state.write().await;
        if !state.containers.contains_key(container) {
            return Err(missing_container(container));
        }

        let id = uuid::Uuid::new_v4().to_string();
        state.uploads.insert(
            id.clone(),
            PendingUpload {
                container: container.to_string(),
                parts: BTreeMap::new(),
            },
        );
        let blob_name = metadata.name.clone();
        Ok(MultipartUpload::new(container, blob_name, id, metadata, *options))
    }

    async fn upload_multipart_part(
        &self,
        upload: &MultipartUpload,
        part_number: u32,
        payload: Bytes,
    ) -> CloudResult<MultipartPart> {
        if part_number == 0 || part_number > self.limits.max_parts {
            return Err(CloudError::illegal_argument(format!(
                "part number {} outside 1..={}",
                part_number, self.limits.max_parts
            )));
        }
        if payload.len() as u64 > self.limits.max {
            return Err(CloudError::illegal_argument(format!(
                "part of {} bytes exceeds the {} byte limit",
                payload.len(),
                self.limits.max
            )));
        }

        let mut state = self.state.write().await;
        let pending = state
            .uploads
            .get_mut(&upload.id)
            .ok_or_else(|| CloudError::not_found(format!("multipart upload {}", upload.id)))?;
        let mut part = MultipartPart::new(part_number, payload.len() as u64, content_etag(&payload));
        part.last_modified = Some(Utc::now());
        pending.parts.insert(part_number, (part.clone(), payload));
        Ok(part)
    }

    async fn complete_multipart_upload(
        &self,
        upload: &MultipartUpload,
        parts: &[MultipartPart],
    ) -> CloudResult<String> {
        validate_parts(parts)?;
        let mut state = self.state.write().await;
        let pending = state
            .uploads
            .get(&upload.id)
            .ok_or_else(|| CloudError::not_found(format!("multipart upload {}", upload.id)))?;

        let mut assembled = BytesMut::new();
        for part in parts {
            let (stored, bytes) = pending.parts.get(&part.part_number).ok_or_else(|| {
                CloudError::illegal_argument(format!("part {} was never uploaded", part.part_number))
            })?;
            if stored.etag != part.etag {
                return Err(CloudError::illegal_argument(format!(
                    "etag mismatch for part {}",
                    part.part_number
                )));
            }
            assembled.extend_from_slice(bytes);
        }

        let container = pending.container.clone();
        state.uploads.remove(&upload.id);
        let entry = state
            .containers
            .get_mut(&container)
            .ok_or_else(|| missing_container(&container))?;
        let etag = composite_etag(parts);
        Ok(self.store_blob(
            entry,
            &upload.container,
            upload.metadata.clone(),
            assembled.freeze(),
            upload.options.blob_access,
            etag,
        ))
    }

    async fn abort_multipart_upload(&self, upload: &MultipartUpload) -> CloudResult<()> {
        self.state.write().await.uploads.remove(&upload.id);
        Ok(())
    }

    async fn list_multipart_upload(
        &self,
        upload: &MultipartUpload,
    ) -> CloudResult<Vec<MultipartPart>> {
        let state = self.state.read().await;
        let pending = state
            .uploads
            .get(&upload.id)
            .ok_or_else(|| CloudError::not_found(format!("multipart upload {}", upload.id)))?;
        Ok(pending.parts.values().map(|(part, _)| part.clone()).collect())
    }

    fn minimum_multipart_part_size(&self) -> u64 {
        self.limits.min
    }

    fn maximum_multipart_part_size(&self) -> u64 {
        self.limits.max
    }

    fn maximum_number_of_parts(&self) -> u32 {
        self.limits.max_parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(container: &str) -> TransientBlobStore {
        let store = TransientBlobStore::new();
        store.create_container(container).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_new() {
        let store = TransientBlobStore::new();
        assert_eq!(store.container_count().await, 0);
        assert_eq!(store.provider_id(), "transient");
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = TransientBlobStore::new();
        assert!(store.create_container("c").await.unwrap());
        assert!(!store.create_container("c").await.unwrap());
        assert_eq!(store.container_count().await, 1);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = store_with("c").await;
        let etag = store
            .put_blob("c", Blob::builder("k").payload("data").build(), &PutOptions::default())
            .await
            .unwrap();
        assert_eq!(etag, content_etag(b"data"));

        let blob = store.get_blob("c", "k", &GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(blob.payload, Bytes::from_static(b"data"));
        assert_eq!(blob.metadata.container, "c");
        assert_eq!(blob.metadata.etag.as_deref(), Some(etag.as_str()));
    }

    #[tokio::test]
    async fn test_missing_container() {
        let store = TransientBlobStore::new();
        let err = store
            .put_blob("nope", Blob::builder("k").build(), &PutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ContainerNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_names_rejected() {
        let store = store_with("c").await;
        assert!(store.create_container("").await.is_err());
        assert!(store.remove_blob("c", "").await.is_err());
        assert!(store.blob_metadata("c", "").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_missing_blob_succeeds() {
        let store = store_with("c").await;
        store.remove_blob("c", "ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_range_read() {
        let store = store_with("c").await;
        store
            .put_blob("c", Blob::builder("k").payload("0123456789").build(), &PutOptions::default())
            .await
            .unwrap();

        let blob = store
            .get_blob("c", "k", &GetOptions::range(crate::ByteRange::new(2, 4)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blob.payload, Bytes::from_static(b"234"));
        assert_eq!(blob.metadata.content.content_length, Some(3));
    }

    #[tokio::test]
    async fn test_delete_container_if_empty() {
        let store = store_with("c").await;
        store
            .put_blob("c", Blob::builder("k").build(), &PutOptions::default())
            .await
            .unwrap();
        assert!(!store.delete_container_if_empty("c").await.unwrap());
        store.remove_blob("c", "k").await.unwrap();
        assert!(store.delete_container_if_empty("c").await.unwrap());
        assert!(!store.container_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_blob_access() {
        let store = store_with("c").await;
        let options = PutOptions::default().with_blob_access(BlobAccess::PublicRead);
        store
            .put_blob("c", Blob::builder("k").build(), &options)
            .await
            .unwrap();
        assert_eq!(store.blob_access("c", "k").await.unwrap(), BlobAccess::PublicRead);
        store.set_blob_access("c", "k", BlobAccess::Private).await.unwrap();
        assert_eq!(store.blob_access("c", "k").await.unwrap(), BlobAccess::Private);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let store1 = store_with("c").await;
        let store2 = store1.clone();
        assert!(store2.container_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_debug_impl() {
        let store = TransientBlobStore::new();
        assert!(format!("{:?}", store).contains("TransientBlobStore"));
    }
}
