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

//! Uniform blob storage over heterogeneous providers
//!
//! This crate defines the [`BlobStore`] trait and implements it for:
//! - In-memory storage ([`transient::TransientBlobStore`])
//! - Local filesystem ([`filesystem::FilesystemBlobStore`])
//! - AWS S3 and S3-compatible services ([`s3::S3BlobStore`])
//! - Azure Blob Storage ([`azure::AzureBlobStore`])
//! - OpenStack Swift ([`swift::RegionScopedSwiftBlobStore`])
//!
//! # Architecture
//!
//! Every adapter maps a logical operation (`put_blob(container, blob)`) onto
//! its provider's request shape, calls the remote API and maps the answer back
//! onto the [`domain`] model. Providers with several regions expose one store
//! per region, grouped by a [`RegionScopedBlobStoreContext`].
//!
//! ## Core Concepts
//!
//! - **Containers**: top-level namespaces (buckets)
//! - **Blobs**: named payloads with metadata inside a container
//! - **Relative paths**: common prefixes produced by delimiter listings
//! - **Multipart uploads**: payloads sent as numbered parts and committed at once
//!
//! # Examples
//!
//! ```no_run
//! use cloudmux_blobstore::{Blob, BlobStore, ListContainerOptions, PutOptions};
//! use cloudmux_blobstore::transient::TransientBlobStore;
//!
//! #[tokio::main]
//! async fn main() -> cloudmux_core::CloudResult<()> {
//!     let store = TransientBlobStore::new();
//!     store.create_container("photos").await?;
//!
//!     let blob = Blob::builder("2024/cat.jpg")
//!         .payload(vec![0xFF, 0xD8, 0xFF])
//!         .content_type("image/jpeg")
//!         .build();
//!     store.put_blob("photos", blob, &PutOptions::default()).await?;
//!
//!     // Top level listing rolls "2024/cat.jpg" up into "2024/"
//!     let page = store.list("photos", &ListContainerOptions::new()).await?;
//!     assert_eq!(page.items[0].name, "2024/");
//!
//!     store.delete_container("photos").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Implementation Guide
//!
//! When implementing `BlobStore`:
//!
//! 1. Use `#[async_trait]` on the impl block
//! 2. Return [`CloudResult`] and map HTTP failures with `CloudError::from_status`
//! 3. Report a missing container as `CloudError::ContainerNotFound`
//! 4. Return listings sorted by name and honour `max_results`
//! 5. Make `remove_blob` succeed for missing blobs

pub mod azure;
pub mod cache;
pub mod domain;
pub mod filesystem;
pub mod listing;
pub mod multipart;
pub mod options;
pub mod pagination;
pub mod region;
pub mod s3;
pub mod swift;
pub mod transient;

use async_trait::async_trait;
use cloudmux_core::{CloudError, CloudResult, Location};
use reqwest::Method;
use std::fmt::Debug;
use std::time::Duration;
use url::Url;

pub use azure::AzureBlobStore;
pub use cache::{ContainerCache, ContainerInfo};
pub use domain::{
    Blob, BlobAccess, BlobBuilder, BlobMetadata, ContainerAccess, ContentMetadata, PageSet,
    StorageMetadata, StorageType,
};
pub use filesystem::FilesystemBlobStore;
pub use multipart::{MultipartPart, MultipartUpload, PartPlan};
pub use options::{ByteRange, CreateContainerOptions, GetOptions, ListContainerOptions, PutOptions};
pub use region::RegionScopedBlobStoreContext;
pub use s3::S3BlobStore;
pub use swift::RegionScopedSwiftBlobStore;
pub use transient::TransientBlobStore;

/// Default lower bound for a multipart part (5 MiB)
pub const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Default upper bound for a multipart part (5 GiB)
pub const DEFAULT_MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default upper bound on the number of parts
pub const DEFAULT_MAX_PARTS: u32 = 10_000;

/// Blob storage operations
///
/// Implementations must be `Send + Sync + Debug`. Required methods are the
/// provider-specific primitives; provided methods are built on top of them
/// and may be overridden when the provider has a native equivalent (e.g.
/// server-side copy).
///
/// # Errors
///
/// Operations return:
/// - `ContainerNotFound` when the container does not exist
/// - `Authorization` when credentials are rejected
/// - `Unsupported` for features the provider lacks
/// - `IllegalArgument` for empty names or bad ranges
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Provider identifier (`transient`, `filesystem`, `aws-s3`, `azureblob`, `openstack-swift`)
    fn provider_id(&self) -> &str;

    /// Locations a container can be created in
    async fn list_assignable_locations(&self) -> CloudResult<Vec<Location>>;

    /// List containers; only `prefix`, `marker` and `max_results` apply
    async fn list_containers(
        &self,
        options: &ListContainerOptions,
    ) -> CloudResult<PageSet<StorageMetadata>>;

    /// Whether a container exists
    async fn container_exists(&self, container: &str) -> CloudResult<bool>;

    /// Create a container
    ///
    /// Returns `false` when the container already existed. `location` must
    /// belong to the store's region when the store is region-scoped.
    async fn create_container_in_location(
        &self,
        location: Option<&Location>,
        container: &str,
        options: &CreateContainerOptions,
    ) -> CloudResult<bool>;

    /// Current access of a container
    async fn container_access(&self, container: &str) -> CloudResult<ContainerAccess>;

    /// Change the access of a container
    async fn set_container_access(&self, container: &str, access: ContainerAccess)
        -> CloudResult<()>;

    /// One page of a container listing
    async fn list(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> CloudResult<PageSet<StorageMetadata>>;

    /// Delete a container if it holds no blobs
    ///
    /// Returns `true` when the container is gone afterwards.
    async fn delete_container_if_empty(&self, container: &str) -> CloudResult<bool>;

    /// Store a blob and return its etag
    async fn put_blob(&self, container: &str, blob: Blob, options: &PutOptions)
        -> CloudResult<String>;

    /// Metadata of a blob, `None` if it does not exist
    async fn blob_metadata(&self, container: &str, name: &str)
        -> CloudResult<Option<BlobMetadata>>;

    /// Fetch a blob, `None` if it does not exist
    async fn get_blob(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> CloudResult<Option<Blob>>;

    /// Delete a blob; succeeds if it does not exist
    async fn remove_blob(&self, container: &str, name: &str) -> CloudResult<()>;

    /// Start a multipart upload
    async fn initiate_multipart_upload(
        &self,
        container: &str,
        metadata: BlobMetadata,
        options: &PutOptions,
    ) -> CloudResult<MultipartUpload>;

    /// Upload one part; part numbers start at 1
    async fn upload_multipart_part(
        &self,
        upload: &MultipartUpload,
        part_number: u32,
        payload: bytes::Bytes,
    ) -> CloudResult<MultipartPart>;

    /// Commit the listed parts, in order, and return the blob etag
    async fn complete_multipart_upload(
        &self,
        upload: &MultipartUpload,
        parts: &[MultipartPart],
    ) -> CloudResult<String>;

    /// Discard an upload and its parts
    async fn abort_multipart_upload(&self, upload: &MultipartUpload) -> CloudResult<()>;

    /// Parts uploaded so far
    async fn list_multipart_upload(&self, upload: &MultipartUpload)
        -> CloudResult<Vec<MultipartPart>>;

    /// Create a private container in the default location
    async fn create_container(&self, container: &str) -> CloudResult<bool> {
        self.create_container_in_location(None, container, &CreateContainerOptions::default())
            .await
    }

    /// Whether a blob exists
    async fn blob_exists(&self, container: &str, name: &str) -> CloudResult<bool> {
        Ok(self.blob_metadata(container, name).await?.is_some())
    }

    /// Copy a blob, returning the etag of the copy
    ///
    /// The default downloads the source and uploads it again with the same
    /// content and user metadata.
    async fn copy_blob(
        &self,
        from_container: &str,
        from_name: &str,
        to_container: &str,
        to_name: &str,
    ) -> CloudResult<String> {
        let source = self
            .get_blob(from_container, from_name, &GetOptions::default())
            .await?
            .ok_or_else(|| CloudError::key_not_found(from_container, from_name))?;

        let mut metadata = source.metadata;
        metadata.name = to_name.to_string();
        metadata.container = to_container.to_string();
        metadata.etag = None;
        metadata.public_uri = None;
        let blob = Blob {
            metadata,
            payload: source.payload,
        };
        self.put_blob(to_container, blob, &PutOptions::default()).await
    }

    /// Delete several blobs
    async fn remove_blobs(&self, container: &str, names: &[String]) -> CloudResult<()> {
        for name in names {
            self.remove_blob(container, name).await?;
        }
        Ok(())
    }

    /// Delete every blob in a container
    async fn clear_container(&self, container: &str) -> CloudResult<()> {
        pagination::clear_container(self, container, &ListContainerOptions::new().recursive())
            .await
    }

    /// Delete a container and everything in it; missing containers are ignored
    async fn delete_container(&self, container: &str) -> CloudResult<()> {
        if !self.container_exists(container).await? {
            return Ok(());
        }
        self.clear_container(container).await?;
        if self.delete_container_if_empty(container).await? {
            Ok(())
        } else {
            Err(CloudError::illegal_state(format!(
                "container {} still holds blobs after clearing",
                container
            )))
        }
    }

    /// Number of blobs in a container
    async fn count_blobs(&self, container: &str) -> CloudResult<u64> {
        pagination::count_blobs(self, container, &ListContainerOptions::new().recursive()).await
    }

    /// Access of a single blob
    async fn blob_access(&self, _container: &str, _name: &str) -> CloudResult<BlobAccess> {
        Err(CloudError::unsupported(self.provider_id(), "blob_access"))
    }

    /// Change the access of a single blob
    async fn set_blob_access(
        &self,
        _container: &str,
        _name: &str,
        _access: BlobAccess,
    ) -> CloudResult<()> {
        Err(CloudError::unsupported(self.provider_id(), "set_blob_access"))
    }

    /// In-progress multipart uploads of a container
    async fn list_multipart_uploads(&self, _container: &str) -> CloudResult<Vec<MultipartUpload>> {
        Err(CloudError::unsupported(self.provider_id(), "list_multipart_uploads"))
    }

    /// Smallest allowed part (except the last)
    fn minimum_multipart_part_size(&self) -> u64 {
        DEFAULT_MIN_PART_SIZE
    }

    /// Largest allowed part
    fn maximum_multipart_part_size(&self) -> u64 {
        DEFAULT_MAX_PART_SIZE
    }

    /// Largest number of parts per upload
    fn maximum_number_of_parts(&self) -> u32 {
        DEFAULT_MAX_PARTS
    }

    /// Pre-authorized URL signer, if the provider supports one
    fn signer(&self) -> Option<&dyn BlobRequestSigner> {
        None
    }
}

/// A request anyone can send without credentials until it expires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// HTTP method
    pub method: Method,
    /// Full URL including the signature
    pub url: Url,
    /// Headers that must accompany the request
    pub headers: Vec<(String, String)>,
}

impl SignedRequest {
    /// Request without extra headers
    pub fn new(method: Method, url: Url) -> Self {
        SignedRequest {
            method,
            url,
            headers: Vec::new(),
        }
    }

    /// Add a required header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Produces pre-authorized blob URLs
#[async_trait]
pub trait BlobRequestSigner: Send + Sync + Debug {
    /// Download URL valid for `expires_in`
    async fn sign_get_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest>;

    /// Upload URL valid for `expires_in`
    async fn sign_put_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest>;

    /// Delete URL valid for `expires_in`
    async fn sign_remove_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest>;
}

/// Reject empty container names
pub(crate) fn check_container_name(container: &str) -> CloudResult<()> {
    if container.is_empty() {
        return Err(CloudError::illegal_argument("container name cannot be empty"));
    }
    Ok(())
}

/// Reject empty container or blob names
pub(crate) fn check_blob_name(container: &str, name: &str) -> CloudResult<()> {
    check_container_name(container)?;
    if name.is_empty() {
        return Err(CloudError::illegal_argument("blob name cannot be empty"));
    }
    Ok(())
}
