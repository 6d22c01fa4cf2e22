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

//! AWS S3 blob store
//!
//! Implements [`BlobStore`] on top of the official `aws-sdk-s3` client. One
//! store talks to one region; [`region_scoped_context`] builds a store per
//! configured region and groups them.
//!
//! # Features
//!
//! - Delimiter listings with continuation tokens as page markers
//! - Native multipart uploads, including part and upload listing
//! - Canned ACLs for container and blob access
//! - Presigned GET/PUT/DELETE URLs through the SDK
//! - S3-compatible endpoints (MinIO, LocalStack) with path-style addressing
//!
//! # Examples
//!
//! ```no_run
//! use cloudmux_blobstore::s3::{S3BlobStore, S3Config};
//! use cloudmux_blobstore::{Blob, BlobStore, PutOptions};
//!
//! #[tokio::main]
//! async fn main() -> cloudmux_core::CloudResult<()> {
//!     let store = S3BlobStore::with_config(S3Config::new("eu-west-1")).await?;
//!     store.create_container("my-bucket").await?;
//!
//!     let blob = Blob::builder("reports/q1.csv").payload("a,b\n1,2\n").build();
//!     let etag = store.put_blob("my-bucket", blob, &PutOptions::default()).await?;
//!     println!("stored with etag {}", etag);
//!     Ok(())
//! }
//! ```
//!
//! # Authentication
//!
//! Without static keys in [`S3Config`], credentials come from the standard
//! AWS chain (environment, profile files, instance roles).

use crate::domain::{
    Blob, BlobAccess, BlobMetadata, ContainerAccess, ContentMetadata, PageSet, StorageMetadata,
    StorageType,
};
use crate::multipart::{
    put_multipart_blob, validate_parts, MultipartPart, MultipartUpload, DEFAULT_PART_CONCURRENCY,
};
use crate::options::{CreateContainerOptions, GetOptions, ListContainerOptions, PutOptions};
use crate::region::{ensure_location_in_region, RegionScopedBlobStoreContext};
use crate::{check_blob_name, check_container_name, BlobRequestSigner, BlobStore, SignedRequest};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::{PresignedRequest, PresigningConfig};
use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
    CreateBucketConfiguration, Delete, Grant, ObjectCannedAcl, ObjectIdentifier, Permission,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloudmux_core::{CloudError, CloudResult, Location};
use futures::future::{BoxFuture, FutureExt};
use reqwest::Method;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Provider id of the S3 store
pub const PROVIDER_ID: &str = "aws-s3";

/// Grantee URI of anonymous users
const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Keys per DeleteObjects request
const DELETE_BATCH: usize = 1000;

/// Region that must not be sent as a location constraint
const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Configuration for the S3 store
#[derive(Clone)]
pub struct S3Config {
    /// AWS region the store is bound to
    pub region: String,

    /// Optional custom endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,

    /// Static access key id; the default credential chain is used when unset
    pub access_key_id: Option<String>,

    /// Static secret access key
    pub secret_access_key: Option<String>,

    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub force_path_style: bool,

    /// Parts uploaded at the same time (default: 4)
    pub part_concurrency: usize,

    /// Maximum number of attempts for failed operations (default: 3)
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (default: 100ms)
    pub initial_retry_delay_ms: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        S3Config {
            region: DEFAULT_AWS_REGION.to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            part_concurrency: DEFAULT_PART_CONCURRENCY,
            max_retries: 3,
            initial_retry_delay_ms: 100,
        }
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "***"))
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "***"),
            )
            .field("force_path_style", &self.force_path_style)
            .field("part_concurrency", &self.part_concurrency)
            .finish()
    }
}

impl S3Config {
    /// Configuration for a region with the default credential chain
    pub fn new(region: impl Into<String>) -> Self {
        S3Config {
            region: region.into(),
            ..Default::default()
        }
    }

    /// Use an S3-compatible endpoint with path-style addressing
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self.force_path_style = true;
        self
    }

    /// Use static credentials
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Check the configuration before building a client
    pub fn validate(&self) -> CloudResult<()> {
        if self.region.is_empty() {
            return Err(CloudError::illegal_argument("S3 region cannot be empty"));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(CloudError::illegal_argument(
                "S3 access key id and secret access key must be set together",
            ));
        }
        if let Some(endpoint) = &self.endpoint {
            Url::parse(endpoint).map_err(|e| {
                CloudError::illegal_argument(format!("invalid S3 endpoint {}: {}", endpoint, e))
            })?;
        }
        if self.max_retries == 0 {
            return Err(CloudError::illegal_argument("max_retries must be at least 1"));
        }
        Ok(())
    }
}

/// Internal statistics for the S3 store
#[derive(Debug)]
struct S3Stats {
    total_bytes_uploaded: AtomicU64,
    total_bytes_downloaded: AtomicU64,
    total_objects_deleted: AtomicU64,
}

impl S3Stats {
    fn new() -> Self {
        S3Stats {
            total_bytes_uploaded: AtomicU64::new(0),
            total_bytes_downloaded: AtomicU64::new(0),
            total_objects_deleted: AtomicU64::new(0),
        }
    }
}

/// AWS S3 blob store bound to one region
///
/// Clones share the SDK client and statistics.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    config: Arc<S3Config>,
    location: Location,
    stats: Arc<S3Stats>,
}

impl fmt::Debug for S3BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3BlobStore")
            .field("region", &self.config.region)
            .field("endpoint", &self.config.endpoint)
            .field("force_path_style", &self.config.force_path_style)
            .finish()
    }
}

impl S3BlobStore {
    /// Create a store from configuration
    ///
    /// Nothing is sent to S3 here; bad credentials surface on the first call.
    pub async fn with_config(config: S3Config) -> CloudResult<Self> {
        config.validate()?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "cloudmux-static",
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint.clone());
        }

        info!(region = %config.region, "S3 blob store ready");
        Ok(S3BlobStore {
            client: Client::from_conf(builder.build()),
            location: Location::region(config.region.clone(), Location::provider(PROVIDER_ID)),
            config: Arc::new(config),
            stats: Arc::new(S3Stats::new()),
        })
    }

    /// Region of this store
    pub fn region(&self) -> &str {
        &self.config.region
    }

    /// Bytes uploaded, bytes downloaded and objects deleted so far
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.total_bytes_uploaded.load(Ordering::Relaxed),
            self.stats.total_bytes_downloaded.load(Ordering::Relaxed),
            self.stats.total_objects_deleted.load(Ordering::Relaxed),
        )
    }

    /// Perform operation with exponential backoff retry logic
    ///
    /// Only retryable errors (5xx answers) are retried; the SDK already
    /// retries connection failures on its own.
    async fn with_retry<'a, F, T>(&self, context: &str, mut operation: F) -> CloudResult<T>
    where
        F: FnMut() -> BoxFuture<'a, CloudResult<T>>,
    {
        let mut attempt = 1;
        let mut delay_ms = self.config.initial_retry_delay_ms;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {}ms: {}",
                        context, attempt, self.config.max_retries, delay_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms * 2).min(10_000);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn bucket_location(&self, bucket_region: Option<&str>) -> Location {
        match bucket_region {
            Some(region) if region != self.config.region => {
                Location::region(region, Location::provider(PROVIDER_ID))
            }
            _ => self.location.clone(),
        }
    }

    async fn put_simple(&self, container: &str, blob: Blob, access: BlobAccess) -> CloudResult<String> {
        let Blob { metadata, payload } = blob;
        let size = payload.len() as u64;

        let response = self
            .with_retry("put object", || {
                let mut request = self
                    .client
                    .put_object()
                    .bucket(container)
                    .key(&metadata.name)
                    .body(ByteStream::from(payload.clone()))
                    .set_content_type(metadata.content.content_type.clone())
                    .set_content_encoding(metadata.content.content_encoding.clone())
                    .set_content_language(metadata.content.content_language.clone())
                    .set_content_disposition(metadata.content.content_disposition.clone())
                    .set_cache_control(metadata.content.cache_control.clone());
                for (key, value) in &metadata.user_metadata {
                    request = request.metadata(key, value);
                }
                if access == BlobAccess::PublicRead {
                    request = request.acl(ObjectCannedAcl::PublicRead);
                }
                async move {
                    request
                        .send()
                        .await
                        .map_err(|e| sdk_error(e, "put object", container))
                }
                .boxed()
            })
            .await?;

        self.stats
            .total_bytes_uploaded
            .fetch_add(size, Ordering::Relaxed);
        debug!(container, blob = %metadata.name, size, "put object");
        Ok(response.e_tag().map(unquote).unwrap_or_default())
    }

    async fn object_acl_is_public(&self, container: &str, name: &str) -> CloudResult<bool> {
        let response = self
            .client
            .get_object_acl()
            .bucket(container)
            .key(name)
            .send()
            .await
            .map_err(|e| sdk_error(e, "get object acl", container))?;
        Ok(grants_public_read(response.grants()))
    }
}

/// Create one S3 store per region and group them
///
/// An empty `regions` list uses the region of `base`.
pub async fn region_scoped_context(
    base: &S3Config,
    regions: &[String],
    default_region: Option<&str>,
) -> CloudResult<RegionScopedBlobStoreContext> {
    let mut wanted: Vec<String> = regions.to_vec();
    if wanted.is_empty() {
        wanted.push(base.region.clone());
    }

    let mut stores: BTreeMap<String, Arc<dyn BlobStore>> = BTreeMap::new();
    for region in wanted {
        let config = S3Config {
            region: region.clone(),
            ..base.clone()
        };
        stores.insert(region, Arc::new(S3BlobStore::with_config(config).await?));
    }
    let default_region = default_region.or_else(|| {
        stores
            .contains_key(&base.region)
            .then_some(base.region.as_str())
    });
    RegionScopedBlobStoreContext::new(PROVIDER_ID, stores, default_region)
}

/// Fold an SDK failure into a [`CloudError`]
///
/// `NoSuchBucket` becomes `ContainerNotFound`; everything else goes through
/// the shared HTTP status mapping.
fn sdk_error<E>(err: SdkError<E, HttpResponse>, context: &str, bucket: &str) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();

    match (status, code.as_deref()) {
        (_, Some("NoSuchBucket")) => CloudError::container_not_found(bucket),
        (Some(304), _) => CloudError::illegal_state(format!("{}: not modified", context)),
        (Some(status), _) => CloudError::from_status(status, context, message),
        (None, _) => match err {
            SdkError::TimeoutError(_) => {
                CloudError::timeout(format!("{}: {}", context, message))
            }
            _ => CloudError::Other(anyhow::anyhow!("{}: {}", context, message)),
        },
    }
}

fn unquote(etag: &str) -> String {
    cloudmux_core::http::unquote_etag(etag)
}

fn to_chrono(when: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(when.secs(), when.subsec_nanos())
}

fn grants_public_read(grants: &[Grant]) -> bool {
    grants.iter().any(|grant| {
        let anonymous = grant
            .grantee()
            .and_then(|g| g.uri())
            .is_some_and(|uri| uri == ALL_USERS_URI);
        let readable = matches!(
            grant.permission(),
            Some(Permission::Read) | Some(Permission::FullControl)
        );
        anonymous && readable
    })
}

/// Total object size from a `Content-Range: bytes a-b/total` header
fn total_from_content_range(range: &str) -> Option<u64> {
    range.rsplit('/').next().and_then(|total| total.parse().ok())
}

/// Percent-encode a `bucket/key` pair for `x-amz-copy-source`
fn encode_copy_source(bucket: &str, key: &str) -> String {
    let mut out = String::with_capacity(bucket.len() + key.len() + 1);
    out.push_str(bucket);
    out.push('/');
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn part_number(n: u32) -> CloudResult<i32> {
    i32::try_from(n).map_err(|_| CloudError::illegal_argument(format!("part number {} is too large", n)))
}

/// Blob metadata from the headers shared by HeadObject and GetObject
macro_rules! object_metadata {
    ($output:expr, $size:expr, $container:expr, $name:expr, $location:expr) => {{
        let output = &$output;
        BlobMetadata {
            container: $container.to_string(),
            name: $name.to_string(),
            etag: output.e_tag().map(unquote),
            last_modified: output.last_modified().and_then(to_chrono),
            size: $size,
            content: ContentMetadata {
                content_type: output.content_type().map(str::to_string),
                content_length: output.content_length().and_then(|l| u64::try_from(l).ok()),
                content_md5: None,
                content_encoding: output.content_encoding().map(str::to_string),
                content_language: output.content_language().map(str::to_string),
                content_disposition: output.content_disposition().map(str::to_string),
                cache_control: output.cache_control().map(str::to_string),
                expires: None,
            },
            user_metadata: output
                .metadata()
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            public_uri: None,
            location: Some($location),
        }
    }};
}

#[async_trait]
impl BlobStore for S3BlobStore {
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
        let max = i32::try_from(options.page_size()).unwrap_or(i32::MAX);
        let mut request = self.client.list_buckets().max_buckets(max);
        if let Some(prefix) = &options.prefix {
            request = request.prefix(prefix);
        }
        if let Some(marker) = &options.marker {
            request = request.continuation_token(marker);
        }

        let response = request
            .send()
            .await
            .map_err(|e| sdk_error(e, "list buckets", ""))?;

        let items = response
            .buckets()
            .iter()
            .filter_map(|bucket| {
                let name = bucket.name()?;
                let mut entry = StorageMetadata::container(name)
                    .with_location(self.bucket_location(bucket.bucket_region()));
                if let Some(created) = bucket.creation_date().and_then(to_chrono) {
                    entry = entry.with_creation_date(created);
                }
                Some(entry)
            })
            .collect();

        Ok(PageSet::new(
            items,
            response.continuation_token().map(str::to_string),
        ))
    }

    async fn container_exists(&self, container: &str) -> CloudResult<bool> {
        check_container_name(container)?;
        match self.client.head_bucket().bucket(container).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = sdk_error(e, "head bucket", container);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn create_container_in_location(
        &self,
        location: Option<&Location>,
        container: &str,
        options: &CreateContainerOptions,
    ) -> CloudResult<bool> {
        check_container_name(container)?;
        ensure_location_in_region(&self.config.region, location)?;

        let mut request = self.client.create_bucket().bucket(container);
        if self.config.region != DEFAULT_AWS_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.config.region.as_str(),
                    ))
                    .build(),
            );
        }
        if options.public_read {
            request = request.acl(BucketCannedAcl::PublicRead);
        }

        match request.send().await {
            Ok(_) => {
                info!(container, region = %self.config.region, "created bucket");
                Ok(true)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_bucket_already_owned_by_you()) =>
            {
                debug!(container, "bucket already exists");
                Ok(false)
            }
            Err(e) => Err(sdk_error(e, "create bucket", container)),
        }
    }

    async fn container_access(&self, container: &str) -> CloudResult<ContainerAccess> {
        check_container_name(container)?;
        let response = self
            .client
            .get_bucket_acl()
            .bucket(container)
            .send()
            .await
            .map_err(|e| sdk_error(e, "get bucket acl", container))?;
        Ok(if grants_public_read(response.grants()) {
            ContainerAccess::PublicRead
        } else {
            ContainerAccess::Private
        })
    }

    async fn set_container_access(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> CloudResult<()> {
        check_container_name(container)?;
        let acl = match access {
            ContainerAccess::PublicRead => BucketCannedAcl::PublicRead,
            ContainerAccess::Private => BucketCannedAcl::Private,
        };
        self.client
            .put_bucket_acl()
            .bucket(container)
            .acl(acl)
            .send()
            .await
            .map_err(|e| sdk_error(e, "put bucket acl", container))?;
        Ok(())
    }

    async fn list(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> CloudResult<PageSet<StorageMetadata>> {
        check_container_name(container)?;
        let max = i32::try_from(options.page_size()).unwrap_or(i32::MAX);
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(container)
            .max_keys(max);
        if let Some(prefix) = &options.prefix {
            request = request.prefix(prefix);
        }
        if let Some(delimiter) = options.effective_delimiter() {
            request = request.delimiter(delimiter);
        }
        if let Some(marker) = &options.marker {
            request = request.continuation_token(marker);
        }

        let response = request
            .send()
            .await
            .map_err(|e| sdk_error(e, "list objects", container))?;

        let mut items: Vec<StorageMetadata> = Vec::new();
        for object in response.contents() {
            let Some(key) = object.key() else { continue };
            let size = object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
            let mut entry = StorageMetadata::blob(key, size).with_location(self.location.clone());
            if key.ends_with('/') {
                entry.kind = StorageType::Folder;
            }
            if let Some(etag) = object.e_tag() {
                entry = entry.with_etag(unquote(etag));
            }
            if let Some(modified) = object.last_modified().and_then(to_chrono) {
                entry = entry.with_last_modified(modified);
            }
            items.push(entry);
        }
        for common in response.common_prefixes() {
            if let Some(prefix) = common.prefix() {
                items.push(StorageMetadata::relative_path(prefix));
            }
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));

        let next_marker = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        debug!(container, count = items.len(), more = next_marker.is_some(), "listed objects");
        Ok(PageSet::new(items, next_marker))
    }

    async fn delete_container_if_empty(&self, container: &str) -> CloudResult<bool> {
        check_container_name(container)?;
        let first_page = match self
            .client
            .list_objects_v2()
            .bucket(container)
            .max_keys(1)
            .send()
            .await
        {
            Ok(first_page) => first_page,
            Err(e) => {
                return match sdk_error(e, "list objects", container) {
                    CloudError::ContainerNotFound(_) => Ok(true),
                    err => Err(err),
                }
            }
        };
        if !first_page.contents().is_empty() {
            return Ok(false);
        }

        match self.client.delete_bucket().bucket(container).send().await {
            Ok(_) => {
                info!(container, "deleted bucket");
                Ok(true)
            }
            Err(e) if e.code() == Some("BucketNotEmpty") => Ok(false),
            Err(e) => match sdk_error(e, "delete bucket", container) {
                CloudError::ContainerNotFound(_) => Ok(true),
                err => Err(err),
            },
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
            return put_multipart_blob(self, container, blob, options, self.config.part_concurrency)
                .await;
        }
        self.put_simple(container, blob, options.blob_access).await
    }

    async fn blob_metadata(
        &self,
        container: &str,
        name: &str,
    ) -> CloudResult<Option<BlobMetadata>> {
        check_blob_name(container, name)?;
        let result = self
            .with_retry("head object", || {
                async move {
                    self.client
                        .head_object()
                        .bucket(container)
                        .key(name)
                        .send()
                        .await
                        .map_err(|e| sdk_error(e, "head object", container))
                }
                .boxed()
            })
            .await;

        match result {
            Ok(output) => Ok(Some(object_metadata!(
                output,
                output.content_length().and_then(|l| u64::try_from(l).ok()),
                container,
                name,
                self.location.clone()
            ))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_blob(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> CloudResult<Option<Blob>> {
        check_blob_name(container, name)?;
        let result = self
            .with_retry("get object", || {
                let request = self
                    .client
                    .get_object()
                    .bucket(container)
                    .key(name)
                    .set_range(options.range.as_ref().map(|r| r.header_value()))
                    .set_if_match(options.if_match.clone())
                    .set_if_none_match(options.if_none_match.clone());
                async move {
                    request
                        .send()
                        .await
                        .map_err(|e| sdk_error(e, "get object", container))
                }
                .boxed()
            })
            .await;

        let output = match result {
            Ok(output) => output,
            Err(CloudError::ResourceNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let size = output
            .content_range()
            .and_then(total_from_content_range)
            .or_else(|| output.content_length().and_then(|l| u64::try_from(l).ok()));
        let metadata = object_metadata!(output, size, container, name, self.location.clone());
        let payload: Bytes = output
            .body
            .collect()
            .await
            .map_err(|e| CloudError::Other(anyhow::anyhow!("read object body: {}", e)))?
            .into_bytes();

        self.stats
            .total_bytes_downloaded
            .fetch_add(payload.len() as u64, Ordering::Relaxed);
        debug!(container, blob = name, size = payload.len(), "got object");
        Ok(Some(Blob { metadata, payload }))
    }

    async fn remove_blob(&self, container: &str, name: &str) -> CloudResult<()> {
        check_blob_name(container, name)?;
        self.with_retry("delete object", || {
            async move {
                self.client
                    .delete_object()
                    .bucket(container)
                    .key(name)
                    .send()
                    .await
                    .map_err(|e| sdk_error(e, "delete object", container))
            }
            .boxed()
        })
        .await?;
        self.stats
            .total_objects_deleted
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn remove_blobs(&self, container: &str, names: &[String]) -> CloudResult<()> {
        check_container_name(container)?;
        for batch in names.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|name| {
                    ObjectIdentifier::builder()
                        .key(name)
                        .build()
                        .map_err(|e| CloudError::illegal_argument(e.to_string()))
                })
                .collect::<CloudResult<Vec<_>>>()?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| CloudError::illegal_argument(e.to_string()))?;

            let response = self
                .client
                .delete_objects()
                .bucket(container)
                .delete(delete)
                .send()
                .await
                .map_err(|e| sdk_error(e, "delete objects", container))?;

            if let Some(failed) = response.errors().first() {
                return Err(CloudError::illegal_state(format!(
                    "failed to delete {}/{}: {}",
                    container,
                    failed.key().unwrap_or_default(),
                    failed.message().unwrap_or("unknown error")
                )));
            }
            self.stats
                .total_objects_deleted
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn copy_blob(
        &self,
        from_container: &str,
        from_name: &str,
        to_container: &str,
        to_name: &str,
    ) -> CloudResult<String> {
        check_blob_name(from_container, from_name)?;
        check_blob_name(to_container, to_name)?;
        let response = match self
            .client
            .copy_object()
            .copy_source(encode_copy_source(from_container, from_name))
            .bucket(to_container)
            .key(to_name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Err(match sdk_error(e, "copy object", to_container) {
                    CloudError::ResourceNotFound(_) => {
                        CloudError::key_not_found(from_container, from_name)
                    }
                    err => err,
                })
            }
        };
        Ok(response
            .copy_object_result()
            .and_then(|r| r.e_tag())
            .map(unquote)
            .unwrap_or_default())
    }

    async fn blob_access(&self, container: &str, name: &str) -> CloudResult<BlobAccess> {
        check_blob_name(container, name)?;
        Ok(if self.object_acl_is_public(container, name).await? {
            BlobAccess::PublicRead
        } else {
            BlobAccess::Private
        })
    }

    async fn set_blob_access(
        &self,
        container: &str,
        name: &str,
        access: BlobAccess,
    ) -> CloudResult<()> {
        check_blob_name(container, name)?;
        let acl = match access {
            BlobAccess::PublicRead => ObjectCannedAcl::PublicRead,
            BlobAccess::Private => ObjectCannedAcl::Private,
        };
        self.client
            .put_object_acl()
            .bucket(container)
            .key(name)
            .acl(acl)
            .send()
            .await
            .map_err(|e| sdk_error(e, "put object acl", container))?;
        Ok(())
    }

    async fn initiate_multipart_upload(
        &self,
        container: &str,
        metadata: BlobMetadata,
        options: &PutOptions,
    ) -> CloudResult<MultipartUpload> {
        check_blob_name(container, &metadata.name)?;
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(container)
            .key(&metadata.name)
            .set_content_type(metadata.content.content_type.clone())
            .set_content_encoding(metadata.content.content_encoding.clone())
            .set_content_disposition(metadata.content.content_disposition.clone())
            .set_cache_control(metadata.content.cache_control.clone());
        for (key, value) in &metadata.user_metadata {
            request = request.metadata(key, value);
        }
        if options.blob_access == BlobAccess::PublicRead {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        let response = request
            .send()
            .await
            .map_err(|e| sdk_error(e, "create multipart upload", container))?;
        let upload_id = response
            .upload_id()
            .ok_or_else(|| CloudError::parse("no upload id returned from S3"))?
            .to_string();

        debug!(container, blob = %metadata.name, upload_id = %upload_id, "initiated multipart upload");
        Ok(MultipartUpload::new(
            container,
            metadata.name.clone(),
            upload_id,
            metadata,
            *options,
        ))
    }

    async fn upload_multipart_part(
        &self,
        upload: &MultipartUpload,
        part_number: u32,
        payload: Bytes,
    ) -> CloudResult<MultipartPart> {
        let number = self::part_number(part_number)?;
        let size = payload.len() as u64;
        let response = self
            .with_retry("upload part", || {
                let request = self
                    .client
                    .upload_part()
                    .bucket(&upload.container)
                    .key(&upload.blob_name)
                    .upload_id(&upload.id)
                    .part_number(number)
                    .body(ByteStream::from(payload.clone()));
                async move {
                    request
                        .send()
                        .await
                        .map_err(|e| sdk_error(e, "upload part", &upload.container))
                }
                .boxed()
            })
            .await?;

        let etag = response
            .e_tag()
            .map(unquote)
            .ok_or_else(|| CloudError::parse(format!("no ETag returned for part {}", part_number)))?;
        self.stats
            .total_bytes_uploaded
            .fetch_add(size, Ordering::Relaxed);
        Ok(MultipartPart::new(part_number, size, etag))
    }

    async fn complete_multipart_upload(
        &self,
        upload: &MultipartUpload,
        parts: &[MultipartPart],
    ) -> CloudResult<String> {
        validate_parts(parts)?;
        let completed = parts
            .iter()
            .map(|part| {
                Ok(CompletedPart::builder()
                    .part_number(self::part_number(part.part_number)?)
                    .e_tag(format!("\"{}\"", part.etag))
                    .build())
            })
            .collect::<CloudResult<Vec<_>>>()?;

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&upload.container)
            .key(&upload.blob_name)
            .upload_id(&upload.id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error(e, "complete multipart upload", &upload.container))?;

        info!(
            container = %upload.container,
            blob = %upload.blob_name,
            parts = parts.len(),
            "completed multipart upload"
        );
        Ok(response.e_tag().map(unquote).unwrap_or_default())
    }

    async fn abort_multipart_upload(&self, upload: &MultipartUpload) -> CloudResult<()> {
        match self
            .client
            .abort_multipart_upload()
            .bucket(&upload.container)
            .key(&upload.blob_name)
            .upload_id(&upload.id)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_upload()) => Ok(()),
            Err(e) => Err(sdk_error(e, "abort multipart upload", &upload.container)),
        }
    }

    async fn list_multipart_upload(
        &self,
        upload: &MultipartUpload,
    ) -> CloudResult<Vec<MultipartPart>> {
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_parts()
                .bucket(&upload.container)
                .key(&upload.blob_name)
                .upload_id(&upload.id)
                .set_part_number_marker(marker.take())
                .send()
                .await
                .map_err(|e| sdk_error(e, "list parts", &upload.container))?;

            for part in response.parts() {
                let number = part.part_number().and_then(|n| u32::try_from(n).ok()).unwrap_or(0);
                let size = part.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
                let mut entry = MultipartPart::new(number, size, part.e_tag().map(unquote).unwrap_or_default());
                entry.last_modified = part.last_modified().and_then(to_chrono);
                parts.push(entry);
            }

            match (response.is_truncated(), response.next_part_number_marker()) {
                (Some(true), Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(parts)
    }

    async fn list_multipart_uploads(&self, container: &str) -> CloudResult<Vec<MultipartUpload>> {
        check_container_name(container)?;
        let mut uploads = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut id_marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_multipart_uploads()
                .bucket(container)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(id_marker.take())
                .send()
                .await
                .map_err(|e| sdk_error(e, "list multipart uploads", container))?;

            for upload in response.uploads() {
                let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) else {
                    continue;
                };
                let metadata = BlobMetadata {
                    container: container.to_string(),
                    name: key.to_string(),
                    location: Some(self.location.clone()),
                    ..Default::default()
                };
                uploads.push(MultipartUpload::new(
                    container,
                    key,
                    id,
                    metadata,
                    PutOptions::multipart(),
                ));
            }

            if response.is_truncated() != Some(true) {
                break;
            }
            key_marker = response.next_key_marker().map(str::to_string);
            id_marker = response.next_upload_id_marker().map(str::to_string);
            if key_marker.is_none() && id_marker.is_none() {
                break;
            }
        }
        Ok(uploads)
    }

    fn signer(&self) -> Option<&dyn BlobRequestSigner> {
        Some(self)
    }
}

fn presigning_config(expires_in: Duration) -> CloudResult<PresigningConfig> {
    PresigningConfig::expires_in(expires_in)
        .map_err(|e| CloudError::illegal_argument(format!("invalid presign expiry: {}", e)))
}

fn to_signed_request(presigned: &PresignedRequest) -> CloudResult<SignedRequest> {
    let method = Method::from_bytes(presigned.method().as_bytes())
        .map_err(|e| CloudError::parse(format!("presigned method: {}", e)))?;
    let url = Url::parse(presigned.uri())
        .map_err(|e| CloudError::parse(format!("presigned url: {}", e)))?;
    Ok(presigned
        .headers()
        .fold(SignedRequest::new(method, url), |signed, (name, value)| {
            signed.with_header(name, value)
        }))
}

#[async_trait]
impl BlobRequestSigner for S3BlobStore {
    async fn sign_get_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        check_blob_name(container, name)?;
        let presigned = self
            .client
            .get_object()
            .bucket(container)
            .key(name)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| sdk_error(e, "presign get object", container))?;
        to_signed_request(&presigned)
    }

    async fn sign_put_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        check_blob_name(container, name)?;
        let presigned = self
            .client
            .put_object()
            .bucket(container)
            .key(name)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| sdk_error(e, "presign put object", container))?;
        to_signed_request(&presigned)
    }

    async fn sign_remove_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        check_blob_name(container, name)?;
        let presigned = self
            .client
            .delete_object()
            .bucket(container)
            .key(name)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| sdk_error(e, "presign delete object", container))?;
        to_signed_request(&presigned)
    }
}
