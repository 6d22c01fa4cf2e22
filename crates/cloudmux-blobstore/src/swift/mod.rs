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

//! OpenStack Swift
//!
//! Swift deployments are split into regions, each with its own storage URL
//! in the Keystone service catalog. [`region_scoped_context`] authenticates
//! once, reads the `object-store` endpoints and builds one
//! [`RegionScopedSwiftBlobStore`] per region. All of them share the token
//! cache, so a token refreshed by one region is reused by the others.
//!
//! # Multipart uploads
//!
//! Parts are stored as segment objects named
//! `{blob}/.segments/{upload_id}/{part:08}` in the target container and the
//! upload is completed with a Static Large Object manifest
//! (`PUT ...?multipart-manifest=put`). Aborting deletes the segments, and
//! [`BlobStore::remove_blob`] deletes with `?multipart-manifest=delete` so a
//! manifest takes its segments with it.
//!
//! Segments are ordinary objects of the same container: a top-level listing
//! shows a `{blob}/` relative path next to each segmented blob, and recursive
//! listings and blob counts include the segments.
//!
//! # Signed URLs
//!
//! With a TempURL key configured, [`BlobStore::signer`] returns the store
//! itself and signs GET/PUT/DELETE URLs with HMAC-SHA1.
//!
//! # Examples
//!
//! ```no_run
//! use cloudmux_blobstore::swift::{region_scoped_context, SwiftConfig};
//! use cloudmux_blobstore::swift::keystone::KeystoneCredentials;
//! use cloudmux_core::RestClient;
//!
//! #[tokio::main]
//! async fn main() -> cloudmux_core::CloudResult<()> {
//!     let config = SwiftConfig::new(
//!         "https://keystone.example.com:5000/v3",
//!         KeystoneCredentials {
//!             username: "demo".into(),
//!             password: "secret".into(),
//!             user_domain: "Default".into(),
//!             project: "media".into(),
//!             project_domain: "Default".into(),
//!         },
//!     );
//!     let context = region_scoped_context(&config, &RestClient::with_defaults()?).await?;
//!     let store = context.blob_store("RegionOne")?;
//!     store.create_container("thumbnails").await?;
//!     Ok(())
//! }
//! ```

pub mod keystone;
mod model;
pub mod temp_url;

use self::keystone::{KeystoneAuth, KeystoneCredentials, KeystoneToken, OBJECT_STORE};
use self::model::{
    parse_listing_time, BulkDeleteResult, ContainerEntry, ManifestSegment, ObjectEntry,
};
use crate::cache::{ContainerCache, ContainerInfo};
use crate::domain::{
    Blob, BlobAccess, BlobMetadata, ContainerAccess, ContentMetadata, PageSet, StorageMetadata,
    StorageType,
};
use crate::multipart::{
    put_multipart_blob, validate_parts, MultipartPart, MultipartUpload, DEFAULT_PART_CONCURRENCY,
};
use crate::options::{CreateContainerOptions, GetOptions, ListContainerOptions, PutOptions};
use crate::pagination::collect_all;
use crate::region::{ensure_location_in_region, RegionScopedBlobStoreContext};
use crate::{check_blob_name, check_container_name, BlobRequestSigner, BlobStore, SignedRequest};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloudmux_core::http::{header_str, header_u64, prefixed_headers, status_error, unquote_etag};
use cloudmux_core::{CloudError, CloudResult, Location, RestClient};
use reqwest::{Client, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

/// Provider id of the Swift stores
pub const PROVIDER_ID: &str = "openstack-swift";

const MIB: u64 = 1024 * 1024;

/// Largest object accepted by a single PUT
pub const MAX_OBJECT_SIZE: u64 = 5 * 1024 * MIB;

/// Smallest segment of a Static Large Object (except the last)
pub const MIN_SEGMENT_SIZE: u64 = MIB;

/// Most segments one manifest may reference
pub const MAX_MANIFEST_SEGMENTS: u32 = 1000;

/// ACL granting anonymous read and listing
/// Largest `limit` a container listing accepts
const MAX_LISTING_LIMIT: usize = 10_000;

const PUBLIC_READ_ACL: &str = ".r:*,.rlistings";

const META_PREFIX: &str = "x-object-meta-";

/// Connection settings for a Swift account
#[derive(Clone)]
pub struct SwiftConfig {
    /// Keystone v3 endpoint, e.g. `https://keystone:5000/v3`
    pub identity_endpoint: String,
    /// Password credentials
    pub credentials: KeystoneCredentials,
    /// Regions to expose; empty means every catalog region
    pub regions: Vec<String>,
    /// Region returned by the context by default
    pub default_region: Option<String>,
    /// Catalog interface (`public`, `internal` or `admin`)
    pub interface: String,
    /// Account TempURL key; enables signed URLs
    pub temp_url_key: Option<String>,
    /// How long container lookups are remembered
    pub container_cache_ttl: Duration,
}

impl fmt::Debug for SwiftConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwiftConfig")
            .field("identity_endpoint", &self.identity_endpoint)
            .field("credentials", &self.credentials)
            .field("regions", &self.regions)
            .field("default_region", &self.default_region)
            .field("interface", &self.interface)
            .field("temp_url_key", &self.temp_url_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl SwiftConfig {
    /// Public endpoints of every region
    pub fn new(identity_endpoint: impl Into<String>, credentials: KeystoneCredentials) -> Self {
        SwiftConfig {
            identity_endpoint: identity_endpoint.into(),
            credentials,
            regions: Vec::new(),
            default_region: None,
            interface: "public".to_string(),
            temp_url_key: None,
            container_cache_ttl: Duration::from_secs(60),
        }
    }

    /// Restrict to these regions
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    /// Enable TempURL signing
    pub fn with_temp_url_key(mut self, key: impl Into<String>) -> Self {
        self.temp_url_key = Some(key.into());
        self
    }
}

/// Authenticate and build one store per object-store region
pub async fn region_scoped_context(
    config: &SwiftConfig,
    http: &RestClient,
) -> CloudResult<RegionScopedBlobStoreContext> {
    let identity = Url::parse(&config.identity_endpoint).map_err(|e| {
        CloudError::illegal_argument(format!(
            "invalid identity endpoint {}: {}",
            config.identity_endpoint, e
        ))
    })?;
    let auth = Arc::new(KeystoneAuth::new(
        &identity,
        config.credentials.clone(),
        http.clone(),
    )?);

    let token = auth.token().await?;
    let mut endpoints = token.endpoints(OBJECT_STORE, &config.interface)?;
    if endpoints.is_empty() {
        return Err(CloudError::not_found(format!(
            "no {} object-store endpoint in the service catalog",
            config.interface
        )));
    }
    if !config.regions.is_empty() {
        let mut wanted = BTreeMap::new();
        for region in &config.regions {
            let url = endpoints.remove(region).ok_or_else(|| {
                CloudError::illegal_argument(format!(
                    "region {} has no object-store endpoint",
                    region
                ))
            })?;
            wanted.insert(region.clone(), url);
        }
        endpoints = wanted;
    }

    let mut stores: BTreeMap<String, Arc<dyn BlobStore>> = BTreeMap::new();
    for (region, endpoint) in endpoints {
        let store = RegionScopedSwiftBlobStore::new(
            region.clone(),
            endpoint,
            Arc::clone(&auth),
            http.clone(),
        )?
        .with_container_cache(ContainerCache::new(10_000, Some(config.container_cache_ttl)));
        let store = match &config.temp_url_key {
            Some(key) => store.with_temp_url_key(key.clone()),
            None => store,
        };
        stores.insert(region, Arc::new(store));
    }
    RegionScopedBlobStoreContext::new(PROVIDER_ID, stores, config.default_region.as_deref())
}

/// A request before the token is attached
#[derive(Debug, Clone)]
struct SwiftRequest {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl SwiftRequest {
    fn new(method: Method, url: Url) -> Self {
        SwiftRequest {
            method,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn optional_header(self, name: &str, value: Option<&String>) -> Self {
        match value {
            Some(value) => self.header(name, value.clone()),
            None => self,
        }
    }

    fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    fn build(&self, client: &Client, token: &str) -> CloudResult<Request> {
        let mut builder = client
            .request(self.method.clone(), self.url.clone())
            .header("x-auth-token", token);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(builder.body(self.body.clone()).build()?)
    }
}

/// Swift account in one region
#[derive(Clone)]
pub struct RegionScopedSwiftBlobStore {
    http: RestClient,
    auth: Arc<KeystoneAuth>,
    region: String,
    endpoint: Url,
    location: Location,
    containers: ContainerCache,
    temp_url_key: Option<String>,
}

impl fmt::Debug for RegionScopedSwiftBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionScopedSwiftBlobStore")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint.as_str())
            .field("temp_url", &self.temp_url_key.is_some())
            .finish()
    }
}

impl RegionScopedSwiftBlobStore {
    /// Store for the storage URL `endpoint` (`.../v1/AUTH_{project}`) of `region`
    pub fn new(
        region: impl Into<String>,
        endpoint: Url,
        auth: Arc<KeystoneAuth>,
        http: RestClient,
    ) -> CloudResult<Self> {
        if endpoint.cannot_be_a_base() {
            return Err(CloudError::illegal_argument(format!(
                "storage URL {} cannot hold paths",
                endpoint
            )));
        }
        let region = region.into();
        info!(region = %region, endpoint = %endpoint, "Swift blob store ready");
        Ok(RegionScopedSwiftBlobStore {
            http,
            auth,
            location: Location::region(region.clone(), Location::provider(PROVIDER_ID)),
            region,
            endpoint,
            containers: ContainerCache::default(),
            temp_url_key: None,
        })
    }

    /// Replace the container cache
    pub fn with_container_cache(mut self, cache: ContainerCache) -> Self {
        self.containers = cache;
        self
    }

    /// Enable TempURL signing with the account key
    pub fn with_temp_url_key(mut self, key: impl Into<String>) -> Self {
        self.temp_url_key = Some(key.into());
        self
    }

    /// Region served by this store
    pub fn region(&self) -> &str {
        &self.region
    }

    fn container_url(&self, container: &str) -> Url {
        self.resource_url(container, None)
    }

    fn object_url(&self, container: &str, name: &str) -> Url {
        self.resource_url(container, Some(name))
    }

    fn resource_url(&self, container: &str, name: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(container);
            if let Some(name) = name {
                path.extend(name.split('/'));
            }
        }
        url
    }

    fn listing_url(&self, container: Option<&str>, query: &[(&str, &str)]) -> Url {
        let mut url = match container {
            Some(container) => self.container_url(container),
            None => {
                let mut url = self.endpoint.clone();
                url.set_query(None);
                url
            }
        };
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    /// Unencoded object path as Swift sees it, starting at `/v1/`
    fn object_path(&self, container: &str, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.path().trim_end_matches('/'),
            container,
            name
        )
    }

    /// Send with the cached token; on 401 re-authenticate and retry once
    async fn send(&self, context: &str, request: &SwiftRequest) -> CloudResult<Response> {
        let token = self.auth.token().await?;
        let response = self.send_with(context, request, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(context, region = %self.region, "token rejected, re-authenticating");
        self.auth.invalidate(&token).await;
        let token = self.auth.token().await?;
        self.send_with(context, request, &token).await
    }

    async fn send_with(
        &self,
        context: &str,
        request: &SwiftRequest,
        token: &KeystoneToken,
    ) -> CloudResult<Response> {
        self.http
            .execute(context, |client| request.build(client, &token.id))
            .await
    }

    /// Cached container lookup; `None` when it does not exist
    async fn container_info(&self, container: &str) -> CloudResult<Option<ContainerInfo>> {
        self.containers
            .get_or_load(container, || self.head_container(container))
            .await
    }

    async fn head_container(&self, container: &str) -> CloudResult<Option<ContainerInfo>> {
        let request = SwiftRequest::new(Method::HEAD, self.container_url(container));
        let response = self.send("head container", &request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let headers = response.headers();
                Ok(Some(ContainerInfo {
                    name: container.to_string(),
                    public_read: header_str(headers, "x-container-read")
                        .is_some_and(|acl| is_public_acl(&acl)),
                    object_count: header_u64(headers, "x-container-object-count"),
                    bytes_used: header_u64(headers, "x-container-bytes-used"),
                }))
            }
            _ => Err(status_error(response, "head container").await),
        }
    }

    /// Swift answers 404 for a missing object and a missing container alike
    async fn ensure_container(&self, container: &str) -> CloudResult<ContainerInfo> {
        if let Some(info) = self.container_info(container).await? {
            return Ok(info);
        }
        // a negative entry may be stale
        self.containers.invalidate(container).await;
        self.container_info(container)
            .await?
            .ok_or_else(|| CloudError::container_not_found(container))
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        context: &str,
        container: Option<&str>,
        url: Url,
    ) -> CloudResult<Vec<T>> {
        let response = self.send(context, &SwiftRequest::new(Method::GET, url)).await?;
        match response.status() {
            StatusCode::NO_CONTENT => return Ok(Vec::new()),
            StatusCode::NOT_FOUND => {
                if let Some(container) = container {
                    self.containers.put_missing(container).await;
                    return Err(CloudError::container_not_found(container));
                }
            }
            _ => {}
        }
        if !response.status().is_success() {
            return Err(status_error(response, context).await);
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|e| CloudError::parse(format!("{}: {}", context, e)))
    }

    async fn put_object(&self, container: &str, request: &SwiftRequest) -> CloudResult<String> {
        let response = self.send("put object", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.containers.put_missing(container).await;
            return Err(CloudError::container_not_found(container));
        }
        if !response.status().is_success() {
            return Err(status_error(response, "put object").await);
        }
        Ok(etag_of(&response))
    }

    async fn delete_object(&self, container: &str, name: &str) -> CloudResult<()> {
        let request = SwiftRequest::new(Method::DELETE, self.object_url(container, name));
        let response = self.send("delete object", &request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                self.ensure_container(container).await?;
                Ok(())
            }
            status if status.is_success() => Ok(()),
            _ => Err(status_error(response, "delete object").await),
        }
    }

    /// Delete an object and, when it is a manifest, the segments it lists
    ///
    /// Plain objects are deleted as well; Swift only expands manifests.
    async fn delete_with_segments(&self, container: &str, name: &str) -> CloudResult<()> {
        let mut url = self.object_url(container, name);
        url.query_pairs_mut().append_pair("multipart-manifest", "delete");
        let request =
            SwiftRequest::new(Method::DELETE, url).header("accept", "application/json");
        let response = self.send("delete object", &request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                self.ensure_container(container).await?;
                return Ok(());
            }
            status if !status.is_success() => {
                return Err(status_error(response, "delete object").await)
            }
            _ => {}
        }

        let body = response.bytes().await?;
        let Ok(result) = serde_json::from_slice::<BulkDeleteResult>(&body) else {
            return Ok(());
        };
        match result.status_code() {
            Some(code) if code >= 400 && code != 404 => Err(CloudError::from_status(
                code,
                "delete object",
                format!("{}/{}: {}", container, name, result.error_summary()),
            )),
            _ => {
                debug!(
                    container,
                    blob = name,
                    deleted = result.number_deleted,
                    not_found = result.number_not_found,
                    "deleted object and segments"
                );
                Ok(())
            }
        }
    }

    fn blob_metadata_from(
        &self,
        container: &str,
        name: &str,
        headers: &reqwest::header::HeaderMap,
        public: bool,
    ) -> BlobMetadata {
        let mut metadata = metadata_from_headers(container, name, headers, self.location.clone());
        if public {
            metadata.public_uri = Some(self.object_url(container, name));
        }
        metadata
    }

    async fn sign(
        &self,
        method: Method,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        check_blob_name(container, name)?;
        let key = self
            .temp_url_key
            .as_deref()
            .ok_or_else(|| CloudError::unsupported(PROVIDER_ID, "signed URLs without a TempURL key"))?;
        let expires_in = i64::try_from(expires_in.as_secs())
            .map_err(|_| CloudError::illegal_argument("expiry is too far in the future"))?;
        let expires = Utc::now().timestamp() + expires_in;
        let url = temp_url::sign_url(
            key,
            &method,
            expires,
            &self.object_path(container, name),
            self.object_url(container, name),
        )?;
        Ok(SignedRequest::new(method, url))
    }
}

fn is_public_acl(acl: &str) -> bool {
    acl.split(',').any(|grant| grant.trim() == ".r:*")
}

fn etag_of(response: &Response) -> String {
    header_str(response.headers(), "etag")
        .map(|e| unquote_etag(&e))
        .unwrap_or_default()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Percent-encode `/container/name` for `X-Copy-From`
fn encode_object_path(container: &str, name: &str) -> String {
    let encode = |segment: &str| {
        form_urlencoded::byte_serialize(segment.as_bytes())
            .collect::<String>()
            .replace('+', "%20")
    };
    let name = name.split('/').map(encode).collect::<Vec<_>>().join("/");
    format!("/{}/{}", encode(container), name)
}

/// Prefix under which the segments of an upload are stored
pub fn segment_prefix(blob_name: &str, upload_id: &str) -> String {
    format!("{}/.segments/{}/", blob_name, upload_id)
}

fn segment_name(upload: &MultipartUpload, part_number: u32) -> String {
    format!(
        "{}{:08}",
        segment_prefix(&upload.blob_name, &upload.id),
        part_number
    )
}

fn metadata_from_headers(
    container: &str,
    name: &str,
    headers: &reqwest::header::HeaderMap,
    location: Location,
) -> BlobMetadata {
    let content_length = header_u64(headers, "content-length");
    let size = header_str(headers, "content-range")
        .and_then(|range| range.rsplit('/').next().and_then(|t| t.parse().ok()))
        .or(content_length);

    BlobMetadata {
        container: container.to_string(),
        name: name.to_string(),
        etag: header_str(headers, "etag").map(|e| unquote_etag(&e)),
        last_modified: header_str(headers, "last-modified").and_then(|d| parse_http_date(&d)),
        size,
        content: ContentMetadata {
            content_type: header_str(headers, "content-type"),
            content_length,
            content_md5: None,
            content_encoding: header_str(headers, "content-encoding"),
            content_language: header_str(headers, "content-language"),
            content_disposition: header_str(headers, "content-disposition"),
            cache_control: header_str(headers, "cache-control"),
            expires: header_str(headers, "expires").and_then(|d| parse_http_date(&d)),
        },
        user_metadata: prefixed_headers(headers, META_PREFIX).into_iter().collect(),
        public_uri: None,
        location: Some(location),
    }
}

/// Content and user metadata headers shared by PUTs and manifests
fn with_content_headers(mut request: SwiftRequest, metadata: &BlobMetadata) -> SwiftRequest {
    let content = &metadata.content;
    request = request
        .optional_header("content-type", content.content_type.as_ref())
        .optional_header("content-encoding", content.content_encoding.as_ref())
        .optional_header("content-language", content.content_language.as_ref())
        .optional_header("content-disposition", content.content_disposition.as_ref())
        .optional_header("cache-control", content.cache_control.as_ref());
    if let Some(expires) = content.expires {
        request = request.header("expires", expires.to_rfc2822().replace("+0000", "GMT"));
    }
    for (key, value) in &metadata.user_metadata {
        request = request.header(format!("{}{}", META_PREFIX, key), value.clone());
    }
    request
}

/// `limit` sent for a listing page
///
/// One entry beyond the page tells whether another page exists, one more
/// covers the marker Swift may echo back. Never above the server maximum.
fn listing_limit(options: &ListContainerOptions) -> usize {
    (options.page_size() + 1 + usize::from(options.marker.is_some())).min(MAX_LISTING_LIMIT)
}

/// Trim a listing fetched with `limit` into a page
///
/// Swift echoes a rolled-up prefix equal to the marker; it is dropped. A
/// response that filled `limit` may have more behind it even when the page
/// is not over-full, so it still yields a marker.
fn into_page<T>(
    mut entries: Vec<T>,
    marker: Option<&str>,
    page_size: usize,
    limit: usize,
    name: impl Fn(&T) -> &str,
) -> (Vec<T>, Option<String>) {
    let full = entries.len() >= limit;
    if let Some(marker) = marker {
        entries.retain(|entry| name(entry) > marker);
    }
    if entries.len() > page_size {
        entries.truncate(page_size);
    } else if !full {
        return (entries, None);
    }
    let next = entries.last().map(|entry| name(entry).to_string());
    (entries, next)
}

#[async_trait]
impl BlobStore for RegionScopedSwiftBlobStore {
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
        let page_size = options.page_size();
        let limit = listing_limit(options);
        let limit_param = limit.to_string();
        let mut query = vec![("limit", limit_param.as_str())];
        if let Some(prefix) = &options.prefix {
            query.push(("prefix", prefix));
        }
        if let Some(marker) = &options.marker {
            query.push(("marker", marker));
        }

        let entries: Vec<ContainerEntry> = self
            .fetch_json("list containers", None, self.listing_url(None, &query))
            .await?;
        let (entries, next_marker) =
            into_page(entries, options.marker.as_deref(), page_size, limit, |e| {
                e.name.as_str()
            });

        let items = entries
            .into_iter()
            .map(|entry| {
                let mut item =
                    StorageMetadata::container(entry.name).with_location(self.location.clone());
                item.size = Some(entry.bytes);
                if let Some(modified) = entry.last_modified.as_deref().and_then(parse_listing_time) {
                    item = item.with_last_modified(modified);
                }
                item
            })
            .collect();
        Ok(PageSet::new(items, next_marker))
    }

    async fn container_exists(&self, container: &str) -> CloudResult<bool> {
        check_container_name(container)?;
        Ok(self.container_info(container).await?.is_some())
    }

    async fn create_container_in_location(
        &self,
        location: Option<&Location>,
        container: &str,
        options: &CreateContainerOptions,
    ) -> CloudResult<bool> {
        check_container_name(container)?;
        ensure_location_in_region(&self.region, location)?;

        let mut request = SwiftRequest::new(Method::PUT, self.container_url(container));
        if options.public_read {
            request = request.header("x-container-read", PUBLIC_READ_ACL);
        }
        let response = self.send("create container", &request).await?;
        self.containers.invalidate(container).await;
        match response.status() {
            StatusCode::CREATED => {
                info!(container, region = %self.region, "created container");
                Ok(true)
            }
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
                debug!(container, "container already exists");
                Ok(false)
            }
            _ => Err(status_error(response, "create container").await),
        }
    }

    async fn container_access(&self, container: &str) -> CloudResult<ContainerAccess> {
        check_container_name(container)?;
        let info = self.ensure_container(container).await?;
        Ok(if info.public_read {
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
        let request = SwiftRequest::new(Method::POST, self.container_url(container));
        let request = match access {
            ContainerAccess::PublicRead => request.header("x-container-read", PUBLIC_READ_ACL),
            ContainerAccess::Private => request.header("x-remove-container-read", "1"),
        };
        let response = self.send("set container acl", &request).await?;
        self.containers.invalidate(container).await;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CloudError::container_not_found(container));
        }
        if !response.status().is_success() {
            return Err(status_error(response, "set container acl").await);
        }
        Ok(())
    }

    async fn list(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> CloudResult<PageSet<StorageMetadata>> {
        check_container_name(container)?;
        let page_size = options.page_size();
        let limit = listing_limit(options);
        let limit_param = limit.to_string();
        let mut query = vec![("limit", limit_param.as_str())];
        if let Some(prefix) = &options.prefix {
            query.push(("prefix", prefix));
        }
        if let Some(delimiter) = options.effective_delimiter() {
            query.push(("delimiter", delimiter));
        }
        if let Some(marker) = &options.marker {
            query.push(("marker", marker));
        }

        let entries: Vec<ObjectEntry> = self
            .fetch_json("list objects", Some(container), self.listing_url(Some(container), &query))
            .await?;
        let (entries, next_marker) =
            into_page(entries, options.marker.as_deref(), page_size, limit, ObjectEntry::name);

        let mut items: Vec<StorageMetadata> = entries
            .into_iter()
            .map(|entry| match entry {
                ObjectEntry::Subdir { subdir } => StorageMetadata::relative_path(subdir),
                ObjectEntry::Object {
                    name,
                    hash,
                    bytes,
                    content_type,
                    last_modified,
                } => {
                    let mut item =
                        StorageMetadata::blob(name, bytes).with_location(self.location.clone());
                    if content_type.as_deref() == Some("application/directory") {
                        item.kind = StorageType::Folder;
                    }
                    if let Some(hash) = hash {
                        item = item.with_etag(hash);
                    }
                    if let Some(modified) = last_modified.as_deref().and_then(parse_listing_time) {
                        item = item.with_last_modified(modified);
                    }
                    item
                }
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(PageSet::new(items, next_marker))
    }

    async fn delete_container_if_empty(&self, container: &str) -> CloudResult<bool> {
        check_container_name(container)?;
        let request = SwiftRequest::new(Method::DELETE, self.container_url(container));
        let response = self.send("delete container", &request).await?;
        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            StatusCode::NOT_FOUND => {
                self.containers.put_missing(container).await;
                Ok(true)
            }
            status if status.is_success() => {
                self.containers.put_missing(container).await;
                info!(container, region = %self.region, "deleted container");
                Ok(true)
            }
            _ => Err(status_error(response, "delete container").await),
        }
    }

    async fn put_blob(
        &self,
        container: &str,
        blob: Blob,
        options: &PutOptions,
    ) -> CloudResult<String> {
        check_blob_name(container, blob.name())?;
        if options.blob_access == BlobAccess::PublicRead {
            return Err(CloudError::unsupported(PROVIDER_ID, "set_blob_access"));
        }
        if options.multipart || blob.len() > MAX_OBJECT_SIZE {
            return put_multipart_blob(self, container, blob, options, DEFAULT_PART_CONCURRENCY)
                .await;
        }

        let size = blob.len();
        let Blob { metadata, payload } = blob;
        let request = with_content_headers(
            SwiftRequest::new(Method::PUT, self.object_url(container, &metadata.name)),
            &metadata,
        )
        .body(payload);
        let etag = self.put_object(container, &request).await?;
        debug!(container, blob = %metadata.name, size, "put object");
        Ok(etag)
    }

    async fn blob_metadata(
        &self,
        container: &str,
        name: &str,
    ) -> CloudResult<Option<BlobMetadata>> {
        check_blob_name(container, name)?;
        let request = SwiftRequest::new(Method::HEAD, self.object_url(container, name));
        let response = self.send("head object", &request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.ensure_container(container).await?;
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response, "head object").await);
        }

        let public = self
            .container_info(container)
            .await?
            .is_some_and(|info| info.public_read);
        Ok(Some(self.blob_metadata_from(
            container,
            name,
            response.headers(),
            public,
        )))
    }

    async fn get_blob(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> CloudResult<Option<Blob>> {
        check_blob_name(container, name)?;
        let request = SwiftRequest::new(Method::GET, self.object_url(container, name))
            .optional_header("range", options.range.map(|r| r.header_value()).as_ref())
            .optional_header("if-match", options.if_match.as_ref())
            .optional_header("if-none-match", options.if_none_match.as_ref());

        let response = self.send("get object", &request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                self.ensure_container(container).await?;
                return Ok(None);
            }
            StatusCode::NOT_MODIFIED => {
                return Err(CloudError::illegal_state(format!(
                    "{}/{} not modified",
                    container, name
                )))
            }
            status if !status.is_success() => {
                return Err(status_error(response, "get object").await)
            }
            _ => {}
        }

        let public = self
            .container_info(container)
            .await?
            .is_some_and(|info| info.public_read);
        let metadata = self.blob_metadata_from(container, name, response.headers(), public);
        let payload = response.bytes().await?;
        debug!(container, blob = name, size = payload.len(), "got object");
        Ok(Some(Blob { metadata, payload }))
    }

    async fn remove_blob(&self, container: &str, name: &str) -> CloudResult<()> {
        check_blob_name(container, name)?;
        self.delete_with_segments(container, name).await
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
        let request = SwiftRequest::new(Method::PUT, self.object_url(to_container, to_name))
            .header("x-copy-from", encode_object_path(from_container, from_name));

        let response = self.send("copy object", &request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.ensure_container(to_container).await?;
            self.ensure_container(from_container).await?;
            return Err(CloudError::key_not_found(from_container, from_name));
        }
        if !response.status().is_success() {
            return Err(status_error(response, "copy object").await);
        }
        Ok(etag_of(&response))
    }

    async fn initiate_multipart_upload(
        &self,
        container: &str,
        metadata: BlobMetadata,
        options: &PutOptions,
    ) -> CloudResult<MultipartUpload> {
        check_blob_name(container, &metadata.name)?;
        if options.blob_access == BlobAccess::PublicRead {
            return Err(CloudError::unsupported(PROVIDER_ID, "set_blob_access"));
        }
        self.ensure_container(container).await?;
        let id = uuid::Uuid::new_v4().to_string();
        debug!(container, blob = %metadata.name, upload_id = %id, "starting segmented upload");
        Ok(MultipartUpload::new(
            container,
            metadata.name.clone(),
            id,
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
        if part_number == 0 {
            return Err(CloudError::illegal_argument("part numbers start at 1"));
        }
        let size = payload.len() as u64;
        let segment = segment_name(upload, part_number);
        let request =
            SwiftRequest::new(Method::PUT, self.object_url(&upload.container, &segment)).body(payload);
        let etag = self.put_object(&upload.container, &request).await?;
        Ok(MultipartPart::new(part_number, size, etag))
    }

    async fn complete_multipart_upload(
        &self,
        upload: &MultipartUpload,
        parts: &[MultipartPart],
    ) -> CloudResult<String> {
        validate_parts(parts)?;
        let manifest: Vec<ManifestSegment> = parts
            .iter()
            .map(|part| ManifestSegment {
                path: format!("/{}/{}", upload.container, segment_name(upload, part.part_number)),
                etag: part.etag.clone(),
                size_bytes: part.size,
            })
            .collect();
        let body = serde_json::to_vec(&manifest)
            .map_err(|e| CloudError::parse(format!("serialize manifest: {}", e)))?;

        let mut url = self.object_url(&upload.container, &upload.blob_name);
        url.query_pairs_mut().append_pair("multipart-manifest", "put");
        let request = with_content_headers(SwiftRequest::new(Method::PUT, url), &upload.metadata)
            .body(Bytes::from(body));

        let etag = self.put_object(&upload.container, &request).await?;
        info!(
            container = %upload.container,
            blob = %upload.blob_name,
            segments = parts.len(),
            "wrote large object manifest"
        );
        Ok(etag)
    }

    async fn abort_multipart_upload(&self, upload: &MultipartUpload) -> CloudResult<()> {
        let segments = self.list_multipart_upload(upload).await?;
        for part in &segments {
            self.delete_object(&upload.container, &segment_name(upload, part.part_number))
                .await?;
        }
        debug!(upload_id = %upload.id, segments = segments.len(), "deleted upload segments");
        Ok(())
    }

    async fn list_multipart_upload(
        &self,
        upload: &MultipartUpload,
    ) -> CloudResult<Vec<MultipartPart>> {
        let prefix = segment_prefix(&upload.blob_name, &upload.id);
        let entries = collect_all(
            self,
            &upload.container,
            ListContainerOptions::new().prefix(prefix.clone()).recursive(),
        )
        .await?;

        let mut parts: Vec<MultipartPart> = entries
            .into_iter()
            .filter_map(|entry| {
                let number = entry.name.strip_prefix(&prefix)?.parse().ok()?;
                let mut part =
                    MultipartPart::new(number, entry.size.unwrap_or(0), entry.etag.unwrap_or_default());
                part.last_modified = entry.last_modified;
                Some(part)
            })
            .collect();
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    fn minimum_multipart_part_size(&self) -> u64 {
        MIN_SEGMENT_SIZE
    }

    fn maximum_multipart_part_size(&self) -> u64 {
        MAX_OBJECT_SIZE
    }

    fn maximum_number_of_parts(&self) -> u32 {
        MAX_MANIFEST_SEGMENTS
    }

    fn signer(&self) -> Option<&dyn BlobRequestSigner> {
        self.temp_url_key
            .as_ref()
            .map(|_| self as &dyn BlobRequestSigner)
    }
}

#[async_trait]
impl BlobRequestSigner for RegionScopedSwiftBlobStore {
    async fn sign_get_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        self.sign(Method::GET, container, name, expires_in).await
    }

    async fn sign_put_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        self.sign(Method::PUT, container, name, expires_in).await
    }

    async fn sign_remove_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        self.sign(Method::DELETE, container, name, expires_in).await
    }
}
