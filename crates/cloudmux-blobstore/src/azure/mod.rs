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

//! Azure Blob Storage
//!
//! Talks to the Blob service REST API (version 2018-11-09) with Shared Key
//! authentication over [`RestClient`].
//!
//! # Multipart uploads
//!
//! Azure has no multipart API. Parts are uploaded as uncommitted *blocks*
//! (`Put Block`) and the upload is completed by committing the block list
//! (`Put Block List`). Block ids are the base64 of the zero-padded part
//! number, so every id of a blob has the same length. Aborting is a no-op:
//! the service discards uncommitted blocks after a week.
//!
//! # Examples
//!
//! ```no_run
//! use cloudmux_blobstore::azure::AzureBlobStore;
//! use cloudmux_blobstore::{Blob, BlobStore, PutOptions};
//! use cloudmux_core::RestClient;
//!
//! #[tokio::main]
//! async fn main() -> cloudmux_core::CloudResult<()> {
//!     let store = AzureBlobStore::from_connection_string(
//!         "AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net",
//!         RestClient::with_defaults()?,
//!     )?;
//!     store.create_container("logs").await?;
//!     let blob = Blob::builder("app.log").payload("started\n").build();
//!     store.put_blob("logs", blob, &PutOptions::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod sas;
mod xml;

use self::auth::{header_value, AzureCredentials, ConnectionString};
use self::sas::{blob_sas_query, SasPermissions};
use self::xml::{
    from_xml, non_empty, to_xml, BlobEnumeration, BlobListEntry, BlockListRequest,
    BlockListResponse, ContainerEnumeration,
};
use crate::domain::{
    Blob, BlobAccess, BlobMetadata, ContainerAccess, ContentMetadata, PageSet, StorageMetadata,
    StorageType,
};
use crate::multipart::{
    put_multipart_blob, validate_parts, MultipartPart, MultipartUpload, DEFAULT_PART_CONCURRENCY,
};
use crate::options::{CreateContainerOptions, GetOptions, ListContainerOptions, PutOptions};
use crate::{check_blob_name, check_container_name, BlobRequestSigner, BlobStore, SignedRequest};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloudmux_core::http::{header_str, header_u64, prefixed_headers, status_error, unquote_etag};
use cloudmux_core::{
    CloudError, CloudResult, Location, PollSettings, Predicate, RestClient, RetryablePredicate,
};
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Method, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::{form_urlencoded, Url};

/// Provider id of the Azure store
pub const PROVIDER_ID: &str = "azureblob";

const MIB: u64 = 1024 * 1024;

/// Largest payload sent with a single `Put Blob`
pub const MAX_SINGLE_PUT: u64 = 64 * MIB;

/// Smallest block used when splitting payloads
pub const MIN_BLOCK_SIZE: u64 = MIB;

/// Largest block accepted by `Put Block`
pub const MAX_BLOCK_SIZE: u64 = 100 * MIB;

/// Most blocks a blob can be committed from
pub const MAX_BLOCKS: u32 = 50_000;

const META_PREFIX: &str = "x-ms-meta-";

/// A request before signing
#[derive(Debug, Clone)]
pub(crate) struct AzureRequest {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
}

impl AzureRequest {
    pub(crate) fn new(method: Method, url: Url) -> Self {
        AzureRequest {
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

    pub(crate) fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub(crate) fn header_map(&self) -> CloudResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len() + 4);
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())
                .map_err(|e| CloudError::illegal_argument(format!("invalid header {}: {}", name, e)))?;
            map.insert(name, header_value(value)?);
        }
        Ok(map)
    }
}

/// Azure Blob Storage account
#[derive(Clone)]
pub struct AzureBlobStore {
    http: RestClient,
    credentials: Arc<AzureCredentials>,
    endpoint: Url,
    location: Location,
    copy_polling: PollSettings,
}

impl fmt::Debug for AzureBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobStore")
            .field("account", &self.credentials.account())
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

impl AzureBlobStore {
    /// Store for an account; `endpoint` defaults to the public cloud
    pub fn new(
        credentials: AzureCredentials,
        endpoint: Option<Url>,
        http: RestClient,
    ) -> CloudResult<Self> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => Url::parse(&format!(
                "https://{}.blob.core.windows.net/",
                credentials.account()
            ))
            .map_err(|e| CloudError::illegal_argument(format!("invalid account name: {}", e)))?,
        };
        if endpoint.cannot_be_a_base() {
            return Err(CloudError::illegal_argument(format!(
                "blob endpoint {} cannot hold paths",
                endpoint
            )));
        }

        info!(account = %credentials.account(), endpoint = %endpoint, "Azure blob store ready");
        Ok(AzureBlobStore {
            http,
            location: Location::provider(PROVIDER_ID)
                .with_description(format!("storage account {}", credentials.account())),
            credentials: Arc::new(credentials),
            endpoint,
            copy_polling: PollSettings::with_timeout(Duration::from_secs(600)),
        })
    }

    /// Store described by a connection string
    pub fn from_connection_string(raw: &str, http: RestClient) -> CloudResult<Self> {
        let parsed = ConnectionString::parse(raw)?;
        let credentials = AzureCredentials::new(parsed.account_name.clone(), &parsed.account_key)?;
        Self::new(credentials, Some(parsed.endpoint()?), http)
    }

    /// Polling used while a server-side copy is pending
    pub fn with_copy_polling(mut self, settings: PollSettings) -> Self {
        self.copy_polling = settings;
        self
    }

    /// Storage account name
    pub fn account(&self) -> &str {
        self.credentials.account()
    }

    fn resource_url(&self, container: &str, name: Option<&str>, query: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(container);
            if let Some(name) = name {
                path.extend(name.split('/'));
            }
        }
        set_query(&mut url, query);
        url
    }

    fn container_url(&self, container: &str, query: &[(&str, &str)]) -> Url {
        self.resource_url(container, None, query)
    }

    fn blob_url(&self, container: &str, name: &str, query: &[(&str, &str)]) -> Url {
        self.resource_url(container, Some(name), query)
    }

    /// Sign and send, retrying transient failures
    async fn send(&self, context: &str, request: &AzureRequest) -> CloudResult<Response> {
        self.http
            .execute(context, |client| {
                self.credentials.signed_request(client, request, Utc::now())
            })
            .await
    }

    /// [`send`](Self::send) mapping failures, with `ContainerNotFound` refined
    async fn send_checked(
        &self,
        context: &str,
        container: &str,
        request: &AzureRequest,
    ) -> CloudResult<Response> {
        let response = self.send(context, request).await?;
        check(response, context, container).await
    }

    async fn list_page(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> CloudResult<BlobEnumeration> {
        let page_size = options.page_size().to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("restype", "container"),
            ("comp", "list"),
            ("include", "metadata"),
            ("maxresults", &page_size),
        ];
        if let Some(prefix) = &options.prefix {
            query.push(("prefix", prefix));
        }
        if let Some(delimiter) = options.effective_delimiter() {
            query.push(("delimiter", delimiter));
        }
        if let Some(marker) = &options.marker {
            query.push(("marker", marker));
        }

        let request = AzureRequest::new(Method::GET, self.container_url(container, &query));
        let response = self.send_checked("list blobs", container, &request).await?;
        from_xml(&response.text().await?, "list blobs")
    }

    async fn put_simple(
        &self,
        container: &str,
        blob: Blob,
    ) -> CloudResult<String> {
        let Blob { metadata, payload } = blob;
        let content = &metadata.content;
        let mut request = AzureRequest::new(Method::PUT, self.blob_url(container, &metadata.name, &[]))
            .header("x-ms-blob-type", "BlockBlob")
            .optional_header("content-type", content.content_type.as_ref())
            .optional_header("content-encoding", content.content_encoding.as_ref())
            .optional_header("content-language", content.content_language.as_ref())
            .optional_header("cache-control", content.cache_control.as_ref())
            .optional_header(
                "x-ms-blob-content-disposition",
                content.content_disposition.as_ref(),
            )
            .body(payload);
        for (key, value) in &metadata.user_metadata {
            request = request.header(format!("{}{}", META_PREFIX, key), value.clone());
        }

        let response = self.send_checked("put blob", container, &request).await?;
        let etag = etag_of(&response);
        debug!(container, blob = %metadata.name, size = request.body.len(), "put blob");
        Ok(etag)
    }

    async fn copy_status(&self, container: &str, name: &str) -> CloudResult<CopyProgress> {
        let request = AzureRequest::new(Method::HEAD, self.blob_url(container, name, &[]));
        let response = self.send_checked("get blob properties", container, &request).await?;
        let headers = response.headers();
        Ok(CopyProgress {
            status: header_str(headers, "x-ms-copy-status").unwrap_or_else(|| "success".to_string()),
            description: header_str(headers, "x-ms-copy-status-description"),
            etag: header_str(headers, "etag").map(|e| unquote_etag(&e)),
        })
    }
}

/// Fail non-2xx answers, reporting a missing container as such
async fn check(response: Response, context: &str, container: &str) -> CloudResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    if error_code(&response).as_deref() == Some("ContainerNotFound") {
        return Err(CloudError::container_not_found(container));
    }
    Err(status_error(response, context).await)
}

fn error_code(response: &Response) -> Option<String> {
    header_str(response.headers(), "x-ms-error-code")
}

fn etag_of(response: &Response) -> String {
    header_str(response.headers(), "etag")
        .map(|e| unquote_etag(&e))
        .unwrap_or_default()
}

fn encode_query_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn set_query(url: &mut Url, query: &[(&str, &str)]) {
    if query.is_empty() {
        url.set_query(None);
        return;
    }
    let joined = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, encode_query_value(v)))
        .collect::<Vec<_>>()
        .join("&");
    url.set_query(Some(&joined));
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Block id of a part: base64 of the 6-digit part number
pub fn block_id(part_number: u32) -> String {
    BASE64.encode(format!("{:06}", part_number))
}

/// Part number encoded in a block id
pub fn part_number_of(block_id: &str) -> Option<u32> {
    let decoded = BASE64.decode(block_id).ok()?;
    std::str::from_utf8(&decoded).ok()?.parse().ok()
}

fn metadata_from_headers(
    container: &str,
    name: &str,
    headers: &HeaderMap,
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
            content_md5: header_str(headers, "content-md5"),
            content_encoding: header_str(headers, "content-encoding"),
            content_language: header_str(headers, "content-language"),
            content_disposition: header_str(headers, "content-disposition"),
            cache_control: header_str(headers, "cache-control"),
            expires: None,
        },
        user_metadata: prefixed_headers(headers, META_PREFIX).into_iter().collect(),
        public_uri: None,
        location: Some(location),
    }
}

/// State of a server-side copy, refreshed by [`CopyDone`]
#[derive(Debug, Clone, Default)]
struct CopyProgress {
    status: String,
    description: Option<String>,
    etag: Option<String>,
}

/// Holds once a pending copy reports `success`
struct CopyDone<'a> {
    store: &'a AzureBlobStore,
    container: &'a str,
    name: &'a str,
}

#[async_trait]
impl Predicate<CopyProgress> for CopyDone<'_> {
    async fn test(&self, progress: &mut CopyProgress) -> CloudResult<bool> {
        *progress = self.store.copy_status(self.container, self.name).await?;
        match progress.status.as_str() {
            "success" => Ok(true),
            "pending" => Ok(false),
            other => Err(CloudError::illegal_state(format!(
                "copy to {}/{} {}: {}",
                self.container,
                self.name,
                other,
                progress.description.as_deref().unwrap_or("no description")
            ))),
        }
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
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
        let page_size = options.page_size().to_string();
        let mut query: Vec<(&str, &str)> = vec![("comp", "list"), ("maxresults", &page_size)];
        if let Some(prefix) = &options.prefix {
            query.push(("prefix", prefix));
        }
        if let Some(marker) = &options.marker {
            query.push(("marker", marker));
        }

        let mut url = self.endpoint.clone();
        set_query(&mut url, &query);
        let request = AzureRequest::new(Method::GET, url);
        let response = self.send_checked("list containers", "", &request).await?;
        let parsed: ContainerEnumeration =
            from_xml(&response.text().await?, "list containers")?;

        let items = parsed
            .containers
            .items
            .into_iter()
            .map(|entry| {
                let mut item =
                    StorageMetadata::container(entry.name).with_location(self.location.clone());
                if let Some(etag) = non_empty(entry.properties.etag) {
                    item = item.with_etag(unquote_etag(&etag));
                }
                if let Some(modified) = entry
                    .properties
                    .last_modified
                    .as_deref()
                    .and_then(parse_http_date)
                {
                    item = item.with_last_modified(modified);
                }
                item
            })
            .collect();
        Ok(PageSet::new(items, non_empty(parsed.next_marker)))
    }

    async fn container_exists(&self, container: &str) -> CloudResult<bool> {
        check_container_name(container)?;
        let request = AzureRequest::new(
            Method::HEAD,
            self.container_url(container, &[("restype", "container")]),
        );
        let response = self.send("get container properties", &request).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(response, "get container properties").await),
        }
    }

    async fn create_container_in_location(
        &self,
        _location: Option<&Location>,
        container: &str,
        options: &CreateContainerOptions,
    ) -> CloudResult<bool> {
        check_container_name(container)?;
        let mut request = AzureRequest::new(
            Method::PUT,
            self.container_url(container, &[("restype", "container")]),
        );
        if options.public_read {
            request = request.header("x-ms-blob-public-access", "container");
        }

        let response = self.send("create container", &request).await?;
        if response.status() == StatusCode::CONFLICT
            && error_code(&response).as_deref() == Some("ContainerAlreadyExists")
        {
            debug!(container, "container already exists");
            return Ok(false);
        }
        check(response, "create container", container).await?;
        info!(container, account = %self.account(), "created container");
        Ok(true)
    }

    async fn container_access(&self, container: &str) -> CloudResult<ContainerAccess> {
        check_container_name(container)?;
        let request = AzureRequest::new(
            Method::GET,
            self.container_url(container, &[("restype", "container"), ("comp", "acl")]),
        );
        let response = self.send_checked("get container acl", container, &request).await?;
        Ok(
            match header_str(response.headers(), "x-ms-blob-public-access").as_deref() {
                Some("container") | Some("blob") => ContainerAccess::PublicRead,
                _ => ContainerAccess::Private,
            },
        )
    }

    async fn set_container_access(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> CloudResult<()> {
        check_container_name(container)?;
        let mut request = AzureRequest::new(
            Method::PUT,
            self.container_url(container, &[("restype", "container"), ("comp", "acl")]),
        );
        if access == ContainerAccess::PublicRead {
            request = request.header("x-ms-blob-public-access", "container");
        }
        self.send_checked("set container acl", container, &request).await?;
        Ok(())
    }

    async fn list(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> CloudResult<PageSet<StorageMetadata>> {
        check_container_name(container)?;
        let parsed = self.list_page(container, options).await?;

        let mut items: Vec<StorageMetadata> = parsed
            .blobs
            .entries
            .into_iter()
            .map(|entry| match entry {
                BlobListEntry::Blob(blob) => {
                    let props = blob.properties;
                    let mut item = StorageMetadata::blob(blob.name, props.content_length.unwrap_or(0))
                        .with_location(self.location.clone());
                    if item.name.ends_with('/') {
                        item.kind = StorageType::Folder;
                    }
                    if let Some(etag) = non_empty(props.etag) {
                        item = item.with_etag(unquote_etag(&etag));
                    }
                    if let Some(modified) = props.last_modified.as_deref().and_then(parse_http_date) {
                        item = item.with_last_modified(modified);
                    }
                    if let Some(created) = props.creation_time.as_deref().and_then(parse_http_date) {
                        item = item.with_creation_date(created);
                    }
                    item.user_metadata.extend(blob.metadata);
                    item
                }
                BlobListEntry::BlobPrefix(prefix) => StorageMetadata::relative_path(prefix.name),
            })
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(PageSet::new(items, non_empty(parsed.next_marker)))
    }

    async fn delete_container_if_empty(&self, container: &str) -> CloudResult<bool> {
        check_container_name(container)?;
        let first_entry = ListContainerOptions::new().recursive().max_results(1);
        match self.list_page(container, &first_entry).await {
            Ok(page) if !page.blobs.entries.is_empty() => return Ok(false),
            Ok(_) => {}
            Err(CloudError::ContainerNotFound(_)) => return Ok(true),
            Err(e) => return Err(e),
        }

        let request = AzureRequest::new(
            Method::DELETE,
            self.container_url(container, &[("restype", "container")]),
        );
        let response = self.send("delete container", &request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(true);
        }
        check(response, "delete container", container).await?;
        info!(container, "deleted container");
        Ok(true)
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
        if options.multipart || blob.len() > MAX_SINGLE_PUT {
            return put_multipart_blob(self, container, blob, options, DEFAULT_PART_CONCURRENCY)
                .await;
        }
        self.put_simple(container, blob).await
    }

    async fn blob_metadata(
        &self,
        container: &str,
        name: &str,
    ) -> CloudResult<Option<BlobMetadata>> {
        check_blob_name(container, name)?;
        let request = AzureRequest::new(Method::HEAD, self.blob_url(container, name, &[]));
        let response = self.send("get blob properties", &request).await?;
        if response.status() == StatusCode::NOT_FOUND
            && error_code(&response).as_deref() != Some("ContainerNotFound")
        {
            return Ok(None);
        }
        let response = check(response, "get blob properties", container).await?;
        Ok(Some(metadata_from_headers(
            container,
            name,
            response.headers(),
            self.location.clone(),
        )))
    }

    async fn get_blob(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> CloudResult<Option<Blob>> {
        check_blob_name(container, name)?;
        let request = AzureRequest::new(Method::GET, self.blob_url(container, name, &[]))
            .optional_header("range", options.range.map(|r| r.header_value()).as_ref())
            .optional_header("if-match", options.if_match.as_ref())
            .optional_header("if-none-match", options.if_none_match.as_ref());

        let response = self.send("get blob", &request).await?;
        match response.status() {
            StatusCode::NOT_FOUND
                if error_code(&response).as_deref() != Some("ContainerNotFound") =>
            {
                return Ok(None)
            }
            StatusCode::NOT_MODIFIED => {
                return Err(CloudError::illegal_state(format!(
                    "{}/{} not modified",
                    container, name
                )))
            }
            _ => {}
        }
        let response = check(response, "get blob", container).await?;

        let metadata =
            metadata_from_headers(container, name, response.headers(), self.location.clone());
        let payload = response.bytes().await?;
        debug!(container, blob = name, size = payload.len(), "got blob");
        Ok(Some(Blob { metadata, payload }))
    }

    async fn remove_blob(&self, container: &str, name: &str) -> CloudResult<()> {
        check_blob_name(container, name)?;
        let request = AzureRequest::new(Method::DELETE, self.blob_url(container, name, &[]));
        let response = self.send("delete blob", &request).await?;
        if response.status() == StatusCode::NOT_FOUND
            && error_code(&response).as_deref() != Some("ContainerNotFound")
        {
            return Ok(());
        }
        check(response, "delete blob", container).await?;
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
        let source = self.blob_url(from_container, from_name, &[]);
        let request = AzureRequest::new(Method::PUT, self.blob_url(to_container, to_name, &[]))
            .header("x-ms-copy-source", source.as_str());

        let response = self.send("copy blob", &request).await?;
        if response.status() == StatusCode::NOT_FOUND
            && matches!(
                error_code(&response).as_deref(),
                Some("BlobNotFound") | Some("CannotVerifyCopySource")
            )
        {
            return Err(CloudError::key_not_found(from_container, from_name));
        }
        let response = check(response, "copy blob", to_container).await?;

        let mut progress = CopyProgress {
            status: header_str(response.headers(), "x-ms-copy-status")
                .unwrap_or_else(|| "success".to_string()),
            description: None,
            etag: Some(etag_of(&response)),
        };
        if progress.status == "pending" {
            debug!(to_container, to_name, "copy pending, polling");
            let predicate = CopyDone {
                store: self,
                container: to_container,
                name: to_name,
            };
            RetryablePredicate::new(predicate, self.copy_polling)
                .await_true(&mut progress, "blob copy")
                .await?;
        } else if progress.status != "success" {
            return Err(CloudError::illegal_state(format!(
                "copy to {}/{} {}",
                to_container, to_name, progress.status
            )));
        }
        Ok(progress.etag.unwrap_or_default())
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
        let id = uuid::Uuid::new_v4().to_string();
        debug!(container, blob = %metadata.name, upload_id = %id, "starting block upload");
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
        let id = block_id(part_number);
        let size = payload.len() as u64;
        let request = AzureRequest::new(
            Method::PUT,
            self.blob_url(
                &upload.container,
                &upload.blob_name,
                &[("comp", "block"), ("blockid", &id)],
            ),
        )
        .body(payload);
        self.send_checked("put block", &upload.container, &request)
            .await?;
        Ok(MultipartPart::new(part_number, size, id))
    }

    async fn complete_multipart_upload(
        &self,
        upload: &MultipartUpload,
        parts: &[MultipartPart],
    ) -> CloudResult<String> {
        validate_parts(parts)?;
        let body = to_xml(&BlockListRequest {
            latest: parts.iter().map(|p| block_id(p.part_number)).collect(),
        })?;

        let metadata = &upload.metadata;
        let content = &metadata.content;
        let mut request = AzureRequest::new(
            Method::PUT,
            self.blob_url(&upload.container, &upload.blob_name, &[("comp", "blocklist")]),
        )
        .optional_header("x-ms-blob-content-type", content.content_type.as_ref())
        .optional_header("x-ms-blob-content-encoding", content.content_encoding.as_ref())
        .optional_header("x-ms-blob-content-language", content.content_language.as_ref())
        .optional_header(
            "x-ms-blob-content-disposition",
            content.content_disposition.as_ref(),
        )
        .optional_header("x-ms-blob-cache-control", content.cache_control.as_ref())
        .body(Bytes::from(body));
        for (key, value) in &metadata.user_metadata {
            request = request.header(format!("{}{}", META_PREFIX, key), value.clone());
        }

        let response = self
            .send_checked("put block list", &upload.container, &request)
            .await?;
        info!(
            container = %upload.container,
            blob = %upload.blob_name,
            blocks = parts.len(),
            "committed block list"
        );
        Ok(etag_of(&response))
    }

    async fn abort_multipart_upload(&self, upload: &MultipartUpload) -> CloudResult<()> {
        // uncommitted blocks are garbage-collected by the service
        debug!(upload_id = %upload.id, blob = %upload.blob_name, "abandoning uncommitted blocks");
        Ok(())
    }

    async fn list_multipart_upload(
        &self,
        upload: &MultipartUpload,
    ) -> CloudResult<Vec<MultipartPart>> {
        let request = AzureRequest::new(
            Method::GET,
            self.blob_url(
                &upload.container,
                &upload.blob_name,
                &[("comp", "blocklist"), ("blocklisttype", "uncommitted")],
            ),
        );
        let response = self.send("get block list", &request).await?;
        if response.status() == StatusCode::NOT_FOUND
            && error_code(&response).as_deref() != Some("ContainerNotFound")
        {
            return Ok(Vec::new());
        }
        let response = check(response, "get block list", &upload.container).await?;
        let parsed: BlockListResponse = from_xml(&response.text().await?, "get block list")?;

        let mut parts: Vec<MultipartPart> = parsed
            .uncommitted
            .blocks
            .into_iter()
            .filter_map(|block| {
                let number = part_number_of(&block.name)?;
                Some(MultipartPart::new(number, block.size, block.name))
            })
            .collect();
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    fn minimum_multipart_part_size(&self) -> u64 {
        MIN_BLOCK_SIZE
    }

    fn maximum_multipart_part_size(&self) -> u64 {
        MAX_BLOCK_SIZE
    }

    fn maximum_number_of_parts(&self) -> u32 {
        MAX_BLOCKS
    }

    fn signer(&self) -> Option<&dyn BlobRequestSigner> {
        Some(self)
    }
}

impl AzureBlobStore {
    fn signed_blob_url(
        &self,
        container: &str,
        name: &str,
        permissions: SasPermissions,
        expires_in: Duration,
    ) -> CloudResult<Url> {
        check_blob_name(container, name)?;
        let expires_in = chrono::Duration::from_std(expires_in)
            .map_err(|e| CloudError::illegal_argument(format!("invalid expiry: {}", e)))?;
        let query = blob_sas_query(
            &self.credentials,
            container,
            name,
            permissions,
            Utc::now() + expires_in,
        )?;
        let mut url = self.blob_url(container, name, &[]);
        url.set_query(Some(&query));
        Ok(url)
    }
}

#[async_trait]
impl BlobRequestSigner for AzureBlobStore {
    async fn sign_get_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        let url = self.signed_blob_url(container, name, SasPermissions::Read, expires_in)?;
        Ok(SignedRequest::new(Method::GET, url))
    }

    async fn sign_put_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        let url = self.signed_blob_url(container, name, SasPermissions::Write, expires_in)?;
        Ok(SignedRequest::new(Method::PUT, url).with_header("x-ms-blob-type", "BlockBlob"))
    }

    async fn sign_remove_blob(
        &self,
        container: &str,
        name: &str,
        expires_in: Duration,
    ) -> CloudResult<SignedRequest> {
        let url = self.signed_blob_url(container, name, SasPermissions::Delete, expires_in)?;
        Ok(SignedRequest::new(Method::DELETE, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AzureBlobStore {
        AzureBlobStore::new(
            AzureCredentials::new("acct", "a2V5").unwrap(),
            None,
            RestClient::with_defaults().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_block_ids() {
        assert_eq!(block_id(1), "MDAwMDAx");
        assert_eq!(block_id(42).len(), block_id(50_000).len());
        assert_eq!(part_number_of(&block_id(1234)), Some(1234));
        assert_eq!(part_number_of("not base64!"), None);
    }

    #[test]
    fn test_urls() {
        let store = store();
        assert_eq!(
            store.container_url("logs", &[("restype", "container")]).as_str(),
            "https://acct.blob.core.windows.net/logs?restype=container"
        );
        assert_eq!(
            store.blob_url("logs", "2024/a b.txt", &[]).as_str(),
            "https://acct.blob.core.windows.net/logs/2024/a%20b.txt"
        );
        assert_eq!(
            store
                .container_url("logs", &[("prefix", "a b+c")])
                .query(),
            Some("prefix=a%20b%2Bc")
        );
    }

    #[test]
    fn test_emulator_urls_keep_account_path() {
        let store = AzureBlobStore::from_connection_string(
            "AccountName=devstoreaccount1;AccountKey=a2V5;BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1",
            RestClient::with_defaults().unwrap(),
        )
        .unwrap();
        assert_eq!(
            store.blob_url("c", "b", &[]).as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/c/b"
        );
    }

    #[test]
    fn test_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", "\"0x8D\"".parse().unwrap());
        headers.insert("content-length", "4".parse().unwrap());
        headers.insert("content-range", "bytes 0-3/10".parse().unwrap());
        headers.insert("content-type", "text/plain".parse().unwrap());
        headers.insert("last-modified", "Mon, 27 Jan 2025 10:00:00 GMT".parse().unwrap());
        headers.insert("x-ms-meta-owner", "ops".parse().unwrap());

        let meta = metadata_from_headers("c", "b", &headers, Location::provider(PROVIDER_ID));
        assert_eq!(meta.etag.as_deref(), Some("0x8D"));
        assert_eq!(meta.size, Some(10));
        assert_eq!(meta.content.content_length, Some(4));
        assert_eq!(meta.content.content_type.as_deref(), Some("text/plain"));
        assert_eq!(meta.user_metadata.get("owner").map(String::as_str), Some("ops"));
        assert!(meta.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_sas_urls() {
        let store = store();
        let signed = store
            .sign_put_blob("logs", "app.log", Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(signed.method, Method::PUT);
        assert_eq!(signed.url.path(), "/logs/app.log");
        let query = signed.url.query().unwrap();
        assert!(query.contains("sp=cw"));
        assert!(query.contains("sr=b"));
        assert!(query.contains("sig="));
        assert_eq!(
            signed.headers,
            vec![("x-ms-blob-type".to_string(), "BlockBlob".to_string())]
        );

        let signed = store
            .sign_remove_blob("logs", "app.log", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(signed.method, Method::DELETE);
        assert!(signed.url.query().unwrap().contains("sp=d"));
    }

    #[tokio::test]
    async fn test_public_blob_access_unsupported() {
        let store = store();
        let blob = Blob::builder("b").payload("x").build();
        let options = PutOptions::default().with_blob_access(BlobAccess::PublicRead);
        let err = store.put_blob("c", blob, &options).await.unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_part_limits() {
        let store = store();
        assert_eq!(store.minimum_multipart_part_size(), MIB);
        assert_eq!(store.maximum_multipart_part_size(), 100 * MIB);
        assert_eq!(store.maximum_number_of_parts(), 50_000);
    }
}
