// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider-neutral blob storage model
//!
//! Every adapter translates its wire format into these types, so a listing
//! from Azure looks the same as one from Swift or S3.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloudmux_core::Location;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Kind of an entry returned by a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Top-level container (bucket)
    Container,
    /// Stored object
    Blob,
    /// Directory marker object
    Folder,
    /// Common prefix rolled up by a delimiter listing
    RelativePath,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageType::Container => "container",
            StorageType::Blob => "blob",
            StorageType::Folder => "folder",
            StorageType::RelativePath => "relative_path",
        };
        f.write_str(name)
    }
}

/// Who may read a container's blobs without credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAccess {
    /// Authenticated access only
    #[default]
    Private,
    /// Anonymous read
    PublicRead,
}

/// Who may read a single blob without credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobAccess {
    /// Authenticated access only
    #[default]
    Private,
    /// Anonymous read
    PublicRead,
}

/// One entry of a container or blob listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetadata {
    /// Entry kind
    pub kind: StorageType,
    /// Container name, blob name or common prefix
    pub name: String,
    /// Where the entry lives, when the provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Entity tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    /// Last modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// User metadata, when the listing includes it
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_metadata: BTreeMap<String, String>,
}

impl StorageMetadata {
    fn bare(kind: StorageType, name: impl Into<String>) -> Self {
        StorageMetadata {
            kind,
            name: name.into(),
            location: None,
            etag: None,
            creation_date: None,
            last_modified: None,
            size: None,
            user_metadata: BTreeMap::new(),
        }
    }

    /// Entry describing a container
    pub fn container(name: impl Into<String>) -> Self {
        Self::bare(StorageType::Container, name)
    }

    /// Entry describing a blob
    pub fn blob(name: impl Into<String>, size: u64) -> Self {
        let mut entry = Self::bare(StorageType::Blob, name);
        entry.size = Some(size);
        entry
    }

    /// Entry describing a common prefix
    pub fn relative_path(name: impl Into<String>) -> Self {
        Self::bare(StorageType::RelativePath, name)
    }

    /// Set the etag
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Set the last modification time
    pub fn with_last_modified(mut self, when: DateTime<Utc>) -> Self {
        self.last_modified = Some(when);
        self
    }

    /// Set the creation time
    pub fn with_creation_date(mut self, when: DateTime<Utc>) -> Self {
        self.creation_date = Some(when);
        self
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Whether this entry is a stored object
    pub fn is_blob(&self) -> bool {
        self.kind == StorageType::Blob
    }
}

/// HTTP entity headers of a blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Payload length in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// Base64 MD5 digest as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,
    /// Content-Encoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Content-Language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// Content-Disposition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// Cache-Control
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

/// Everything known about a blob except its payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// Owning container (empty until the blob is stored)
    pub container: String,
    /// Blob name
    pub name: String,
    /// Entity tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Size of the stored object in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Entity headers
    #[serde(default)]
    pub content: ContentMetadata,
    /// User metadata (provider prefix stripped, keys lowercased)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_metadata: BTreeMap<String, String>,
    /// Anonymous URL, when the container is publicly readable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_uri: Option<Url>,
    /// Where the blob lives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl BlobMetadata {
    /// Listing entry equivalent of this metadata
    pub fn to_storage_metadata(&self) -> StorageMetadata {
        StorageMetadata {
            kind: StorageType::Blob,
            name: self.name.clone(),
            location: self.location.clone(),
            etag: self.etag.clone(),
            creation_date: None,
            last_modified: self.last_modified,
            size: self.size.or(self.content.content_length),
            user_metadata: self.user_metadata.clone(),
        }
    }
}

/// A blob with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Metadata
    pub metadata: BlobMetadata,
    /// Payload
    pub payload: Bytes,
}

impl Blob {
    /// Start building a blob with the given name
    pub fn builder(name: impl Into<String>) -> BlobBuilder {
        BlobBuilder {
            metadata: BlobMetadata {
                name: name.into(),
                ..Default::default()
            },
            payload: Bytes::new(),
        }
    }

    /// Blob name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Payload length in bytes
    pub fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Builder for [`Blob`]
#[derive(Debug, Clone)]
pub struct BlobBuilder {
    metadata: BlobMetadata,
    payload: Bytes,
}

impl BlobBuilder {
    /// Set the payload
    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the MIME type
    pub fn content_type(mut self, value: impl Into<String>) -> Self {
        self.metadata.content.content_type = Some(value.into());
        self
    }

    /// Set Content-Disposition
    pub fn content_disposition(mut self, value: impl Into<String>) -> Self {
        self.metadata.content.content_disposition = Some(value.into());
        self
    }

    /// Set Content-Encoding
    pub fn content_encoding(mut self, value: impl Into<String>) -> Self {
        self.metadata.content.content_encoding = Some(value.into());
        self
    }

    /// Set Content-Language
    pub fn content_language(mut self, value: impl Into<String>) -> Self {
        self.metadata.content.content_language = Some(value.into());
        self
    }

    /// Set Cache-Control
    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.metadata.content.cache_control = Some(value.into());
        self
    }

    /// Set Expires
    pub fn expires(mut self, when: DateTime<Utc>) -> Self {
        self.metadata.content.expires = Some(when);
        self
    }

    /// Add one user metadata entry
    pub fn user_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .user_metadata
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Finish; content length is taken from the payload
    pub fn build(self) -> Blob {
        let mut metadata = self.metadata;
        metadata.content.content_length = Some(self.payload.len() as u64);
        metadata.size = Some(self.payload.len() as u64);
        Blob {
            metadata,
            payload: self.payload,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSet<T> {
    /// Entries of this page, ordered by name
    pub items: Vec<T>,
    /// Marker to pass to get the next page; `None` on the last page
    pub next_marker: Option<String>,
}

impl<T> PageSet<T> {
    /// Build a page
    pub fn new(items: Vec<T>, next_marker: Option<String>) -> Self {
        PageSet { items, next_marker }
    }

    /// A final page with the given items
    pub fn complete(items: Vec<T>) -> Self {
        PageSet {
            items,
            next_marker: None,
        }
    }

    /// Whether this is the last page
    pub fn is_complete(&self) -> bool {
        self.next_marker.is_none()
    }

    /// Number of entries in this page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the entries
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for PageSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PageSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
