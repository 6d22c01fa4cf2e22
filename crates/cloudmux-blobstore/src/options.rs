// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Options accepted by [`BlobStore`](crate::BlobStore) operations

use crate::domain::BlobAccess;
use cloudmux_core::{CloudError, CloudResult};
use std::fmt;
use std::ops::Range;

/// Delimiter used by non-recursive listings
pub const DEFAULT_DELIMITER: &str = "/";

/// Page size used when the caller does not set one
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Listing options
///
/// The default lists the top level of a container: entries below a `/` are
/// rolled up into a single [`RelativePath`](crate::StorageType::RelativePath).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListContainerOptions {
    /// Only return names starting with this prefix
    pub prefix: Option<String>,
    /// Roll-up delimiter used when `recursive` is false
    pub delimiter: String,
    /// Continuation marker returned by a previous page
    ///
    /// Treat it as opaque: in-process stores and Swift hand back the last
    /// name of the page, S3 and Azure their own continuation token.
    pub marker: Option<String>,
    /// Page size
    pub max_results: Option<usize>,
    /// List every blob regardless of delimiters
    pub recursive: bool,
}

impl Default for ListContainerOptions {
    fn default() -> Self {
        ListContainerOptions {
            prefix: None,
            delimiter: DEFAULT_DELIMITER.to_string(),
            marker: None,
            max_results: None,
            recursive: false,
        }
    }
}

impl ListContainerOptions {
    /// Top-level, first-page listing
    pub fn new() -> Self {
        Self::default()
    }

    /// List inside a pseudo-directory (`dir/`)
    pub fn in_directory(mut self, dir: &str) -> Self {
        let dir = dir.trim_end_matches(DEFAULT_DELIMITER);
        self.prefix = if dir.is_empty() {
            None
        } else {
            Some(format!("{}{}", dir, DEFAULT_DELIMITER))
        };
        self
    }

    /// Restrict names to a raw prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    /// Continue after a marker returned by a previous page
    pub fn after_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Limit the page size
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Descend into every pseudo-directory
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Use a custom roll-up delimiter
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Delimiter in effect (`None` for recursive listings)
    pub fn effective_delimiter(&self) -> Option<&str> {
        if self.recursive || self.delimiter.is_empty() {
            None
        } else {
            Some(self.delimiter.as_str())
        }
    }

    /// Page size in effect (at least 1)
    pub fn page_size(&self) -> usize {
        self.max_results.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    /// Prefix in effect, empty when unset
    pub fn prefix_str(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }
}

/// Container creation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateContainerOptions {
    /// Make the container anonymously readable
    pub public_read: bool,
}

impl CreateContainerOptions {
    /// Anonymous read access
    pub fn public_read() -> Self {
        CreateContainerOptions { public_read: true }
    }
}

/// Blob upload options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Upload in parts (native or emulated multipart)
    pub multipart: bool,
    /// Access applied to the new blob where the provider supports per-blob ACLs
    pub blob_access: BlobAccess,
}

impl PutOptions {
    /// Request a multipart upload
    pub fn multipart() -> Self {
        PutOptions {
            multipart: true,
            ..Default::default()
        }
    }

    /// Set the per-blob access
    pub fn with_blob_access(mut self, access: BlobAccess) -> Self {
        self.blob_access = access;
        self
    }
}

/// Inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte
    pub start: u64,
    /// Last byte, open-ended when `None`
    pub end: Option<u64>,
}

impl ByteRange {
    /// `start..=end`
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange {
            start,
            end: Some(end),
        }
    }

    /// `start..`
    pub fn starting_at(start: u64) -> Self {
        ByteRange { start, end: None }
    }

    /// Value of the HTTP `Range` header
    pub fn header_value(&self) -> String {
        self.to_string()
    }

    /// Resolve against a payload length
    pub fn resolve(&self, len: u64) -> CloudResult<Range<usize>> {
        if let Some(end) = self.end {
            if end < self.start {
                return Err(CloudError::illegal_argument(format!(
                    "invalid range {}",
                    self
                )));
            }
        }
        if self.start >= len {
            return Err(CloudError::illegal_argument(format!(
                "range {} not satisfiable for {} bytes",
                self, len
            )));
        }
        let end = self.end.map_or(len, |end| end.saturating_add(1).min(len));
        Ok(self.start as usize..end as usize)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "bytes={}-{}", self.start, end),
            None => write!(f, "bytes={}-", self.start),
        }
    }
}

/// Blob download options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Partial read
    pub range: Option<ByteRange>,
    /// Only return the blob if its etag matches
    pub if_match: Option<String>,
    /// Only return the blob if its etag differs
    pub if_none_match: Option<String>,
}

impl GetOptions {
    /// Read a byte range
    pub fn range(range: ByteRange) -> Self {
        GetOptions {
            range: Some(range),
            ..Default::default()
        }
    }

    /// Require a matching etag
    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    /// Require a different etag
    pub fn if_none_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    /// Check the preconditions against a stored etag
    ///
    /// Used by the in-process stores; remote providers evaluate the headers.
    pub fn check_preconditions(&self, etag: &str) -> CloudResult<()> {
        if let Some(expected) = &self.if_match {
            if expected != "*" && expected.trim_matches('"') != etag {
                return Err(CloudError::illegal_state(format!(
                    "precondition failed: etag {} does not match {}",
                    etag, expected
                )));
            }
        }
        if let Some(unexpected) = &self.if_none_match {
            if unexpected == "*" || unexpected.trim_matches('"') == etag {
                return Err(CloudError::illegal_state(format!(
                    "not modified: etag {}",
                    etag
                )));
            }
        }
        Ok(())
    }
}
