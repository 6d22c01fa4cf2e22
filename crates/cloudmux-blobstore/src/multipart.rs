// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Multipart uploads
//!
//! A payload is cut into numbered parts according to a [`PartPlan`], the parts
//! are uploaded concurrently and committed in order. [`put_multipart_blob`]
//! drives the sequence against any [`BlobStore`]; each adapter decides what a
//! part is (an S3 part, an Azure block, a Swift segment, a staged file).

use crate::domain::{Blob, BlobMetadata};
use crate::options::PutOptions;
use crate::BlobStore;
use chrono::{DateTime, Utc};
use cloudmux_core::{CloudError, CloudResult};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::Range;
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;

/// Part size tried first (32 MiB)
pub const DEFAULT_PART_SIZE: u64 = 32 * MIB;

/// Parts uploaded at the same time by [`put_multipart_blob`]
pub const DEFAULT_PART_CONCURRENCY: usize = 4;

/// An upload in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartUpload {
    /// Target container
    pub container: String,
    /// Target blob name
    pub blob_name: String,
    /// Provider upload id
    pub id: String,
    /// Metadata applied to the committed blob
    pub metadata: BlobMetadata,
    /// Upload options
    #[serde(skip)]
    pub options: PutOptions,
}

impl MultipartUpload {
    /// Describe an upload
    pub fn new(
        container: impl Into<String>,
        blob_name: impl Into<String>,
        id: impl Into<String>,
        metadata: BlobMetadata,
        options: PutOptions,
    ) -> Self {
        MultipartUpload {
            container: container.into(),
            blob_name: blob_name.into(),
            id: id.into(),
            metadata,
            options,
        }
    }
}

/// An uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartPart {
    /// 1-based position
    pub part_number: u32,
    /// Size in bytes
    pub size: u64,
    /// Provider etag of the part
    pub etag: String,
    /// Upload time, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl MultipartPart {
    /// Describe a part
    pub fn new(part_number: u32, size: u64, etag: impl Into<String>) -> Self {
        MultipartPart {
            part_number,
            size,
            etag: etag.into(),
            last_modified: None,
        }
    }
}

/// Check that parts are non-empty and numbered strictly increasing from 1
pub fn validate_parts(parts: &[MultipartPart]) -> CloudResult<()> {
    if parts.is_empty() {
        return Err(CloudError::illegal_argument(
            "multipart upload needs at least one part",
        ));
    }
    for pair in parts.windows(2) {
        if pair[1].part_number <= pair[0].part_number {
            return Err(CloudError::illegal_argument(format!(
                "parts out of order: {} after {}",
                pair[1].part_number, pair[0].part_number
            )));
        }
    }
    if parts[0].part_number == 0 {
        return Err(CloudError::illegal_argument("part numbers start at 1"));
    }
    Ok(())
}

/// Etag of a blob assembled from parts: digest of the part etags plus count
pub fn composite_etag(parts: &[MultipartPart]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.etag.as_bytes());
    }
    format!("{}-{}", hex::encode(hasher.finalize()), parts.len())
}

/// How a payload is cut into parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    /// Payload length
    pub length: u64,
    /// Size of every part but the last
    pub part_size: u64,
    /// Number of parts (at least 1)
    pub part_count: u32,
}

impl PartPlan {
    /// Choose a part size for `length` bytes
    ///
    /// Starts from `preferred` clamped to `[min, max]` and grows it, in whole
    /// MiB, until the payload fits in `max_parts` parts. Fails if even `max`
    /// sized parts are not enough.
    pub fn compute(
        length: u64,
        min: u64,
        max: u64,
        max_parts: u32,
        preferred: u64,
    ) -> CloudResult<Self> {
        if min == 0 || min > max || max_parts == 0 {
            return Err(CloudError::illegal_argument(format!(
                "invalid part limits: min {}, max {}, parts {}",
                min, max, max_parts
            )));
        }

        let mut part_size = preferred.clamp(min, max);
        if length == 0 {
            return Ok(PartPlan {
                length,
                part_size,
                part_count: 1,
            });
        }

        let needed = length.div_ceil(u64::from(max_parts));
        if needed > part_size {
            part_size = needed.div_ceil(MIB).saturating_mul(MIB).min(max).max(needed);
        }
        if part_size > max {
            return Err(CloudError::illegal_argument(format!(
                "payload of {} bytes exceeds {} parts of at most {} bytes",
                length, max_parts, max
            )));
        }

        let part_count = length.div_ceil(part_size);
        Ok(PartPlan {
            length,
            part_size,
            part_count: u32::try_from(part_count).map_err(|_| {
                CloudError::illegal_argument(format!("{} parts is too many", part_count))
            })?,
        })
    }

    /// Plan within the limits of a store
    pub fn for_store<S>(store: &S, length: u64) -> CloudResult<Self>
    where
        S: BlobStore + ?Sized,
    {
        Self::compute(
            length,
            store.minimum_multipart_part_size(),
            store.maximum_multipart_part_size(),
            store.maximum_number_of_parts(),
            DEFAULT_PART_SIZE,
        )
    }

    /// `(part_number, byte range)` for every part
    pub fn ranges(&self) -> impl Iterator<Item = (u32, Range<u64>)> + '_ {
        (0..self.part_count).map(move |i| {
            let start = u64::from(i) * self.part_size;
            let end = (start + self.part_size).min(self.length);
            (i + 1, start..end)
        })
    }
}

/// Upload a blob in parts through any store
///
/// On the first failed part the upload is aborted and the part's error is
/// returned; an error from the abort itself is only logged.
pub async fn put_multipart_blob<S>(
    store: &S,
    container: &str,
    blob: Blob,
    options: &PutOptions,
    concurrency: usize,
) -> CloudResult<String>
where
    S: BlobStore + ?Sized,
{
    let plan = PartPlan::for_store(store, blob.len())?;
    let Blob { metadata, payload } = blob;
    let upload = store
        .initiate_multipart_upload(container, metadata, options)
        .await?;

    info!(
        container,
        blob = %upload.blob_name,
        upload_id = %upload.id,
        parts = plan.part_count,
        part_size = plan.part_size,
        "starting multipart upload"
    );

    let upload_ref = &upload;
    let uploaded: CloudResult<Vec<MultipartPart>> = stream::iter(plan.ranges())
        .map(|(number, range)| {
            let chunk = payload.slice(range.start as usize..range.end as usize);
            async move {
                debug!(part = number, size = chunk.len(), "uploading part");
                store.upload_multipart_part(upload_ref, number, chunk).await
            }
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await;

    let mut parts = match uploaded {
        Ok(parts) => parts,
        Err(e) => {
            warn!(upload_id = %upload.id, "multipart upload failed, aborting: {}", e);
            if let Err(abort_err) = store.abort_multipart_upload(&upload).await {
                warn!(upload_id = %upload.id, "abort failed: {}", abort_err);
            }
            return Err(e);
        }
    };

    parts.sort_by_key(|p| p.part_number);
    match store.complete_multipart_upload(&upload, &parts).await {
        Ok(etag) => Ok(etag),
        Err(e) => {
            warn!(upload_id = %upload.id, "multipart commit failed, aborting: {}", e);
            if let Err(abort_err) = store.abort_multipart_upload(&upload).await {
                warn!(upload_id = %upload.id, "abort failed: {}", abort_err);
            }
            Err(e)
        }
    }
}
