// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Marker-driven pagination over any [`BlobStore`]
//!
//! Providers cap the size of a listing page and hand back an opaque marker.
//! [`list_all`] follows those markers and yields every entry as one stream.

use crate::domain::{StorageMetadata, StorageType};
use crate::options::ListContainerOptions;
use crate::BlobStore;
use cloudmux_core::{CloudError, CloudResult};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use tracing::debug;

/// Stream every entry of a container listing across pages
///
/// Fails with `IllegalState` if the provider returns the same marker twice in
/// a row, which would otherwise loop forever.
pub fn list_all<'a, S>(
    store: &'a S,
    container: &'a str,
    options: ListContainerOptions,
) -> BoxStream<'a, CloudResult<StorageMetadata>>
where
    S: BlobStore + ?Sized,
{
    let stream = async_stream::stream! {
        let mut options = options;
        let mut pages: u32 = 0;
        loop {
            let page = match store.list(container, &options).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            pages += 1;
            let next_marker = page.next_marker;
            for item in page.items {
                yield Ok(item);
            }

            match next_marker {
                None => {
                    debug!(container, pages, "listing complete");
                    return;
                }
                Some(marker) if options.marker.as_deref() == Some(marker.as_str()) => {
                    yield Err(stuck_marker(container, &marker));
                    return;
                }
                Some(marker) => options.marker = Some(marker),
            }
        }
    };
    Box::pin(stream)
}

/// Stream every container of a store across pages
pub fn list_all_containers<S>(store: &S) -> BoxStream<'_, CloudResult<StorageMetadata>>
where
    S: BlobStore + ?Sized,
{
    let stream = async_stream::stream! {
        let mut options = ListContainerOptions::new();
        loop {
            let page = match store.list_containers(&options).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let next_marker = page.next_marker;
            for item in page.items {
                yield Ok(item);
            }

            match next_marker {
                None => return,
                Some(marker) if options.marker.as_deref() == Some(marker.as_str()) => {
                    yield Err(stuck_marker(store.provider_id(), &marker));
                    return;
                }
                Some(marker) => options.marker = Some(marker),
            }
        }
    };
    Box::pin(stream)
}

fn stuck_marker(scope: &str, marker: &str) -> CloudError {
    CloudError::illegal_state(format!(
        "listing of {} did not advance past marker {}",
        scope, marker
    ))
}

/// Collect a whole listing into memory
pub async fn collect_all<S>(
    store: &S,
    container: &str,
    options: ListContainerOptions,
) -> CloudResult<Vec<StorageMetadata>>
where
    S: BlobStore + ?Sized,
{
    list_all(store, container, options).try_collect().await
}

/// Count the blobs matched by a listing
pub async fn count_blobs<S>(
    store: &S,
    container: &str,
    options: &ListContainerOptions,
) -> CloudResult<u64>
where
    S: BlobStore + ?Sized,
{
    list_all(store, container, options.clone())
        .try_fold(0u64, |count, entry| async move {
            Ok(if entry.kind == StorageType::Blob {
                count + 1
            } else {
                count
            })
        })
        .await
}

/// Delete every blob matched by a listing
pub async fn clear_container<S>(
    store: &S,
    container: &str,
    options: &ListContainerOptions,
) -> CloudResult<()>
where
    S: BlobStore + ?Sized,
{
    let names: Vec<String> = list_all(store, container, options.clone())
        .try_filter_map(|entry| async move {
            Ok(match entry.kind {
                StorageType::Blob | StorageType::Folder => Some(entry.name),
                StorageType::Container | StorageType::RelativePath => None,
            })
        })
        .try_collect()
        .await?;

    debug!(container, blobs = names.len(), "clearing container");
    store.remove_blobs(container, &names).await
}
