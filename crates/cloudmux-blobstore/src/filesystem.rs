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

//! Local filesystem blob store
//!
//! Implements [`BlobStore`](crate::BlobStore) on a directory tree with:
//! - One directory per container, blob names mapped onto nested paths
//! - Atomic writes using temp files and rename
//! - Blob metadata kept in JSON sidecar files
//! - Multipart parts staged on disk and concatenated on completion
//!
//! # Directory Structure
//!
//! ```text
//! base/
//!   photos/                  container
//!     2024/cat.jpg           blob "2024/cat.jpg"
//!   .containers/photos.json  container settings
//!   .metadata/photos/2024/cat.jpg.json
//!   .multipart/<upload id>/  staged parts
//!   .tmp/                    in-flight writes
//! ```
//!
//! Directories starting with `.` are never listed as containers.

use crate::domain::{
    Blob, BlobAccess, BlobMetadata, ContainerAccess, PageSet, StorageMetadata,
};
use crate::listing::apply_listing;
use crate::multipart::{
    composite_etag, put_multipart_blob, validate_parts, MultipartPart, MultipartUpload,
    DEFAULT_PART_CONCURRENCY,
};
use crate::options::{CreateContainerOptions, GetOptions, ListContainerOptions, PutOptions};
use crate::transient::content_etag;
use crate::{check_blob_name, check_container_name, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloudmux_core::{CloudError, CloudResult, Location};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Provider id of the filesystem store
pub const PROVIDER_ID: &str = "filesystem";

const CONTAINERS_DIR: &str = ".containers";
const METADATA_DIR: &str = ".metadata";
const MULTIPART_DIR: &str = ".multipart";
const TMP_DIR: &str = ".tmp";
const UPLOAD_MANIFEST: &str = "upload.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContainerSettings {
    access: ContainerAccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobSidecar {
    metadata: BlobMetadata,
    #[serde(default)]
    access: BlobAccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UploadManifest {
    container: String,
    metadata: BlobMetadata,
    #[serde(default)]
    access: BlobAccess,
}

/// Blob store on a local directory
///
/// # Thread Safety
///
/// This implementation is `Send + Sync`. Concurrent writers of the same blob
/// race on the final rename; the last one wins.
#[derive(Clone)]
pub struct FilesystemBlobStore {
    base: PathBuf,
    location: Location,
}

impl FilesystemBlobStore {
    /// Open a store rooted at `base`, creating the directory if needed
    ///
    /// Fails if `base` exists and is not a directory.
    pub async fn new<P: AsRef<Path>>(base: P) -> CloudResult<Self> {
        let base = base.as_ref().to_path_buf();

        match fs::metadata(&base).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(CloudError::illegal_argument(format!(
                    "path exists but is not a directory: {}",
                    base.display()
                )))
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => fs::create_dir_all(&base).await?,
            Err(e) => return Err(e.into()),
        }

        Ok(FilesystemBlobStore {
            base,
            location: Location::region("local", Location::provider(PROVIDER_ID)),
        })
    }

    /// Root directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn container_dir(&self, container: &str) -> PathBuf {
        self.base.join(container)
    }

    fn container_settings_path(&self, container: &str) -> PathBuf {
        self.base
            .join(CONTAINERS_DIR)
            .join(format!("{}.json", container))
    }

    fn blob_path(&self, container: &str, name: &str) -> PathBuf {
        self.container_dir(container).join(name)
    }

    fn sidecar_path(&self, container: &str, name: &str) -> PathBuf {
        self.base
            .join(METADATA_DIR)
            .join(container)
            .join(format!("{}.json", name))
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.base.join(MULTIPART_DIR).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.upload_dir(upload_id).join(format!("{:08}", part_number))
    }

    async fn require_container(&self, container: &str) -> CloudResult<()> {
        if self.container_exists(container).await? {
            Ok(())
        } else {
            Err(CloudError::container_not_found(container))
        }
    }

    /// Write a file atomically: temp file in `.tmp`, then rename
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> CloudResult<()> {
        ensure_parent_dir(path).await?;
        let tmp_dir = self.base.join(TMP_DIR);
        fs::create_dir_all(&tmp_dir).await?;
        let temp_path = tmp_dir.join(uuid::Uuid::new_v4().to_string());

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_sidecar(&self, container: &str, name: &str) -> CloudResult<Option<BlobSidecar>> {
        match fs::read(self.sidecar_path(container, name)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CloudError::parse(format!("metadata of {}/{}: {}", container, name, e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_sidecar(&self, container: &str, sidecar: &BlobSidecar) -> CloudResult<()> {
        let json = serde_json::to_vec_pretty(sidecar)
            .map_err(|e| CloudError::parse(e.to_string()))?;
        self.write_atomic(&self.sidecar_path(container, &sidecar.metadata.name), &json)
            .await
    }

    async fn read_settings(&self, container: &str) -> CloudResult<ContainerSettings> {
        match fs::read(self.container_settings_path(container)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CloudError::parse(format!("settings of {}: {}", container, e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ContainerSettings::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_settings(&self, container: &str, settings: &ContainerSettings) -> CloudResult<()> {
        let json =
            serde_json::to_vec_pretty(settings).map_err(|e| CloudError::parse(e.to_string()))?;
        self.write_atomic(&self.container_settings_path(container), &json)
            .await
    }

    /// Store a payload and its sidecar; returns the etag
    async fn commit_blob(
        &self,
        container: &str,
        mut metadata: BlobMetadata,
        payload: &[u8],
        access: BlobAccess,
        etag: String,
    ) -> CloudResult<String> {
        self.write_atomic(&self.blob_path(container, &metadata.name), payload)
            .await?;

        metadata.container = container.to_string();
        metadata.etag = Some(etag.clone());
        metadata.last_modified = Some(Utc::now());
        metadata.size = Some(payload.len() as u64);
        metadata.content.content_length = Some(payload.len() as u64);
        metadata.location = Some(self.location.clone());
        metadata.public_uri = None;
        self.write_sidecar(container, &BlobSidecar { metadata, access })
            .await?;

        debug!(container, size = payload.len(), "stored blob");
        Ok(etag)
    }

    /// Metadata of a blob from its sidecar, or from the file alone
    async fn load_metadata(&self, container: &str, name: &str) -> CloudResult<Option<BlobMetadata>> {
        let path = self.blob_path(container, name);
        let file_meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut metadata = match self.read_sidecar(container, name).await? {
            Some(sidecar) => sidecar.metadata,
            None => BlobMetadata {
                container: container.to_string(),
                name: name.to_string(),
                location: Some(self.location.clone()),
                ..Default::default()
            },
        };
        metadata.size = Some(file_meta.len());
        metadata.content.content_length = Some(file_meta.len());
        if let Ok(modified) = file_meta.modified() {
            metadata.last_modified = Some(DateTime::<Utc>::from(modified));
        }
        Ok(Some(metadata))
    }

    /// Walk a container and collect every blob name with its size and mtime
    ///
    /// Uses a work queue to avoid recursive async functions.
    async fn walk_container(&self, container: &str) -> CloudResult<Vec<StorageMetadata>> {
        let root = self.container_dir(container);
        let mut results = Vec::new();
        let mut work_queue = vec![root.clone()];

        while let Some(current) = work_queue.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    work_queue.push(path);
                    continue;
                }

                let Some(name) = relative_name(&root, &path) else {
                    continue;
                };
                let meta = entry.metadata().await?;
                let mut item = StorageMetadata::blob(name.clone(), meta.len())
                    .with_location(self.location.clone());
                if let Ok(modified) = meta.modified() {
                    item = item.with_last_modified(DateTime::<Utc>::from(modified));
                }
                if let Some(sidecar) = self.read_sidecar(container, &name).await? {
                    item.etag = sidecar.metadata.etag;
                    item.user_metadata = sidecar.metadata.user_metadata;
                }
                results.push(item);
            }
        }

        Ok(results)
    }

    /// Remove now-empty directories between `path` and `stop`
    async fn prune_empty_dirs(path: &Path, stop: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == stop || !dir.starts_with(stop) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

impl fmt::Debug for FilesystemBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesystemBlobStore")
            .field("base", &self.base)
            .finish()
    }
}

async fn ensure_parent_dir(path: &Path) -> CloudResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Blob name of `path` below `root`, components joined with `/`
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn check_fs_container(container: &str) -> CloudResult<()> {
    check_container_name(container)?;
    if container.starts_with('.') || container.contains(['/', '\\']) {
        return Err(CloudError::illegal_argument(format!(
            "invalid container name for filesystem store: {}",
            container
        )));
    }
    Ok(())
}

fn check_fs_blob(container: &str, name: &str) -> CloudResult<()> {
    check_blob_name(container, name)?;
    check_fs_container(container)?;
    let escapes = Path::new(name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes || name.ends_with('/') {
        return Err(CloudError::illegal_argument(format!(
            "invalid blob name for filesystem store: {}",
            name
        )));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
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
        let mut containers = Vec::new();
        let mut entries = fs::read_dir(&self.base).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let mut item = StorageMetadata::container(name).with_location(self.location.clone());
            if let Ok(created) = entry.metadata().await.and_then(|m| m.created()) {
                item = item.with_creation_date(DateTime::<Utc>::from(created));
            }
            containers.push(item);
        }
        Ok(apply_listing(containers, &options.clone().recursive()))
    }

    async fn container_exists(&self, container: &str) -> CloudResult<bool> {
        check_fs_container(container)?;
        match fs::metadata(self.container_dir(container)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_container_in_location(
        &self,
        location: Option<&Location>,
        container: &str,
        options: &CreateContainerOptions,
    ) -> CloudResult<bool> {
        check_fs_container(container)?;
        crate::region::ensure_location_in_region(&self.location.id, location)?;
        if self.container_exists(container).await? {
            return Ok(false);
        }

        fs::create_dir_all(self.container_dir(container)).await?;
        let access = if options.public_read {
            ContainerAccess::PublicRead
        } else {
            ContainerAccess::Private
        };
        self.write_settings(container, &ContainerSettings { access })
            .await?;
        debug!(container, "created container directory");
        Ok(true)
    }

    async fn container_access(&self, container: &str) -> CloudResult<ContainerAccess> {
        self.require_container(container).await?;
        Ok(self.read_settings(container).await?.access)
    }

    async fn set_container_access(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> CloudResult<()> {
        self.require_container(container).await?;
        self.write_settings(container, &ContainerSettings { access })
            .await
    }

    async fn list(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> CloudResult<PageSet<StorageMetadata>> {
        self.require_container(container).await?;
        let blobs = self.walk_container(container).await?;
        Ok(apply_listing(blobs, options))
    }

    async fn delete_container_if_empty(&self, container: &str) -> CloudResult<bool> {
        if !self.container_exists(container).await? {
            return Ok(true);
        }
        if !self.walk_container(container).await?.is_empty() {
            return Ok(false);
        }

        fs::remove_dir_all(self.container_dir(container)).await?;
        for path in [
            self.base.join(METADATA_DIR).join(container),
            self.container_settings_path(container),
        ] {
            let result = if path.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(container, "deleted container directory");
        Ok(true)
    }

    async fn put_blob(
        &self,
        container: &str,
        blob: Blob,
        options: &PutOptions,
    ) -> CloudResult<String> {
        check_fs_blob(container, blob.name())?;
        self.require_container(container).await?;
        if options.multipart {
            return put_multipart_blob(self, container, blob, options, DEFAULT_PART_CONCURRENCY)
                .await;
        }

        let etag = content_etag(&blob.payload);
        self.commit_blob(container, blob.metadata, &blob.payload, options.blob_access, etag)
            .await
    }

    async fn blob_metadata(
        &self,
        container: &str,
        name: &str,
    ) -> CloudResult<Option<BlobMetadata>> {
        check_fs_blob(container, name)?;
        self.require_container(container).await?;
        self.load_metadata(container, name).await
    }

    async fn get_blob(
        &self,
        container: &str,
        name: &str,
        options: &GetOptions,
    ) -> CloudResult<Option<Blob>> {
        check_fs_blob(container, name)?;
        self.require_container(container).await?;
        let Some(mut metadata) = self.load_metadata(container, name).await? else {
            return Ok(None);
        };
        if let Some(etag) = &metadata.etag {
            options.check_preconditions(etag)?;
        }

        let data = match fs::read(self.blob_path(container, name)).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let payload = match &options.range {
            Some(range) => data.slice(range.resolve(data.len() as u64)?),
            None => data,
        };
        metadata.content.content_length = Some(payload.len() as u64);
        Ok(Some(Blob { metadata, payload }))
    }

    async fn remove_blob(&self, container: &str, name: &str) -> CloudResult<()> {
        check_fs_blob(container, name)?;
        self.require_container(container).await?;

        let path = self.blob_path(container, name);
        match fs::remove_file(&path).await {
            Ok(()) => Self::prune_empty_dirs(&path, &self.container_dir(container)).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let sidecar = self.sidecar_path(container, name);
        match fs::remove_file(&sidecar).await {
            Ok(()) => {
                let stop = self.base.join(METADATA_DIR).join(container);
                Self::prune_empty_dirs(&sidecar, &stop).await;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn blob_access(&self, container: &str, name: &str) -> CloudResult<BlobAccess> {
        check_fs_blob(container, name)?;
        if self.load_metadata(container, name).await?.is_none() {
            return Err(CloudError::key_not_found(container, name));
        }
        Ok(self
            .read_sidecar(container, name)
            .await?
            .map(|s| s.access)
            .unwrap_or_default())
    }

    async fn set_blob_access(
        &self,
        container: &str,
        name: &str,
        access: BlobAccess,
    ) -> CloudResult<()> {
        check_fs_blob(container, name)?;
        let metadata = self
            .load_metadata(container, name)
            .await?
            .ok_or_else(|| CloudError::key_not_found(container, name))?;
        self.write_sidecar(container, &BlobSidecar { metadata, access })
            .await
    }

    async fn initiate_multipart_upload(
        &self,
        container: &str,
        metadata: BlobMetadata,
        options: &PutOptions,
    ) -> CloudResult<MultipartUpload> {
        check_fs_blob(container, &metadata.name)?;
        self.require_container(container).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let manifest = UploadManifest {
            container: container.to_string(),
            metadata: metadata.clone(),
            access: options.blob_access,
        };
        let json =
            serde_json::to_vec_pretty(&manifest).map_err(|e| CloudError::parse(e.to_string()))?;
        fs::create_dir_all(self.upload_dir(&id)).await?;
        self.write_atomic(&self.upload_dir(&id).join(UPLOAD_MANIFEST), &json)
            .await?;

        let blob_name = metadata.name.clone();
        Ok(MultipartUpload::new(container, blob_name, id, metadata, *options))
    }

    async fn upload_multipart_part(
        &self,
        upload: &MultipartUpload,
        part_number: u32,
        payload: Bytes,
    ) -> CloudResult<MultipartPart> {
        if part_number == 0 || part_number > self.maximum_number_of_parts() {
            return Err(CloudError::illegal_argument(format!(
                "part number {} outside 1..={}",
                part_number,
                self.maximum_number_of_parts()
            )));
        }
        if !fs::try_exists(self.upload_dir(&upload.id)).await? {
            return Err(CloudError::not_found(format!("multipart upload {}", upload.id)));
        }

        self.write_atomic(&self.part_path(&upload.id, part_number), &payload)
            .await?;
        let mut part = MultipartPart::new(part_number, payload.len() as u64, content_etag(&payload));
        part.last_modified = Some(Utc::now());
        Ok(part)
    }

    async fn complete_multipart_upload(
        &self,
        upload: &MultipartUpload,
        parts: &[MultipartPart],
    ) -> CloudResult<String> {
        validate_parts(parts)?;
        let dir = self.upload_dir(&upload.id);
        let manifest: UploadManifest = match fs::read(dir.join(UPLOAD_MANIFEST)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CloudError::parse(format!("upload {}: {}", upload.id, e)))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CloudError::not_found(format!("multipart upload {}", upload.id)))
            }
            Err(e) => return Err(e.into()),
        };

        let mut assembled = Vec::new();
        for part in parts {
            let data = match fs::read(self.part_path(&upload.id, part.part_number)).await {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(CloudError::illegal_argument(format!(
                        "part {} was never uploaded",
                        part.part_number
                    )))
                }
                Err(e) => return Err(e.into()),
            };
            if content_etag(&data) != part.etag {
                return Err(CloudError::illegal_argument(format!(
                    "etag mismatch for part {}",
                    part.part_number
                )));
            }
            assembled.extend_from_slice(&data);
        }

        let etag = self
            .commit_blob(
                &manifest.container,
                manifest.metadata,
                &assembled,
                manifest.access,
                composite_etag(parts),
            )
            .await?;
        fs::remove_dir_all(&dir).await?;
        Ok(etag)
    }

    async fn abort_multipart_upload(&self, upload: &MultipartUpload) -> CloudResult<()> {
        match fs::remove_dir_all(self.upload_dir(&upload.id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_multipart_upload(
        &self,
        upload: &MultipartUpload,
    ) -> CloudResult<Vec<MultipartPart>> {
        let dir = self.upload_dir(&upload.id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CloudError::not_found(format!("multipart upload {}", upload.id)))
            }
            Err(e) => return Err(e.into()),
        };

        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Ok(part_number) = file_name.parse::<u32>() else {
                continue;
            };
            let data = fs::read(entry.path()).await?;
            let mut part = MultipartPart::new(part_number, data.len() as u64, content_etag(&data));
            if let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) {
                part.last_modified = Some(DateTime::<Utc>::from(modified));
            }
            parts.push(part);
        }
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn list_multipart_uploads(&self, container: &str) -> CloudResult<Vec<MultipartUpload>> {
        self.require_container(container).await?;
        let mut entries = match fs::read_dir(self.base.join(MULTIPART_DIR)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut uploads = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let id = entry.file_name().to_string_lossy().into_owned();
            let Ok(bytes) = fs::read(entry.path().join(UPLOAD_MANIFEST)).await else {
                continue;
            };
            let Ok(manifest) = serde_json::from_slice::<UploadManifest>(&bytes) else {
                continue;
            };
            if manifest.container != container {
                continue;
            }
            let options = PutOptions {
                multipart: true,
                blob_access: manifest.access,
            };
            let blob_name = manifest.metadata.name.clone();
            uploads.push(MultipartUpload::new(
                container,
                blob_name,
                id,
                manifest.metadata,
                options,
            ));
        }
        uploads.sort_by(|a, b| a.blob_name.cmp(&b.blob_name).then(a.id.cmp(&b.id)));
        Ok(uploads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_name() {
        let root = Path::new("/base/photos");
        assert_eq!(
            relative_name(root, Path::new("/base/photos/2024/cat.jpg")),
            Some("2024/cat.jpg".to_string())
        );
        assert_eq!(relative_name(root, root), None);
    }

    #[test]
    fn test_name_validation() {
        assert!(check_fs_blob("c", "a/b/c.txt").is_ok());
        assert!(check_fs_blob("c", "../escape").is_err());
        assert!(check_fs_blob("c", "/abs").is_err());
        assert!(check_fs_blob("c", "dir/").is_err());
        assert!(check_fs_container(".metadata").is_err());
        assert!(check_fs_container("a/b").is_err());
    }

    #[tokio::test]
    async fn test_new_creates_base_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blobs");

        assert!(!path.exists());
        let store = FilesystemBlobStore::new(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.base(), path.as_path());
    }

    #[tokio::test]
    async fn test_new_fails_with_file_path() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("file.txt");
        std::fs::write(&file_path, b"content").unwrap();

        assert!(FilesystemBlobStore::new(&file_path).await.is_err());
    }

    #[tokio::test]
    async fn test_nested_blob_layout() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(temp_dir.path()).await.unwrap();
        store.create_container("photos").await.unwrap();
        store
            .put_blob(
                "photos",
                Blob::builder("2024/cat.jpg").payload("meow").build(),
                &PutOptions::default(),
            )
            .await
            .unwrap();

        assert!(temp_dir.path().join("photos/2024/cat.jpg").is_file());
        assert!(temp_dir
            .path()
            .join(".metadata/photos/2024/cat.jpg.json")
            .is_file());

        store.remove_blob("photos", "2024/cat.jpg").await.unwrap();
        assert!(!temp_dir.path().join("photos/2024").exists());
        assert!(temp_dir.path().join("photos").is_dir());
    }

    #[tokio::test]
    async fn test_hidden_directories_are_not_containers() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(temp_dir.path()).await.unwrap();
        store.create_container("visible").await.unwrap();

        let page = store.list_containers(&ListContainerOptions::new()).await.unwrap();
        let names: Vec<_> = page.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["visible"]);
    }
}
