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

//! One API over many clouds
//!
//! `cloudmux` turns a configuration file into ready-to-use provider
//! contexts. Each named provider becomes either a blob store context
//! (one [`BlobStore`] per region) or a compute context that looks up
//! long-running operations and waits for them.
//!
//! ```toml
//! [providers.scratch]
//! provider = "transient"
//!
//! [providers.archive]
//! provider = "swift"
//! identity_endpoint = "https://keystone.example.com:5000/v3"
//! username = "demo"
//! project = "media"
//!
//! [providers.gce]
//! provider = "google-compute"
//! project = "my-project"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cloudmux::{Blob, BlobStore, ContextBuilder, PutOptions};
//!
//! #[tokio::main]
//! async fn main() -> cloudmux::Result<()> {
//!     let builder = ContextBuilder::from_file("cloudmux.toml").await?;
//!     builder.init_logging()?;
//!
//!     let context = builder.blob_store_context("archive").await?;
//!     let store = context.blob_store("RegionOne")?;
//!     store.create_container("photos").await?;
//!     let blob = Blob::builder("cat.jpg").payload(vec![1, 2, 3]).build();
//!     store.put_blob("photos", blob, &PutOptions::default()).await?;
//!     Ok(())
//! }
//! ```
//!
//! The member crates stay available under their own names for callers that
//! want one layer only.

pub mod context;
pub mod error;

pub use context::{BlobStoreContext, ComputeContext, ContextBuilder, ProviderContext};
pub use error::{Error, Result};

pub use cloudmux_blobstore as blobstore;
pub use cloudmux_compute as compute;
pub use cloudmux_config as config;
pub use cloudmux_observability as observability;

pub use cloudmux_blobstore::{
    Blob, BlobMetadata, BlobStore, ContainerAccess, CreateContainerOptions, GetOptions,
    ListContainerOptions, PageSet, PutOptions, StorageMetadata,
};
pub use cloudmux_compute::{Operation, OperationScope, OperationStatus};
pub use cloudmux_config::{Config, ConfigLoader};
pub use cloudmux_core::{CloudError, CloudResult, Location};
