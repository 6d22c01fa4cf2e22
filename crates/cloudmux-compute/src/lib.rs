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

//! Asynchronous compute operations
//!
//! Compute control planes acknowledge a mutating call with an [`Operation`]
//! and finish it in the background. This crate models those operations,
//! fetches them through [`OperationApi`] and turns them back into synchronous
//! calls:
//!
//! - [`GlobalOperationDonePredicate`], [`RegionOperationDonePredicate`] and
//!   [`ZoneOperationDonePredicate`] check one scope each
//! - [`OperationDonePredicate`] picks the scope from the operation
//! - [`OperationWaiter`] polls with backoff and surfaces failures
//!
//! # Example
//!
//! ```no_run
//! use cloudmux_compute::{GoogleComputeApi, Operation, OperationWaiter};
//! use cloudmux_core::{CloudResult, RestClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> CloudResult<()> {
//! let api = GoogleComputeApi::new(RestClient::with_defaults()?, "my-project", "ya29.token")?;
//! let waiter = OperationWaiter::new(Arc::new(api));
//! let started = Operation::new("operation-123").in_zone("us-central1-a");
//! let finished = waiter.wait(started).await?;
//! println!("{:?}", finished.target_link);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod operation;
pub mod predicates;
pub mod waiter;

pub use api::{GoogleComputeApi, OperationApi, DEFAULT_COMPUTE_ENDPOINT};
pub use operation::{
    Operation, OperationError, OperationErrorEntry, OperationScope, OperationStatus,
    OperationWarning, WarningData,
};
pub use predicates::{
    GlobalOperationDonePredicate, OperationDonePredicate, RegionOperationDonePredicate,
    ZoneOperationDonePredicate,
};
pub use waiter::OperationWaiter;
