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

//! Building blocks shared by every cloudmux provider adapter
//!
//! - [`error`]: the [`CloudError`] model and HTTP status mapping
//! - [`location`]: provider / region / zone scoping
//! - [`http`]: pooled REST client with transient-failure retries
//! - [`predicates`]: polling with backoff until a remote condition holds
//!
//! # Example
//!
//! ```no_run
//! use cloudmux_core::{CloudResult, Predicate, PollSettings, RetryablePredicate};
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! struct Ready;
//!
//! #[async_trait]
//! impl Predicate<u32> for Ready {
//!     async fn test(&self, polls: &mut u32) -> CloudResult<bool> {
//!         *polls += 1;
//!         Ok(*polls > 3)
//!     }
//! }
//!
//! # async fn example() -> CloudResult<()> {
//! let poller = RetryablePredicate::new(Ready, PollSettings::with_timeout(Duration::from_secs(5)));
//! let mut polls = 0;
//! poller.await_true(&mut polls, "ready").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod location;
pub mod predicates;

pub use error::{CloudError, CloudResult};
pub use http::{HttpSettings, RestClient};
pub use location::{Location, LocationScope};
pub use predicates::{PollSettings, Predicate, RetryablePredicate};
