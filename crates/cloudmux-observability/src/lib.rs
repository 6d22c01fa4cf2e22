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

//! Structured logging for cloudmux
//!
//! Every cloudmux crate logs through `tracing`: one `debug` event per HTTP
//! request, `info` on lifecycle changes, `warn` on retries. This crate
//! installs the subscriber that renders them.
//!
//! - **Formats**: pretty, compact and JSON
//! - **Filtering**: `EnvFilter` directives, falling back to `RUST_LOG`
//! - **From configuration**: [`init_from_settings`] reads the
//!   `[observability]` section of a cloudmux configuration file
//!
//! # Example
//!
//! ```no_run
//! use cloudmux_observability::{init_tracing_with_config, LogConfig, LogFormat};
//!
//! let config = LogConfig::new()
//!     .with_format(LogFormat::Json)
//!     .with_level("info,cloudmux_blobstore=debug");
//! init_tracing_with_config(config).unwrap();
//! tracing::info!("Application started");
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput};
pub use initialization::{init_from_settings, init_tracing, init_tracing_with_config};

/// Tracing re-exports for convenience
pub use tracing::{debug, error, info, span, trace, warn, Level};
