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

//! Configuration for cloudmux
//!
//! # Features
//!
//! - Multi-format configuration support (TOML, YAML, JSON)
//! - Named provider instances tagged by `provider`
//! - Environment variable overrides with `CLOUDMUX_` prefix
//! - Field-level validation errors
//! - Multi-file merge, later files winning
//!
//! # Example
//!
//! ```no_run
//! use cloudmux_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = ConfigLoader::new();
//!     let config = loader.load_with_overrides("cloudmux.toml").await?;
//!
//!     for name in config.provider_names() {
//!         println!("{} -> {}", name, config.provider(name)?.kind());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, ConfigFormat, ConfigLoader, ENV_PREFIX};
pub use schema::*;
pub use validation::Validator;
