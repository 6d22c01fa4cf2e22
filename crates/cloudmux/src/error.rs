// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use cloudmux_config::ConfigError;
use cloudmux_core::CloudError;
use cloudmux_observability::LogError;
use thiserror::Error;

/// Errors raised while turning a configuration into provider contexts
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration is invalid or names no such provider
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Building a provider client failed
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// Logging could not be installed
    #[error(transparent)]
    Logging(#[from] LogError),

    /// The provider exists but offers a different service
    #[error("provider '{name}' is a {kind} provider and has no {wanted} service")]
    WrongService {
        /// Provider name in the configuration
        name: String,
        /// Provider kind (`s3`, `google-compute`, ...)
        kind: &'static str,
        /// Service that was asked for
        wanted: &'static str,
    },
}

/// Result alias for the façade
pub type Result<T> = std::result::Result<T, Error>;
