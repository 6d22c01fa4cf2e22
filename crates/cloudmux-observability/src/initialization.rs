// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber installation.

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use cloudmux_config::ObservabilityConfig;
use std::io;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Initialize tracing with the specified format and optional log level.
///
/// ```no_run
/// use cloudmux_observability::{init_tracing, LogFormat};
///
/// init_tracing(LogFormat::Compact, Some("cloudmux_blobstore=debug")).unwrap();
/// tracing::info!("ready");
/// ```
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let config = LogConfig::new()
        .with_format(format)
        .with_level(level.unwrap_or("info"));
    init_tracing_with_config(config)
}

/// Initialize tracing from the `[observability]` section of a configuration
pub fn init_from_settings(settings: &ObservabilityConfig) -> Result<(), LogError> {
    init_tracing_with_config(LogConfig::from_settings(settings)?)
}

/// Initialize tracing with a detailed configuration.
///
/// Fails when a global subscriber is already installed.
pub fn init_tracing_with_config(config: LogConfig) -> Result<(), LogError> {
    let env_filter = build_env_filter(&config)?;
    let registry = Registry::default().with(env_filter);
    let writer = get_writer(&config.output);

    let result = match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(config.include_targets)
                .with_thread_ids(config.include_thread_ids)
                .with_thread_names(true)
                .with_span_events(FmtSpan::ACTIVE)
                .with_ansi(config.use_color)
                .pretty();

            if config.use_timestamps {
                registry.with(layer.with_timer(fmt::time::SystemTime)).try_init()
            } else {
                registry.with(layer.without_time()).try_init()
            }
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(config.include_targets)
                .with_thread_ids(config.include_thread_ids)
                .with_thread_names(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(config.use_color)
                .compact();

            if config.use_timestamps {
                registry.with(layer.with_timer(fmt::time::SystemTime)).try_init()
            } else {
                registry.with(layer.without_time()).try_init()
            }
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .with_writer(writer)
                .json()
                .with_target(config.include_targets)
                .with_thread_ids(config.include_thread_ids)
                .with_thread_names(true)
                .with_span_events(FmtSpan::CLOSE);

            if config.use_timestamps {
                registry.with(layer.with_timer(fmt::time::SystemTime)).try_init()
            } else {
                registry.with(layer.without_time()).try_init()
            }
        }
    };

    result.map_err(|e| LogError::ConfigError(format!("failed to install subscriber: {}", e)))
}

/// Get the writer for the specified output
fn get_writer(output: &LogOutput) -> fn() -> Box<dyn io::Write + Send> {
    match output {
        LogOutput::Stderr => || Box::new(io::stderr()),
        LogOutput::Stdout => || Box::new(io::stdout()),
    }
}

/// Build an environment filter for the given configuration
fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let level_str = config.get_effective_level();

    EnvFilter::try_new(&level_str).map_err(|e| {
        LogError::InvalidLogLevel(format!("failed to parse log filter '{}': {}", level_str, e))
    })
}
