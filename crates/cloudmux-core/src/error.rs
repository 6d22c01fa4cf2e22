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

//! Error types shared by every provider adapter
//!
//! Provider failures are mostly pass-through: the HTTP status returned by the
//! remote API is folded into one of a handful of variants so callers can react
//! to "not found" or "not authorized" without knowing which cloud they talk to.

use std::io;
use thiserror::Error;

/// Result type alias for cloud operations
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur while talking to a cloud provider
#[derive(Error, Debug)]
pub enum CloudError {
    /// Generic remote resource missing (operation, region, endpoint...)
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// Container (bucket) does not exist
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Blob does not exist inside an existing container
    #[error("key not found: {container}/{key}")]
    KeyNotFound {
        /// Container that was searched
        container: String,
        /// Missing blob name
        key: String,
    },

    /// Credentials rejected or insufficient permissions (HTTP 401/403)
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The provider has no equivalent for the requested operation
    #[error("operation '{operation}' is not supported by provider '{provider}'")]
    Unsupported {
        /// Provider identifier
        provider: String,
        /// Operation name
        operation: String,
    },

    /// Caller supplied an invalid argument
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Remote state does not allow the operation (conflict, failed operation...)
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Unmapped HTTP failure
    #[error("HTTP {status} during {context}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// What we were doing
        context: String,
        /// Response body or reason phrase
        message: String,
    },

    /// Polling or request deadline exceeded
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport-level failure from the HTTP client
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    Parse(String),

    /// Transparent error delegation for wrapped error types
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CloudError {
    /// Create a ResourceNotFound error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        CloudError::ResourceNotFound(what.into())
    }

    /// Create a ContainerNotFound error
    pub fn container_not_found<S: Into<String>>(container: S) -> Self {
        CloudError::ContainerNotFound(container.into())
    }

    /// Create a KeyNotFound error
    pub fn key_not_found(container: impl Into<String>, key: impl Into<String>) -> Self {
        CloudError::KeyNotFound {
            container: container.into(),
            key: key.into(),
        }
    }

    /// Create an Authorization error
    pub fn authorization<S: Into<String>>(msg: S) -> Self {
        CloudError::Authorization(msg.into())
    }

    /// Create an Unsupported error
    pub fn unsupported(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        CloudError::Unsupported {
            provider: provider.into(),
            operation: operation.into(),
        }
    }

    /// Create an IllegalArgument error
    pub fn illegal_argument<S: Into<String>>(msg: S) -> Self {
        CloudError::IllegalArgument(msg.into())
    }

    /// Create an IllegalState error
    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        CloudError::IllegalState(msg.into())
    }

    /// Create a Timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        CloudError::Timeout(msg.into())
    }

    /// Create a Parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        CloudError::Parse(msg.into())
    }

    /// Map an HTTP failure status onto the closest variant
    pub fn from_status(status: u16, context: impl Into<String>, message: impl Into<String>) -> Self {
        let context = context.into();
        let message = message.into();
        match status {
            401 | 403 => CloudError::Authorization(format!("{}: {}", context, message)),
            404 => CloudError::ResourceNotFound(context),
            409 | 412 => CloudError::IllegalState(format!("{}: {}", context, message)),
            400 | 416 => CloudError::IllegalArgument(format!("{}: {}", context, message)),
            _ => CloudError::Http {
                status,
                context,
                message,
            },
        }
    }

    /// Check if this error reports a missing resource of any kind
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CloudError::ResourceNotFound(_)
                | CloudError::ContainerNotFound(_)
                | CloudError::KeyNotFound { .. }
        )
    }

    /// Check if this is an Authorization error
    pub fn is_authorization(&self) -> bool {
        matches!(self, CloudError::Authorization(_))
    }

    /// Check if this is an Unsupported error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CloudError::Unsupported { .. })
    }

    /// Check if this is a Timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, CloudError::Timeout(_))
    }

    /// Whether retrying the same call may succeed
    ///
    /// Transport failures and server-side 5xx answers are transient; everything
    /// else is a definitive answer from the provider.
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudError::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            CloudError::Http { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(CloudError::from_status(401, "get", "").is_authorization());
        assert!(CloudError::from_status(403, "get", "").is_authorization());
        assert!(CloudError::from_status(404, "get blob", "").is_not_found());
        assert!(matches!(
            CloudError::from_status(409, "create", "exists"),
            CloudError::IllegalState(_)
        ));
        assert!(matches!(
            CloudError::from_status(416, "range", ""),
            CloudError::IllegalArgument(_)
        ));
        assert!(matches!(
            CloudError::from_status(503, "put", "busy"),
            CloudError::Http { status: 503, .. }
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(CloudError::from_status(503, "put", "").is_retryable());
        assert!(CloudError::from_status(500, "put", "").is_retryable());
        assert!(!CloudError::from_status(501, "put", "").is_retryable());
        assert!(!CloudError::not_found("x").is_retryable());
    }

    #[test]
    fn test_display() {
        let err = CloudError::key_not_found("photos", "cat.jpg");
        assert_eq!(err.to_string(), "key not found: photos/cat.jpg");
        assert!(err.is_not_found());

        let err = CloudError::unsupported("azureblob", "blob_access");
        assert!(err.is_unsupported());
        assert_eq!(
            err.to_string(),
            "operation 'blob_access' is not supported by provider 'azureblob'"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::other("read failed");
        let err = CloudError::from(io_err);
        assert!(matches!(err, CloudError::Io(_)));
    }
}
