//! Error types.
//!
//! Error types by layer:
//!
//! - [`ApiError`] is what handlers return. The pipeline is the single place
//!   that turns it into an HTTP status.
//! - [`ConfigError`] covers invalid server options and endpoints that cannot
//!   be registered. These fail fast, before any traffic is served.
//! - [`Error`] surfaces startup failures: I/O (binding, log files) and
//!   configuration errors.

use serde_json::Value;
use thiserror::Error;

/// The error type returned by lumen's fallible startup operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

/// Invalid server options or an endpoint that cannot be registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("endpoint `{endpoint}` has no HTTP method")]
    MissingMethod { endpoint: String },

    #[error("endpoint `{endpoint}` has no path")]
    MissingPath { endpoint: String },

    #[error("endpoint `{endpoint}` has no handler")]
    MissingHandler { endpoint: String },

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("invalid rate limit for `{endpoint}`: points and duration must be positive")]
    InvalidRateLimit { endpoint: String },

    #[error("invalid option `{field}`: {reason}")]
    InvalidOption { field: &'static str, reason: String },
}

/// Errors a handler can fail with.
///
/// Each variant maps to exactly one status:
///
/// | Variant | Status | Envelope |
/// |---|---|---|
/// | `Validation` | 400 | `data` = the attached detail |
/// | `Forbidden` | 403 | `message` |
/// | `Conflict` | 409 | `data = { "reason": … }` |
/// | `Internal` | 500 | nothing; the error is logged |
///
/// `Internal` converts from [`anyhow::Error`], so `?` on any
/// `anyhow::Result` (or on `.context(..)`) lands there.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Value),

    #[error("{0}")]
    Forbidden(String),

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(detail: impl Into<Value>) -> Self {
        Self::Validation(detail.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict { reason: reason.into() }
    }

    /// Wraps any error as an unclassified failure.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(e)
    }
}
