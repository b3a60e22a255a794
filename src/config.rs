//! Server options.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Unknown keys are rejected: a typo is a startup error, not a
//! silently ignored option. The original camelCase option names
//! (`logsRootDirectory`, `requestBodyMaxSize`, `globalRateLimiter`) are
//! accepted as aliases.
//!
//! ```toml
//! port = 8080
//! debug = true
//! request_body_max_size = "1mb"
//!
//! [global_rate_limiter]
//! points = 20
//! duration = 1
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error};
use crate::middleware::rate_limit::RateLimitPolicy;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    pub port: u16,

    /// Adds permissive CORS headers and answers preflight requests.
    pub cors: bool,

    /// Console logging at debug level instead of info.
    pub debug: bool,

    /// Log files go to `<logs_root_directory>/logs/`.
    #[serde(alias = "logsRootDirectory")]
    pub logs_root_directory: PathBuf,

    /// Largest accepted request body, e.g. `"100kb"`, `"2mb"`.
    #[serde(alias = "requestBodyMaxSize")]
    pub request_body_max_size: String,

    /// Policy every endpoint starts with.
    #[serde(alias = "globalRateLimiter")]
    pub global_rate_limiter: RateLimitPolicy,

    /// Deadline for a single handler. Unset means no deadline.
    #[serde(alias = "handlerTimeoutMs")]
    pub handler_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            cors: true,
            debug: false,
            logs_root_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            request_body_max_size: "100kb".to_owned(),
            global_rate_limiter: RateLimitPolicy::default(),
            handler_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::InvalidOption {
            field: "config",
            reason: e.message().to_owned(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&text)?)
    }

    /// Checks every option that serde alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidOption { field: "host", reason: "must not be empty".into() });
        }
        self.body_limit()?;
        if !self.global_rate_limiter.is_valid() {
            return Err(ConfigError::InvalidOption {
                field: "global_rate_limiter",
                reason: "points and duration must be positive when enabled".into(),
            });
        }
        if self.handler_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidOption {
                field: "handler_timeout_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// `request_body_max_size` in bytes.
    pub fn body_limit(&self) -> Result<usize, ConfigError> {
        parse_byte_size(&self.request_body_max_size).ok_or_else(|| ConfigError::InvalidOption {
            field: "request_body_max_size",
            reason: format!("`{}` is not a size like \"100kb\"", self.request_body_max_size),
        })
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}

/// Parses `"512"`, `"100kb"`, `"1.5mb"`, `"1gb"` (1024-based, case-insensitive).
pub fn parse_byte_size(s: &str) -> Option<usize> {
    let s = s.trim().to_ascii_lowercase();
    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.parse().ok()?;
    let multiplier: f64 = match unit.trim() {
        "" | "b" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    let bytes = (number * multiplier).floor();
    (bytes.is_finite() && bytes >= 0.0 && bytes <= usize::MAX as f64).then_some(bytes as usize)
}
