//! @ai:module:intent Error taxonomy for configuration, provider and scoring failures
//! @ai:module:layer domain
//! @ai:module:public_api ConfigError, NotFound, ProviderError, ProviderErrorKind, ScoringError
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// @ai:intent Fatal errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing required field `{field}` in {registry}")]
    MissingField {
        registry: &'static str,
        field: &'static str,
    },

    #[error("Duplicate {registry} id: {id}")]
    DuplicateId { registry: &'static str, id: String },

    #[error("{referenced_by} references unknown provider `{provider}`")]
    UnknownProvider {
        referenced_by: String,
        provider: String,
    },

    #[error("Invalid regex `{pattern}` in case {case_id}: {message}")]
    InvalidRegex {
        case_id: String,
        pattern: String,
        message: String,
    },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// @ai:intent Lookup miss in a read-only registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{registry} `{id}` not found")]
pub struct NotFound {
    pub registry: &'static str,
    pub id: String,
}

/// @ai:intent Classification of provider failures, drives the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    AuthFailed,
    Timeout,
    Malformed,
    Unknown,
}

impl ProviderErrorKind {
    /// @ai:intent Whether a failure of this kind may be retried with backoff
    /// @ai:effects pure
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderErrorKind::RateLimited | ProviderErrorKind::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::AuthFailed => "auth_failed",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Malformed => "malformed",
            ProviderErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// @ai:intent Cell-local failure from a provider invocation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Server-provided hint for how long to wait before retrying
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// @ai:intent Create a provider error of the given kind
    /// @ai:effects pure
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message)
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::AuthFailed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Malformed, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unknown, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// @ai:intent Cell-local scoring failure, downgrades the verdict to Inconclusive
#[derive(Error, Debug, Clone)]
pub enum ScoringError {
    #[error("judge invocation failed: {0}")]
    Judge(#[from] ProviderError),

    #[error("unparseable judge response: {0}")]
    Unparseable(String),

    #[error("case {0} has no expected output")]
    MissingExpected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ProviderErrorKind::RateLimited.is_retryable());
        assert!(ProviderErrorKind::Timeout.is_retryable());
        assert!(!ProviderErrorKind::AuthFailed.is_retryable());
        assert!(!ProviderErrorKind::Malformed.is_retryable());
        assert!(!ProviderErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::auth_failed("bad key");
        assert_eq!(err.to_string(), "auth_failed: bad key");
    }
}
