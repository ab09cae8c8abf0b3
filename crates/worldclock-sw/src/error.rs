//! Errors raised by the worker.

use thiserror::Error;
use worldclock_common::WorldClockError;

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    /// A fetch attempt failed before producing a response.
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A fetch produced a response that cannot be cached (e.g. a 404 in the install manifest).
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Unrecognized message: {0}")]
    UnrecognizedMessage(String),
}

impl SwError {
    /// Whether a strategy may fall back to the cache after this error.
    pub fn is_network(&self) -> bool {
        matches!(self, SwError::NetworkUnavailable(_))
    }
}

impl From<url::ParseError> for SwError {
    fn from(e: url::ParseError) -> Self {
        SwError::InvalidUrl(e.to_string())
    }
}

impl From<serde_json::Error> for SwError {
    fn from(e: serde_json::Error) -> Self {
        SwError::Json(e.to_string())
    }
}

impl From<std::io::Error> for SwError {
    fn from(e: std::io::Error) -> Self {
        SwError::Io(e.to_string())
    }
}

impl From<SwError> for WorldClockError {
    fn from(e: SwError) -> Self {
        match e {
            SwError::NetworkUnavailable(_) | SwError::Http { .. } => {
                WorldClockError::network_with_source("service worker fetch failed", e)
            }
            SwError::Cache(_) => WorldClockError::cache_with_source("cache store failed", e),
            SwError::Config(_) | SwError::Json(_) | SwError::InvalidUrl(_) => {
                WorldClockError::config_with_source("invalid worker configuration", e)
            }
            SwError::UnrecognizedMessage(msg) => WorldClockError::InvalidArgument(msg),
            other => WorldClockError::internal(other.to_string()),
        }
    }
}

/// Result type alias for worker operations.
pub type SwResult<T> = Result<T, SwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(SwError::NetworkUnavailable("offline".into()).is_network());
        assert!(!SwError::Cache("full".into()).is_network());
    }

    #[test]
    fn test_into_common_error() {
        let err: WorldClockError = SwError::NetworkUnavailable("offline".into()).into();
        assert_eq!(err.category(), "network");

        let err: WorldClockError = SwError::Config("bad".into()).into();
        assert_eq!(err.category(), "config");

        let err: WorldClockError = SwError::InvalidState("nope".into()).into();
        assert_eq!(err.category(), "internal");
    }
}
