//! Common error types shared across the meeting bot crates.

use thiserror::Error;

/// Errors that can occur in shared infrastructure (registry, callbacks,
/// control bus) independent of any single meeting run.
#[derive(Error, Debug)]
pub enum CommonError {
    /// Redis operation failed (registry scan/allocate or control-bus pub/sub).
    #[error("redis error: {0}")]
    Redis(String),

    /// HTTP call failed (lifecycle callback, diagnostics upload).
    #[error("http error: {0}")]
    Http(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias using [`CommonError`].
pub type Result<T> = std::result::Result<T, CommonError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn display_formatting() {
        assert_eq!(
            format!("{}", CommonError::Redis("timeout".to_string())),
            "redis error: timeout"
        );
        assert_eq!(
            format!("{}", CommonError::Configuration("bad url".to_string())),
            "configuration error: bad url"
        );
    }
}
