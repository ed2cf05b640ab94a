//! Error types for the proxy core.

use thiserror::Error;

/// Errors that can occur while running the proxy.
///
/// Per-connection and per-peer failures are contained where they happen and
/// logged; only configuration and bind failures are allowed to reach the
/// process boundary.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Configuration loading or validation failure. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-level failure (bind, accept, read, write).
    #[error("Network error: {0}")]
    Network(String),

    /// Per-session failure (construction, closed event queue).
    #[error("Session error: {0}")]
    Session(String),

    /// Anything that indicates a bug rather than an environmental failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Network(err.to_string())
    }
}
