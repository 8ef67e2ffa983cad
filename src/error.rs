//! Centralized error types for the mesh gateway

use thiserror::Error;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration is invalid or incomplete
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request to an upstream service failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Upstream service refused the connection or is unreachable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Upstream service did not respond within the proxy timeout
    #[error("Upstream timed out after {0}ms")]
    UpstreamTimeout(u64),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;
