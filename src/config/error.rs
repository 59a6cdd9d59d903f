//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("Invalid PORT environment variable: {0}")]
    InvalidPortVariable(String),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Host and port do not form a valid listen address")]
    InvalidHost,

    #[error("History capacity must be at least 1")]
    InvalidHistoryCapacity,

    #[error("Heartbeat interval must be non-zero")]
    InvalidHeartbeatInterval,

    #[error("Heartbeat timeout must be non-zero")]
    InvalidHeartbeatTimeout,

    #[error("Send timeout must be non-zero")]
    InvalidSendTimeout,

    #[error("Send retries must be at least 1")]
    InvalidSendRetries,
}
