//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment
//! variables using the `config` and `dotenvy` crates. Configuration is
//! loaded with the `ROOMCAST` prefix and nested values use double
//! underscores as separators. A bare `PORT` variable, when present,
//! overrides the configured listen port.
//!
//! # Example
//!
//! ```no_run
//! use roomcast::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! let addr = config.server.socket_addr().expect("Invalid listen address");
//! println!("Server running on {addr}");
//! ```

mod error;
mod relay;
mod server;

pub use error::{ConfigError, ValidationError};
pub use relay::RelayConfig;
pub use server::ServerConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Listener configuration (host, port, log filter)
    #[serde(default)]
    pub server: ServerConfig,

    /// Relay hub configuration (history bound, liveness, send retry)
    #[serde(default)]
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with the `ROOMCAST` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Applies a bare `PORT` variable as a listen-port override
    ///
    /// # Environment Variable Format
    ///
    /// - `ROOMCAST__SERVER__PORT=3000` -> `server.port = 3000`
    /// - `ROOMCAST__RELAY__HISTORY_CAPACITY=100` -> `relay.history_capacity = 100`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into their
    /// expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let mut config: AppConfig = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ROOMCAST")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        // Deployment platforms conventionally inject a bare PORT variable.
        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidPortVariable(port))?;
        }

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.relay.validate()?;
        Ok(())
    }
}
