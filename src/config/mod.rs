//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Delay between a death and the server-driven respawn
pub const DEFAULT_RESPAWN_DELAY_MS: u64 = 3000;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origin for CORS ("*" for any)
    pub client_origin: String,
    /// How long a dead player waits before the server respawns them
    pub respawn_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every setting has a default; the relay needs no external services and
    /// must boot with an empty environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let respawn_delay_ms = match env::var("RESPAWN_DELAY_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber("RESPAWN_DELAY_MS"))?,
            Err(_) => DEFAULT_RESPAWN_DELAY_MS,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            respawn_delay: Duration::from_millis(respawn_delay_ms),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:8080".parse().expect("static address"),
            log_level: "info".to_string(),
            client_origin: "*".to_string(),
            respawn_delay: Duration::from_millis(DEFAULT_RESPAWN_DELAY_MS),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid numeric value for {0}")]
    InvalidNumber(&'static str),
}
