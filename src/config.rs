//! Server configuration
//!
//! Settings can be built in code or loaded from a TOML document where every
//! key is optional:
//!
//! ```toml
//! address = "0.0.0.0"
//! port = 8080
//! read_timeout_secs = 10
//! backlog = 128
//! max_connections = 512
//! server_name = "sockserve"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Listener and protocol settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind
    pub address: String,
    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Bounded wait for each read, in seconds
    pub read_timeout_secs: u64,
    /// Pending connection queue length
    pub backlog: i32,
    /// Refuse connections beyond this many concurrent ones
    pub max_connections: Option<usize>,
    /// Value of the `Server` response header
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "127.0.0.1".to_string(),
            port: 8888,
            read_timeout_secs: 10,
            backlog: crate::net::DEFAULT_BACKLOG,
            max_connections: None,
            server_name: "sockserve".to_string(),
        }
    }
}

impl ServerConfig {
    /// Configuration for `address:port`, everything else default
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        ServerConfig {
            address: address.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the read timeout
    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    /// Limit concurrent connections
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.max_connections = Some(limit);
        self
    }

    /// Set the `Server` header value
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Read timeout as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check values that would make the server unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid("address must not be empty".to_string()));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid("read_timeout_secs must be positive".to_string()));
        }
        if self.backlog <= 0 {
            return Err(ConfigError::Invalid("backlog must be positive".to_string()));
        }
        if self.max_connections == Some(0) {
            return Err(ConfigError::Invalid("max_connections must be positive".to_string()));
        }
        Ok(())
    }
}
