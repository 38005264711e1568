//! Configuration types
//!
//! Parsed settings of the two endpoints. Values come from the command line
//! (or the matching `STRATUM_TUNNEL_*` environment variables) and are
//! checked by `validate()` before anything binds.

use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::common::parse_socket_addr;
use crate::config::defaults;
use crate::config::error::{ConfigError, Result};
use crate::protocol::PoolTarget;

/// Server endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Shared secret expected from clients
    pub token: String,

    /// Listen address for the TLS listener
    pub listen: SocketAddr,

    /// Decoy backends for unauthenticated requests
    pub redirect: Vec<Url>,

    /// Certificate chain in PEM format
    pub ssl_certificate: PathBuf,

    /// Private key in PEM format
    pub ssl_certificate_key: PathBuf,

    /// Log frame payloads
    pub debug: bool,

    /// Pool connect timeout in seconds
    pub connect_timeout: u64,
}

impl ServerConfig {
    /// Create a configuration with default listen address and timeout
    pub fn new(token: impl Into<String>, ssl_certificate: impl Into<PathBuf>, ssl_certificate_key: impl Into<PathBuf>) -> Self {
        Self {
            token: token.into(),
            listen: defaults::server_listen(),
            redirect: Vec::new(),
            ssl_certificate: ssl_certificate.into(),
            ssl_certificate_key: ssl_certificate_key.into(),
            debug: false,
            connect_timeout: defaults::connect_timeout(),
        }
    }

    /// Pool connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Log the configuration, without the token
    pub fn log(&self) {
        info!("=== Server Configuration ===");
        info!("  Listen address: {}", self.listen);
        info!("  Certificate: {}", self.ssl_certificate.display());
        info!("  Private key: {}", self.ssl_certificate_key.display());
        if self.redirect.is_empty() {
            info!("  Decoy backends: none");
        }
        for url in &self.redirect {
            info!("  Decoy backend: {}", url);
        }
        info!("  Connect timeout: {} seconds", self.connect_timeout);
        info!("============================");
    }
}

/// Client endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Relay server URL (`ws://` or `wss://`)
    pub server: Url,

    /// Mining pool the server should dial
    pub pool: PoolTarget,

    /// Shared secret presented to the server
    pub token: String,

    /// Listen address for miners
    pub listen: SocketAddr,

    /// Log frame payloads
    pub debug: bool,

    /// Relay server connect timeout in seconds
    pub connect_timeout: u64,
}

impl ClientConfig {
    /// Create a configuration with default listen address and timeout
    pub fn new(server: Url, pool: PoolTarget, token: impl Into<String>) -> Self {
        Self {
            server,
            pool,
            token: token.into(),
            listen: defaults::client_listen(),
            debug: false,
            connect_timeout: defaults::connect_timeout(),
        }
    }

    /// Relay server connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Log the configuration, without the token
    pub fn log(&self) {
        info!("=== Client Configuration ===");
        info!("  Listen address: {}", self.listen);
        info!("  Relay server: {}", self.server);
        info!("  Mining pool: {}", self.pool);
        info!("  Connect timeout: {} seconds", self.connect_timeout);
        info!("============================");
    }
}

/// Parse a listen address
pub fn parse_listen(value: &str) -> Result<SocketAddr> {
    parse_socket_addr(value)
        .map_err(|e| ConfigError::InvalidValue("listen".to_string(), e.to_string()))
}

/// Parse a URL option
pub fn parse_url(value: &str) -> Result<Url> {
    Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidValue(value.to_string(), e.to_string()))
}

/// Parse a mining pool address
pub fn parse_pool(value: &str) -> Result<PoolTarget> {
    value
        .parse()
        .map_err(|e: crate::common::TunnelError| ConfigError::InvalidValue("pool".to_string(), e.to_string()))
}
