//! Configuration module
//!
//! This module holds the endpoint configurations, their defaults and their
//! validation.

pub mod defaults;
mod error;
mod types;
mod validator;

pub use self::error::ConfigError;
pub use self::types::{parse_listen, parse_pool, parse_url, ClientConfig, ServerConfig};

// Export constants needed externally
pub use defaults::{CLIENT_LISTEN_STR, CONNECT_TIMEOUT_STR, SERVER_LISTEN_STR};
