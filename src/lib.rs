//! Stratum Tunnel: TLS/WebSocket tunnel for mining pool connections
//!
//! Miners talk line-delimited JSON to a local client endpoint, which carries
//! every connection over its own authenticated WebSocket to a server
//! endpoint. The server dials the requested pool and relays frames in both
//! directions. Requests without the shared token are reverse-proxied to
//! decoy web backends, so the server looks like an ordinary HTTPS site.
//!
//! # Main Features
//!
//! - Plain TCP and TLS mining pools
//! - One WebSocket session per miner connection
//! - Shared-secret authentication with decoy fallback
//! - Pooled frame buffers shared by all sessions
//!
//! # Example
//!
//! ```no_run
//! use stratum_tunnel::config::{parse_pool, parse_url, ClientConfig};
//! use stratum_tunnel::{ClientEndpoint, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::new(
//!         parse_url("wss://relay.example.com")?,
//!         parse_pool("tls://pool.example.com:443")?,
//!         "shared-secret",
//!     );
//!     config.validate()?;
//!
//!     ClientEndpoint::new(config)?.run().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod protocol;
pub mod relay;
pub mod tls;
pub mod tunnel;

// Re-export commonly used structures and functions for convenience
pub use common::{BufferPool, Result, TunnelError};
pub use protocol::{FramedConnection, PoolTarget};
pub use relay::{relay, RelayReport};
pub use tunnel::{ClientEndpoint, ServerEndpoint};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
