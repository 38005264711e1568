//! TLS handling module
//!
//! This module terminates TLS on the tunnel listener and dials TLS to relay
//! servers and mining pools.

mod acceptor;
mod connector;

pub use acceptor::{accept_tls, create_tls_acceptor};
pub use connector::{connect_tls, pool_connector, relay_connector};
