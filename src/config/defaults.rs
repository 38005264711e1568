//! Default configuration values
//!
//! Single source of truth for defaults shared by the CLI and the library.

use std::net::SocketAddr;
use std::str::FromStr;

// String constants for default values

/// Default listen address of the server endpoint
pub const SERVER_LISTEN_STR: &str = "0.0.0.0:443";

/// Default listen address of the client endpoint
pub const CLIENT_LISTEN_STR: &str = "127.0.0.1:1234";

/// Default outbound connect timeout in seconds, as a string
pub const CONNECT_TIMEOUT_STR: &str = "30";

// Functions for default values

/// Default server listen address
pub fn server_listen() -> SocketAddr {
    SocketAddr::from_str(SERVER_LISTEN_STR)
        .expect("Default server listen address should be valid")
}

/// Default client listen address
pub fn client_listen() -> SocketAddr {
    SocketAddr::from_str(CLIENT_LISTEN_STR)
        .expect("Default client listen address should be valid")
}

/// Frame buffer size (2KB); also the longest line accepted minus one
pub fn buffer_size() -> usize {
    2048
}

/// Upper bound on idle buffers kept by the pool
pub fn max_idle_buffers() -> usize {
    1024
}

/// Default connect timeout in seconds
pub fn connect_timeout() -> u64 {
    30
}
