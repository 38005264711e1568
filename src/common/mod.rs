//! Common module
//!
//! This module contains shared types, errors, and utility functions used throughout the application.

pub mod error;
pub mod log;
pub mod net;
pub mod stream;
pub mod buffer_pool;

// Re-export commonly used types and functions
pub use error::{TunnelError, Result};
pub use log::{init_logger, level_for};
pub use net::{parse_socket_addr, connect_tcp, tune_stream};
pub use stream::MaybeTlsStream;
pub use buffer_pool::{BufferPool, PooledBuffer};
