//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::FrameError;
use crate::relay::TransportError;

/// Stratum tunnel error type
#[derive(Error, Debug)]
pub enum TunnelError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// TLS handshake error
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Line framing error on a stream connection
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// Message transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// WebSocket handshake or protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Pool address uses a scheme we cannot dial
    #[error("Unsupported mining pool protocol: {0}")]
    UnsupportedScheme(String),

    /// Pool address could not be understood
    #[error("Invalid mining pool address: {0}")]
    InvalidTarget(String),

    /// HTTP error while talking to the decoy backend
    #[error("HTTP error: {0}")]
    Http(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl TunnelError {
    /// Whether the relay server refused or dropped the upgrade handshake
    ///
    /// This covers a non-101 answer (wrong token, decoy response, wrong
    /// server) and a connection that went away mid-handshake. Such failures
    /// only cost the one miner connection.
    pub fn is_handshake_rejection(&self) -> bool {
        match self {
            TunnelError::WebSocket(WsError::Http(_)) => true,
            TunnelError::WebSocket(WsError::ConnectionClosed) => true,
            TunnelError::WebSocket(WsError::Protocol(ProtocolError::HandshakeIncomplete)) => true,
            TunnelError::WebSocket(WsError::Io(e)) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TunnelError {
    fn from(err: reqwest::Error) -> Self {
        TunnelError::Http(err.to_string())
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `TunnelError`.
pub type Result<T> = std::result::Result<T, TunnelError>;
