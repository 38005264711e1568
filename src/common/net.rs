//! Network utility functions
//!
//! This module provides utility functions for network operations.

use log::debug;
use socket2::{SockRef, TcpKeepalive};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::error::{TunnelError, Result};

/// Idle time before the first keepalive probe
const KEEPALIVE_TIME: Duration = Duration::from_secs(60);

/// Interval between keepalive probes
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Parse a socket address
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    // Try using ToSocketAddrs trait
    match addr.to_socket_addrs() {
        Ok(mut addrs) => {
            if let Some(addr) = addrs.next() {
                Ok(addr)
            } else {
                Err(TunnelError::Config(format!("Failed to parse address: {}", addr)))
            }
        }
        Err(e) => Err(TunnelError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Enable TCP keepalive and disable Nagle on a connected socket
///
/// The relay path has no timeouts of its own, so dead peers are only
/// detected through keepalive probes.
pub fn tune_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;

    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)?;

    Ok(())
}

/// Open a TCP connection with a connect timeout
///
/// # Arguments
///
/// * `host` - Host name or IP address
/// * `port` - Port number
/// * `connect_timeout` - Upper bound for name resolution plus connect
pub async fn connect_tcp(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    // IPv6 literals come out of URLs in brackets
    let host = host.trim_start_matches('[').trim_end_matches(']');

    let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| TunnelError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("Connection to {}:{} timed out", host, port),
        )))??;

    tune_stream(&stream)?;
    debug!("Connected to {}:{}", host, port);

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_socket_addr() {
        // Test valid address
        let addr = parse_socket_addr("127.0.0.1:8080");
        assert!(addr.is_ok(), "Should be able to parse a valid address");

        if let Ok(socket_addr) = addr {
            assert_eq!(socket_addr.port(), 8080);
        }

        // Test invalid address
        let addr = parse_socket_addr("invalid-address");
        assert!(addr.is_err(), "Should fail to parse an invalid address");
    }

    #[tokio::test]
    async fn test_connect_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(5)).await;
        assert!(stream.is_ok(), "Should connect to a listening port");
        assert!(stream.unwrap().nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_connect_tcp_bracketed_ipv6() {
        let listener = match TcpListener::bind("[::1]:0").await {
            Ok(listener) => listener,
            // No IPv6 loopback in this environment
            Err(_) => return,
        };
        let port = listener.local_addr().unwrap().port();

        let stream = connect_tcp("[::1]", port, Duration::from_secs(5)).await;
        assert!(stream.is_ok());
    }

    #[tokio::test]
    async fn test_connect_tcp_refused() {
        // Grab a free port and close it again
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect_tcp("127.0.0.1", port, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(TunnelError::Io(_))));
    }
}
