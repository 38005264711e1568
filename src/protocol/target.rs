//! Mining pool address handling
//!
//! A pool is addressed as `<scheme>://<host>:<port>`. The scheme decides
//! whether the pool socket is plain TCP (`tcp`) or TLS (`tls` / `ssl`).

use log::debug;
use openssl::ssl::SslConnector;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::common::{connect_tcp, MaybeTlsStream, Result, TunnelError};
use crate::tls::connect_tls;

/// Header carrying the pool address from the client to the server
pub const POOL_HEADER: &str = "x-pool";

/// How the pool socket is dialed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolScheme {
    /// Plain TCP
    Tcp,
    /// TLS over TCP, peer certificate not verified
    Tls,
}

impl PoolScheme {
    /// Scheme as written in pool addresses
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolScheme::Tcp => "tcp",
            PoolScheme::Tls => "tls",
        }
    }
}

impl fmt::Display for PoolScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolScheme {
    type Err = TunnelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "tls" | "ssl" => Ok(Self::Tls),
            _ => Err(TunnelError::UnsupportedScheme(s.to_string())),
        }
    }
}

/// Pool target descriptor: scheme plus host and port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolTarget {
    scheme: PoolScheme,
    host: String,
    port: u16,
}

impl PoolTarget {
    /// Create a target from its parts
    pub fn new(scheme: PoolScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Dial scheme
    pub fn scheme(&self) -> PoolScheme {
        self.scheme
    }

    /// Host name or IP address (IPv6 in brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form of the address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect to the pool
    ///
    /// # Parameters
    ///
    /// * `connector` - TLS connector used for `tls` targets
    /// * `connect_timeout` - Bound on the TCP connect
    pub async fn dial(&self, connector: &SslConnector, connect_timeout: Duration) -> Result<MaybeTlsStream> {
        let tcp = connect_tcp(&self.host, self.port, connect_timeout).await?;

        let stream = match self.scheme {
            PoolScheme::Tcp => MaybeTlsStream::Plain(tcp),
            PoolScheme::Tls => {
                let domain = self.host.trim_start_matches('[').trim_end_matches(']');
                MaybeTlsStream::Tls(connect_tls(connector, domain, tcp).await?)
            }
        };

        debug!("Dialed mining pool {}", self);
        Ok(stream)
    }
}

impl fmt::Display for PoolTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for PoolTarget {
    type Err = TunnelError;

    /// Parse `<scheme>://<host>:<port>`
    ///
    /// The scheme is checked first, so an unsupported scheme is reported as
    /// such even when the rest of the address is malformed.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, _) = s
            .split_once("://")
            .ok_or_else(|| TunnelError::InvalidTarget(format!("missing scheme in '{}'", s)))?;
        let scheme = scheme.parse::<PoolScheme>()?;

        let url = Url::parse(s)
            .map_err(|e| TunnelError::InvalidTarget(format!("'{}': {}", s, e)))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TunnelError::InvalidTarget(format!("missing host in '{}'", s)))?;
        let port = url
            .port()
            .ok_or_else(|| TunnelError::InvalidTarget(format!("missing port in '{}'", s)))?;

        Ok(Self::new(scheme, host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let target: PoolTarget = "tcp://127.0.0.1:3333".parse().unwrap();
        assert_eq!(target.scheme(), PoolScheme::Tcp);
        assert_eq!(target.host(), "127.0.0.1");
        assert_eq!(target.port(), 3333);
        assert_eq!(target.address(), "127.0.0.1:3333");
        assert_eq!(target.to_string(), "tcp://127.0.0.1:3333");
    }

    #[test]
    fn test_parse_tls_and_ssl() {
        let tls: PoolTarget = "tls://pool.example.com:443".parse().unwrap();
        let ssl: PoolTarget = "ssl://pool.example.com:443".parse().unwrap();
        assert_eq!(tls.scheme(), PoolScheme::Tls);
        assert_eq!(ssl.scheme(), PoolScheme::Tls);
        assert_eq!(ssl.host(), "pool.example.com");
        assert_eq!(tls, ssl);
    }

    #[test]
    fn test_parse_ipv6() {
        let target: PoolTarget = "tcp://[::1]:4444".parse().unwrap();
        assert_eq!(target.host(), "[::1]");
        assert_eq!(target.address(), "[::1]:4444");
    }

    #[test]
    fn test_unsupported_scheme() {
        for addr in ["udp://127.0.0.1:3333", "stratum+tcp://pool:3333", "http://pool:80", "://x:1"] {
            let err = addr.parse::<PoolTarget>().unwrap_err();
            assert!(matches!(err, TunnelError::UnsupportedScheme(_)), "{}: {}", addr, err);
        }
    }

    #[test]
    fn test_invalid_targets() {
        for addr in ["", "127.0.0.1:3333", "tcp://127.0.0.1", "tcp://:3333"] {
            let err = addr.parse::<PoolTarget>().unwrap_err();
            assert!(matches!(err, TunnelError::InvalidTarget(_)), "{}: {}", addr, err);
        }
    }
}
