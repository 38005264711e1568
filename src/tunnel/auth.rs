//! Tunnel authentication
//!
//! Clients present `Authorization: Basic <token>`. The whole header value is
//! compared against the expected credential; anything else, including a
//! missing header, is treated as an ordinary web visitor.

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use std::net::{IpAddr, SocketAddr};

use crate::common::{Result, TunnelError};

/// Header with the proxy chain, client first
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Header with the original client address
pub const X_REAL_IP: &str = "x-real-ip";

/// Expected credential, i.e. the full `Authorization` header value
#[derive(Clone)]
pub struct Credential {
    value: HeaderValue,
}

impl Credential {
    /// Build the credential for `token`
    pub fn new(token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Basic {}", token))
            .map_err(|e| TunnelError::Config(format!("Token is not a valid header value: {}", e)))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }

    /// The header value to send
    pub fn header_value(&self) -> &HeaderValue {
        &self.value
    }

    /// Whether `headers` carry this credential
    pub fn authorizes(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .map_or(false, |v| constant_time_compare(v.as_bytes(), self.value.as_bytes()))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

/// Address of the visitor for logs
///
/// First entry of `X-Forwarded-For`, then `X-Real-IP`, then the peer.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    let forwarded: Option<IpAddr> = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    let real_ip = || -> Option<IpAddr> {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };

    forwarded.or_else(real_ip).unwrap_or_else(|| peer.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"Basic abc", b"Basic abc"));
        assert!(!constant_time_compare(b"Basic abc", b"Basic abd"));
        assert!(!constant_time_compare(b"Basic abc", b"Basic abcd"));
        assert!(constant_time_compare(b"", b""));
    }

    #[test]
    fn test_credential_matching() {
        let credential = Credential::new("s3cret").unwrap();
        assert_eq!(credential.header_value(), "Basic s3cret");

        assert!(credential.authorizes(&headers(&[("authorization", "Basic s3cret")])));
        assert!(!credential.authorizes(&headers(&[("authorization", "Basic wrong")])));
        assert!(!credential.authorizes(&headers(&[("authorization", "Bearer s3cret")])));
        assert!(!credential.authorizes(&headers(&[("authorization", "basic s3cret")])));
        assert!(!credential.authorizes(&headers(&[])));
    }

    #[test]
    fn test_credential_rejects_control_characters() {
        assert!(matches!(Credential::new("bad\r\ntoken"), Err(TunnelError::Config(_))));
    }

    #[test]
    fn test_client_ip_resolution() {
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();

        let ip = client_ip(&headers(&[("x-forwarded-for", "203.0.113.7, 10.1.1.1")]), peer);
        assert_eq!(ip.to_string(), "203.0.113.7");

        let ip = client_ip(&headers(&[("x-real-ip", "198.51.100.2")]), peer);
        assert_eq!(ip.to_string(), "198.51.100.2");

        let ip = client_ip(
            &headers(&[("x-forwarded-for", "garbage"), ("x-real-ip", "198.51.100.2")]),
            peer,
        );
        assert_eq!(ip.to_string(), "198.51.100.2");

        assert_eq!(client_ip(&HeaderMap::new(), peer), peer.ip());
    }
}
