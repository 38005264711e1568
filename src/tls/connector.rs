//! Outbound TLS connections
//!
//! Two connectors are used: one for the relay server, which verifies the
//! peer certificate and host name as usual, and one for mining pools, which
//! are often self-hosted with self-signed certificates and are therefore
//! dialed without verification.

use log::debug;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use crate::common::{Result, TunnelError};

/// Connector for `wss://` relay servers, using the system trust store
pub fn relay_connector() -> Result<SslConnector> {
    let builder = SslConnector::builder(SslMethod::tls_client())?;
    Ok(builder.build())
}

/// Connector for `tls://` mining pools, with peer verification disabled
pub fn pool_connector() -> Result<SslConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    builder.set_verify(SslVerifyMode::NONE);
    Ok(builder.build())
}

/// Run the client side of a TLS handshake
///
/// `domain` is sent as SNI unless it is an IP address. Host name checks
/// follow the connector: a non-verifying connector skips them too.
pub async fn connect_tls(connector: &SslConnector, domain: &str, stream: TcpStream) -> Result<SslStream<TcpStream>> {
    let verify = connector.context().verify_mode() != SslVerifyMode::NONE;

    let mut config = connector.configure()?;
    config.set_verify_hostname(verify);
    let ssl = config.into_ssl(domain)?;

    let mut stream = SslStream::new(ssl, stream)?;
    Pin::new(&mut stream)
        .connect()
        .await
        .map_err(|e| TunnelError::TlsHandshake(format!("{}: {}", domain, e)))?;

    debug!("TLS handshake with {} successful", domain);
    Ok(stream)
}
