//! TLS acceptor for the tunnel listener

use log::debug;
use openssl::ssl::{Ssl, SslAcceptor, SslFiletype, SslMethod};
use std::path::Path;
use std::pin::Pin;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use crate::common::{Result, TunnelError};

/// Create the TLS acceptor for the server endpoint
///
/// The certificate file may carry a full chain (leaf first).
///
/// # Example
///
/// ```no_run
/// # use std::path::Path;
/// # use stratum_tunnel::tls::create_tls_acceptor;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let acceptor = create_tls_acceptor(
///     Path::new("/etc/stratum-tunnel/fullchain.pem"),
///     Path::new("/etc/stratum-tunnel/privkey.pem"),
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<SslAcceptor> {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

    acceptor.set_certificate_chain_file(cert_path)?;
    acceptor.set_private_key_file(key_path, SslFiletype::PEM)?;
    acceptor.check_private_key()?;

    debug!("Loaded TLS certificate from {}", cert_path.display());
    Ok(acceptor.build())
}

/// Run the server side of a TLS handshake on an accepted socket
pub async fn accept_tls(acceptor: &SslAcceptor, stream: TcpStream) -> Result<SslStream<TcpStream>> {
    let ssl = Ssl::new(acceptor.context())?;
    let mut stream = SslStream::new(ssl, stream)?;

    Pin::new(&mut stream)
        .accept()
        .await
        .map_err(|e| TunnelError::TlsHandshake(e.to_string()))?;

    debug!("TLS handshake successful");
    Ok(stream)
}
