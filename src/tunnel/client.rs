//! Client tunnel endpoint
//!
//! Listens for miners on a local port and carries each connection through
//! its own WebSocket session to the relay server.

use http::header::AUTHORIZATION;
use http::HeaderValue;
use log::{error, info, warn};
use openssl::ssl::SslConnector;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async, WebSocketStream};

use super::auth::Credential;
use super::session_id;
use crate::common::{connect_tcp, tune_stream, BufferPool, MaybeTlsStream, Result, TunnelError};
use crate::config::ClientConfig;
use crate::protocol::{FramedConnection, POOL_HEADER};
use crate::relay::relay;
use crate::tls::{connect_tls, relay_connector};

/// Client tunnel endpoint
///
/// Cheap to clone; clones share configuration, TLS context and buffers.
#[derive(Clone)]
pub struct ClientEndpoint {
    config: Arc<ClientConfig>,
    credential: Credential,
    pool_header: HeaderValue,
    relay_tls: Arc<SslConnector>,
    buffers: BufferPool,
}

impl ClientEndpoint {
    /// Create the endpoint
    pub fn new(config: ClientConfig) -> Result<Self> {
        let credential = Credential::new(&config.token)?;
        let pool_header = HeaderValue::from_str(&config.pool.to_string())
            .map_err(|e| TunnelError::Config(format!("Invalid pool address: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            credential,
            pool_header,
            relay_tls: Arc::new(relay_connector()?),
            buffers: BufferPool::default(),
        })
    }

    /// Bind the configured address and serve until an error occurs
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen).await?;
        info!(
            "Client is running on {}, relaying to {} via {}",
            listener.local_addr()?,
            self.config.pool,
            self.config.server
        );

        self.serve(listener).await
    }

    /// Accept miners on `listener`
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        // Create a JoinSet to manage tasks efficiently
        let mut sessions = JoinSet::new();

        loop {
            // Check for completed tasks and log any errors
            while let Some(result) = sessions.try_join_next() {
                if let Err(e) = result {
                    error!("Session task error: {}", e);
                }
            }

            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    continue;
                }
            };

            let endpoint = self.clone();
            sessions.spawn(async move {
                let session = session_id();
                if let Err(e) = endpoint.handle_miner(&session, stream, peer).await {
                    error!("[{}] Session of {} failed: {}", session, peer, e);
                }
            });
        }
    }

    async fn handle_miner(&self, session: &str, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        info!("[{}] New connection from {}", session, peer);

        tune_stream(&stream)?;
        let conn = FramedConnection::new(stream, self.buffers.clone());

        let transport = match self.open_session().await {
            Ok(transport) => transport,
            Err(e) if e.is_handshake_rejection() => {
                // Wrong token or not a tunnel server; only this miner is dropped
                warn!("[{}] Relay server refused the session: {}", session, e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        relay(conn, transport).await.into_result()?;
        info!("[{}] Client {} disconnected", session, peer);
        Ok(())
    }

    /// Dial the relay server and perform the authenticated upgrade
    pub async fn open_session(&self) -> Result<WebSocketStream<MaybeTlsStream>> {
        let server = &self.config.server;
        let host = server
            .host_str()
            .ok_or_else(|| TunnelError::Config(format!("Relay server URL has no host: {}", server)))?;
        let port = server
            .port_or_known_default()
            .ok_or_else(|| TunnelError::Config(format!("Relay server URL has no port: {}", server)))?;

        let tcp = connect_tcp(host, port, self.config.connect_timeout()).await?;
        let stream = if server.scheme() == "wss" {
            let domain = host.trim_start_matches('[').trim_end_matches(']');
            MaybeTlsStream::Tls(connect_tls(&self.relay_tls, domain, tcp).await?)
        } else {
            MaybeTlsStream::Plain(tcp)
        };

        let mut request = server.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, self.credential.header_value().clone());
        headers.insert(POOL_HEADER, self.pool_header.clone());

        let (transport, _response) = client_async(request, stream).await?;
        Ok(transport)
    }
}
