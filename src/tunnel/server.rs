//! Server tunnel endpoint
//!
//! Terminates TLS, serves HTTP/1.1 and upgrades authenticated `GET /`
//! requests to a WebSocket that is relayed to the requested mining pool.
//! Everything else is answered by the decoy backends, or with a bare 503.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http::{HeaderMap, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use log::{debug, error, info};
use openssl::ssl::{SslAcceptor, SslConnector};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::ServiceExt;

use super::auth::{client_ip, Credential};
use super::decoy::DecoyProxy;
use super::session_id;
use crate::common::{tune_stream, BufferPool, Result};
use crate::config::ServerConfig;
use crate::protocol::{FramedConnection, PoolTarget, POOL_HEADER};
use crate::relay::relay;
use crate::tls::{accept_tls, create_tls_acceptor, pool_connector};

/// State shared by all requests
#[derive(Clone)]
struct ServerState {
    credential: Credential,
    decoy: DecoyProxy,
    buffers: BufferPool,
    pool_tls: Arc<SslConnector>,
    connect_timeout: Duration,
}

/// Server tunnel endpoint
pub struct ServerEndpoint {
    config: ServerConfig,
    state: ServerState,
}

impl ServerEndpoint {
    /// Create the endpoint
    ///
    /// The TLS material is only loaded by [`ServerEndpoint::run`].
    pub fn new(config: ServerConfig) -> Result<Self> {
        let state = ServerState {
            credential: Credential::new(&config.token)?,
            decoy: DecoyProxy::new(config.redirect.clone(), config.connect_timeout())?,
            buffers: BufferPool::default(),
            pool_tls: Arc::new(pool_connector()?),
            connect_timeout: config.connect_timeout(),
        };

        Ok(Self { config, state })
    }

    /// HTTP router: authentication, the tunnel route and the 503 fallback
    ///
    /// Must be served with `ConnectInfo<SocketAddr>` available.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(open_tunnel).fallback(unavailable))
            .fallback(unavailable)
            .layer(middleware::from_fn_with_state(self.state.clone(), authenticate))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until an error occurs
    pub async fn run(&self) -> Result<()> {
        let acceptor = create_tls_acceptor(&self.config.ssl_certificate, &self.config.ssl_certificate_key)?;

        let listener = TcpListener::bind(self.config.listen).await?;
        info!("Server is running on {}", listener.local_addr()?);

        self.serve_tls(listener, acceptor).await
    }

    /// Accept TLS connections on `listener` and serve the router on each
    pub async fn serve_tls(&self, listener: TcpListener, acceptor: SslAcceptor) -> Result<()> {
        let acceptor = Arc::new(acceptor);
        let router = self.router();

        // Create a JoinSet to manage tasks efficiently
        let mut connections = JoinSet::new();

        loop {
            // Check for completed tasks and log any errors
            while let Some(result) = connections.try_join_next() {
                if let Err(e) = result {
                    error!("Connection task error: {}", e);
                }
            }

            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    continue;
                }
            };

            if let Err(e) = tune_stream(&stream) {
                debug!("Failed to tune socket of {}: {}", peer, e);
            }

            let acceptor = Arc::clone(&acceptor);
            let router = router.clone();

            connections.spawn(async move {
                // Scanners probing the port are expected
                let stream = match accept_tls(&acceptor, stream).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        debug!("TLS handshake with {} failed: {}", peer, e);
                        return;
                    }
                };

                let service = router.map_request(move |mut req: Request<Incoming>| {
                    req.extensions_mut().insert(ConnectInfo(peer));
                    req
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
                    .with_upgrades()
                    .await
                {
                    debug!("Connection from {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

async fn unavailable() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

/// Let authenticated requests through, proxy the rest to a decoy
async fn authenticate(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if state.credential.authorizes(req.headers()) {
        return next.run(req).await;
    }

    let ip = client_ip(req.headers(), peer);
    info!("Unauthorized request from {}: {} {}", ip, req.method(), req.uri());

    match state.decoy.forward(req, ip).await {
        Ok(response) => response,
        Err(e) => {
            error!("Decoy request from {} failed: {}", ip, e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// `GET /` with valid credentials
async fn open_tunnel(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ip = client_ip(&headers, peer);

    let target = match headers.get(POOL_HEADER).map(|v| v.to_str()) {
        Some(Ok(value)) => value.parse::<PoolTarget>(),
        Some(Err(_)) | None => {
            error!("Request from {} has no usable {} header", ip, POOL_HEADER);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };
    let target = match target {
        Ok(target) => target,
        Err(e) => {
            error!("Request from {} rejected: {}", ip, e);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(e) => {
            error!("WebSocket upgrade from {} failed: {}", ip, e);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    upgrade
        .on_failed_upgrade(move |e| error!("WebSocket upgrade from {} failed: {}", ip, e))
        .on_upgrade(move |socket| run_session(state, socket, target, ip))
}

async fn run_session(state: ServerState, socket: WebSocket, target: PoolTarget, ip: IpAddr) {
    let session = session_id();
    info!("[{}] New connection from {} to {}", session, ip, target);

    let pool = match target.dial(&state.pool_tls, state.connect_timeout).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("[{}] Failed to connect to mining pool {}: {}", session, target, e);
            return;
        }
    };

    let conn = FramedConnection::new(pool, state.buffers.clone());
    match relay(conn, socket).await.into_result() {
        Ok(()) => info!("[{}] Client {} disconnected", session, ip),
        Err(e) => error!("[{}] Session of {} failed: {}", session, ip, e),
    }
}
