//! Decoy reverse proxy
//!
//! Requests that do not carry the tunnel credential are passed to one of
//! the configured web backends, picked at random per request, so the
//! listener looks like an ordinary HTTPS site fronting a web application.
//! Protocol upgrades such as WebSockets are passed through to the backend
//! over a dedicated connection.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::Response;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use log::debug;
use openssl::ssl::SslConnector;
use rand::Rng;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::copy_bidirectional;
use url::{Position, Url};

use super::auth::{X_FORWARDED_FOR, X_REAL_IP};
use crate::common::{connect_tcp, MaybeTlsStream, Result, TunnelError};
use crate::tls::{connect_tls, relay_connector};

/// Largest request body passed on to a decoy backend
const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Header carrying the scheme the visitor used
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Headers that only apply to a single connection
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Random-balanced reverse proxy to the decoy backends
#[derive(Debug, Clone)]
pub struct DecoyProxy {
    targets: Vec<Url>,
    client: reqwest::Client,
    /// Used for upgrades to `https` backends
    tls: SslConnector,
    connect_timeout: Duration,
}

impl DecoyProxy {
    /// Create a proxy over `targets`
    ///
    /// An empty target list is allowed; every request then fails.
    pub fn new(targets: Vec<Url>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            targets,
            client,
            tls: relay_connector()?,
            connect_timeout,
        })
    }

    /// Pick a backend at random
    pub fn pick(&self) -> Option<&Url> {
        if self.targets.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.targets.len());
        self.targets.get(index)
    }

    /// Forward `req` to a backend and return its response
    ///
    /// # Parameters
    ///
    /// * `req` - Incoming request, passed on with its method and body
    /// * `client_ip` - Visitor address for the forwarding headers
    pub async fn forward(&self, req: Request, client_ip: IpAddr) -> Result<Response> {
        let target = self
            .pick()
            .ok_or_else(|| TunnelError::Http("no decoy backend configured".to_string()))?;

        if is_upgrade(req.headers()) {
            return self.forward_upgrade(req, target, client_ip).await;
        }

        let (parts, body) = req.into_parts();
        let url = join_url(target, parts.uri.path(), parts.uri.query());

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        add_forwarding_headers(&mut headers, client_ip);

        let body = to_bytes(body, MAX_BODY_SIZE)
            .await
            .map_err(|e| TunnelError::Http(format!("failed to read request body: {}", e)))?;

        debug!("Forwarding {} {} to decoy {}", parts.method, parts.uri, url);

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(response_headers) = response.headers_mut() {
            *response_headers = strip_hop_by_hop(upstream.headers());
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| TunnelError::Http(e.to_string()))
    }

    /// Pass an upgrade request to `target` and splice the two upgraded
    /// connections together once the backend switches protocols
    ///
    /// A backend refusing the upgrade has its response returned as is.
    async fn forward_upgrade(&self, mut req: Request, target: &Url, client_ip: IpAddr) -> Result<Response> {
        let visitor = hyper::upgrade::on(&mut req);
        let (parts, _body) = req.into_parts();
        let url = join_url(target, parts.uri.path(), parts.uri.query());

        let host = url
            .host_str()
            .ok_or_else(|| TunnelError::Http(format!("decoy URL has no host: {}", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TunnelError::Http(format!("decoy URL has no port: {}", url)))?;

        let tcp = connect_tcp(host, port, self.connect_timeout).await?;
        let stream = match url.scheme() {
            "https" => {
                let domain = host.trim_matches(|c| c == '[' || c == ']');
                MaybeTlsStream::Tls(connect_tls(&self.tls, domain, tcp).await?)
            }
            _ => MaybeTlsStream::Plain(tcp),
        };

        let (mut sender, conn) = http1::handshake::<_, Body>(TokioIo::new(stream))
            .await
            .map_err(|e| TunnelError::Http(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                debug!("Decoy upgrade connection ended with error: {}", e);
            }
        });

        let mut headers = upgrade_headers(&parts.headers);
        let authority = HeaderValue::from_str(&url[Position::BeforeHost..Position::AfterPort])
            .map_err(|e| TunnelError::Http(e.to_string()))?;
        headers.insert(header::HOST, authority);
        add_forwarding_headers(&mut headers, client_ip);

        let mut request = http::Request::builder()
            .method(parts.method.clone())
            .uri(&url[Position::BeforePath..Position::AfterQuery])
            .body(Body::empty())
            .map_err(|e| TunnelError::Http(e.to_string()))?;
        *request.headers_mut() = headers;

        debug!("Forwarding {} {} upgrade to decoy {}", parts.method, parts.uri, url);

        let mut upstream = sender
            .send_request(request)
            .await
            .map_err(|e| TunnelError::Http(e.to_string()))?;

        if upstream.status() != StatusCode::SWITCHING_PROTOCOLS {
            let (mut parts, body) = upstream.into_parts();
            parts.headers = strip_hop_by_hop(&parts.headers);
            return Ok(Response::from_parts(parts, Body::new(body)));
        }

        let backend = hyper::upgrade::on(&mut upstream);
        tokio::spawn(async move {
            match tokio::try_join!(visitor, backend) {
                Ok((visitor, backend)) => {
                    let mut visitor = TokioIo::new(visitor);
                    let mut backend = TokioIo::new(backend);
                    if let Err(e) = copy_bidirectional(&mut visitor, &mut backend).await {
                        debug!("Decoy upgrade relay ended with error: {}", e);
                    }
                }
                Err(e) => debug!("Decoy upgrade failed: {}", e),
            }
        });

        let mut response = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
        if let Some(response_headers) = response.headers_mut() {
            *response_headers = upstream.headers().clone();
        }

        response
            .body(Body::empty())
            .map_err(|e| TunnelError::Http(e.to_string()))
    }
}

/// Tokens listed in the `Connection` headers
fn connection_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
}

/// Whether the request asks to switch protocols
fn is_upgrade(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE)
        && connection_tokens(headers).any(|t| t.eq_ignore_ascii_case("upgrade"))
}

/// Headers for an upgrade request: end-to-end headers plus the upgrade
/// itself
fn upgrade_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = strip_hop_by_hop(headers);
    out.remove(header::HOST);
    out.remove(header::CONTENT_LENGTH);
    if let Some(protocol) = headers.get(header::UPGRADE) {
        out.insert(header::UPGRADE, protocol.clone());
    }
    out.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    out
}

/// Join the request path onto the backend URL and merge the queries
fn join_url(target: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = target.clone();

    let base = target.path();
    let joined = match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    };
    url.set_path(&joined);

    let merged = match (target.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{}&{}", a, b)),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };
    url.set_query(merged.as_deref());

    url
}

/// Copy `headers` without hop-by-hop headers, including those named in
/// `Connection`
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<HeaderName> = connection_tokens(headers)
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect();

    let mut out = headers.clone();
    for name in HOP_BY_HOP.iter().chain(listed.iter()) {
        out.remove(name);
    }
    // Upgrades are re-added by `upgrade_headers` only
    out.remove(header::UPGRADE);
    out
}

fn add_forwarding_headers(headers: &mut HeaderMap, client_ip: IpAddr) {
    let ip = client_ip.to_string();

    let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{}, {}", prior, ip),
        _ => ip.clone(),
    };

    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    if let Ok(value) = HeaderValue::from_str(&ip) {
        headers.insert(X_REAL_IP, value);
    }
    // The tunnel listener always terminates TLS
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));
}
