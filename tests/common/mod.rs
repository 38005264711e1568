//! Shared helpers for the integration tests

#![allow(dead_code)]

use axum::extract::ws::{Message as DecoyMessage, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::Router;
use http::HeaderValue;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::ssl::SslAcceptor;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Builder, X509NameBuilder};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use stratum_tunnel::config::ServerConfig;
use stratum_tunnel::tls::{accept_tls, create_tls_acceptor};
use stratum_tunnel::ServerEndpoint;

pub const TOKEN: &str = "correct-horse";

/// Self-signed certificate and key written to temporary PEM files
pub struct CertFiles {
    pub cert: NamedTempFile,
    pub key: NamedTempFile,
}

impl CertFiles {
    pub fn acceptor(&self) -> SslAcceptor {
        create_tls_acceptor(self.cert.path(), self.key.path()).unwrap()
    }
}

/// Mint a P-256 certificate for `localhost` / `127.0.0.1`
pub fn self_signed() -> CertFiles {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let pkey = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();

    let mut cert = NamedTempFile::new().unwrap();
    cert.write_all(&builder.build().to_pem().unwrap()).unwrap();
    let mut key = NamedTempFile::new().unwrap();
    key.write_all(&pkey.private_key_to_pem_pkcs8().unwrap()).unwrap();

    CertFiles { cert, key }
}

/// Answer every line with `echo:<line>`
async fn echo_lines<S>(stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = format!("echo:{}\n", line);
        if write.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Fake mining pool; returns its address and a counter of accepted sockets
pub async fn spawn_pool(acceptor: Option<SslAcceptor>) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let acceptor = acceptor.map(Arc::new);

    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                match acceptor {
                    Some(acceptor) => {
                        if let Ok(tls) = accept_tls(&acceptor, stream).await {
                            echo_lines(tls).await;
                        }
                    }
                    None => echo_lines(stream).await,
                }
            });
        }
    });

    (addr, accepted)
}

async fn describe(uri: Uri, headers: HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };

    format!(
        "decoy uri={} xff={} real-ip={} proto={} host={} auth={}",
        uri,
        header("x-forwarded-for"),
        header("x-real-ip"),
        header("x-forwarded-proto"),
        header("host"),
        header("authorization"),
    )
}

/// Decoy web backend describing every request it sees
pub async fn spawn_decoy() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().fallback(describe);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Decoy web backend serving a WebSocket that answers `decoy:<text>`
pub async fn spawn_ws_decoy() -> SocketAddr {
    async fn echo(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(|mut socket| async move {
            while let Some(Ok(DecoyMessage::Text(text))) = socket.recv().await {
                let reply = DecoyMessage::Text(format!("decoy:{}", text));
                if socket.send(reply).await.is_err() {
                    break;
                }
            }
        })
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().fallback(echo);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Pool that sends `payload` once connected and then stays silent
pub async fn spawn_raw_pool(payload: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if stream.write_all(payload).await.is_ok() {
                    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                }
            });
        }
    });

    addr
}

/// Server endpoint over plain HTTP
pub async fn spawn_plain_server(redirect: Option<SocketAddr>) -> SocketAddr {
    let mut config = ServerConfig::new(TOKEN, "unused.pem", "unused.key");
    if let Some(decoy) = redirect {
        config.redirect.push(format!("http://{}/site/", decoy).parse().unwrap());
    }
    let endpoint = ServerEndpoint::new(config).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = endpoint.router().into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Upgrade request for the tunnel
pub fn tunnel_request(url: &str, token: &str, pool: &str) -> Request {
    let mut request = url.into_client_request().unwrap();
    let headers = request.headers_mut();
    headers.insert("authorization", HeaderValue::from_str(&format!("Basic {}", token)).unwrap());
    headers.insert("x-pool", HeaderValue::from_str(pool).unwrap());
    request
}
