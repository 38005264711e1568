//! Stratum Tunnel Command Line Tool
//!
//! This binary is the command-line interface for Stratum Tunnel.

use clap::{Args, Parser, Subcommand};
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

use stratum_tunnel::common::{init_logger, level_for, Result};
use stratum_tunnel::config::{
    parse_listen, parse_pool, parse_url, ClientConfig, ServerConfig, CLIENT_LISTEN_STR,
    CONNECT_TIMEOUT_STR, SERVER_LISTEN_STR,
};
use stratum_tunnel::{ClientEndpoint, PoolTarget, ServerEndpoint, APP_NAME, VERSION};

/// Stratum Tunnel: carry mining pool connections over TLS WebSockets
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept tunnels and relay them to mining pools
    Server(ServerArgs),
    /// Accept miners and tunnel them to a relay server
    Client(ClientArgs),
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Shared secret expected from clients
    #[arg(long, env = "STRATUM_TUNNEL_TOKEN", hide_env_values = true)]
    token: String,

    /// Listen address
    #[arg(long, env = "STRATUM_TUNNEL_LISTEN", default_value = SERVER_LISTEN_STR, value_parser = parse_listen)]
    listen: SocketAddr,

    /// Decoy backend URL for unauthenticated requests (repeatable)
    #[arg(long, env = "STRATUM_TUNNEL_REDIRECT", value_delimiter = ',', value_parser = parse_url)]
    redirect: Vec<Url>,

    /// TLS certificate chain (PEM)
    #[arg(long, env = "STRATUM_TUNNEL_SSL_CERTIFICATE")]
    ssl_certificate: PathBuf,

    /// TLS private key (PEM)
    #[arg(long, env = "STRATUM_TUNNEL_SSL_CERTIFICATE_KEY")]
    ssl_certificate_key: PathBuf,

    /// Log frame payloads
    #[arg(long, env = "STRATUM_TUNNEL_DEBUG")]
    debug: bool,

    /// Timeout in seconds for connecting to mining pools
    #[arg(long, env = "STRATUM_TUNNEL_CONNECT_TIMEOUT", default_value = CONNECT_TIMEOUT_STR)]
    connect_timeout: u64,
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Relay server URL (ws:// or wss://)
    #[arg(long, env = "STRATUM_TUNNEL_SERVER", value_parser = parse_url)]
    server: Url,

    /// Mining pool address (tcp://, tls:// or ssl://host:port)
    #[arg(long, env = "STRATUM_TUNNEL_POOL", value_parser = parse_pool)]
    pool: PoolTarget,

    /// Shared secret presented to the server
    #[arg(long, env = "STRATUM_TUNNEL_TOKEN", hide_env_values = true)]
    token: String,

    /// Listen address for miners
    #[arg(long, env = "STRATUM_TUNNEL_LISTEN", default_value = CLIENT_LISTEN_STR, value_parser = parse_listen)]
    listen: SocketAddr,

    /// Log frame payloads
    #[arg(long, env = "STRATUM_TUNNEL_DEBUG")]
    debug: bool,

    /// Timeout in seconds for connecting to the relay server
    #[arg(long, env = "STRATUM_TUNNEL_CONNECT_TIMEOUT", default_value = CONNECT_TIMEOUT_STR)]
    connect_timeout: u64,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            token: args.token,
            listen: args.listen,
            redirect: args.redirect,
            ssl_certificate: args.ssl_certificate,
            ssl_certificate_key: args.ssl_certificate_key,
            debug: args.debug,
            connect_timeout: args.connect_timeout,
        }
    }
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            server: args.server,
            pool: args.pool,
            token: args.token,
            listen: args.listen,
            debug: args.debug,
            connect_timeout: args.connect_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    match cli.command {
        Command::Server(args) => {
            let config = ServerConfig::from(args);
            init_logger(level_for(config.debug));
            info!("Starting {} v{} (server)", APP_NAME, VERSION);

            config.validate()?;
            config.log();

            let server = ServerEndpoint::new(config)?;
            tokio::select! {
                result = server.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    Ok(())
                }
            }
        }
        Command::Client(args) => {
            let config = ClientConfig::from(args);
            init_logger(level_for(config.debug));
            info!("Starting {} v{} (client)", APP_NAME, VERSION);

            config.validate()?;
            config.log();

            let client = ClientEndpoint::new(config)?;
            tokio::select! {
                result = client.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    Ok(())
                }
            }
        }
    }
}
