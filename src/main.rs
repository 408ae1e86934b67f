//! omnihost server binary.
//!
//! Starts the HTTP/WebSocket listener, announces the endpoint when
//! configured, and on Ctrl+C destroys every remaining session before
//! releasing the listening socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omnihost::{
    announce, api,
    config::{ConfigError, HostConfig},
    project::StaticProjectRoot,
    session::SessionRegistry,
    shutdown::ShutdownCoordinator,
};

/// omnihost - terminal session broker
///
/// Runs commands on this machine for authenticated remote clients and
/// streams their output over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "omnihost", version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP/WebSocket server
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Shared access token (required for non-localhost bindings)
    #[arg(long, env = "OMNIHOST_TOKEN")]
    token: Option<String>,

    /// Default working directory for launched commands
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Error, Debug)]
enum HostError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), HostError> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let bind = cli
        .bind
        .or(config.bind)
        .unwrap_or_else(|| DEFAULT_BIND.parse().unwrap());
    let token = resolve_token(&bind, cli.token.or_else(|| config.token.clone()));
    let project_root = cli.project_root.or_else(|| config.project_root.clone());

    if token.is_some() {
        tracing::info!("auth token configured");
    }

    let sessions = SessionRegistry::new();
    let shutdown = ShutdownCoordinator::new();
    let state = api::AppState {
        sessions: sessions.clone(),
        shutdown: shutdown.clone(),
        token: token.clone(),
        project_root: Arc::new(StaticProjectRoot::new(project_root)),
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| HostError::Bind { addr: bind, source })?;
    tracing::info!(addr = %bind, "omnihost listening");

    if let Some(announce_config) = config.announce {
        let port = bind.port();
        let token = token.clone();
        tokio::spawn(async move {
            announce::announce_endpoint(&announce_config, port, token.as_deref()).await;
        });
    }

    let (server_shutdown_tx, server_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                server_shutdown_rx.await.ok();
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl+C, shutting down");

    // Tell connection handlers to flush close frames and sweep their own
    // sessions first.
    shutdown.shutdown();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Destroy whatever is still registered before releasing the listener.
    let leftover = sessions.drain();
    if !leftover.is_empty() {
        tracing::info!(count = leftover.len(), "destroying remaining sessions");
        for session in leftover {
            session.destroy();
        }
    }

    let _ = server_shutdown_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "server error during shutdown"),
        Err(e) => tracing::warn!(?e, "server task panicked"),
    }

    tracing::info!("omnihost exiting");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "omnihost=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(cli: &Cli) -> Result<HostConfig, ConfigError> {
    let path = cli.config.clone().or_else(HostConfig::default_path);
    match path {
        Some(path) => Ok(HostConfig::load(&path)?.unwrap_or_default()),
        None => Ok(HostConfig::default()),
    }
}

/// Resolve the access token: an explicitly configured token always wins;
/// loopback binds may run unauthenticated; any other bind gets a generated
/// token printed to stderr.
fn resolve_token(bind: &SocketAddr, configured: Option<String>) -> Option<String> {
    if let Some(token) = configured {
        return Some(token);
    }
    if bind.ip().is_loopback() {
        tracing::warn!("no token configured; loopback bind runs unauthenticated");
        return None;
    }
    use rand::Rng;
    let token: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    eprintln!("omnihost: access token (required for non-localhost): {token}");
    Some(token)
}
