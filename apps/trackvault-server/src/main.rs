//! TrackVault Server - streams audio tracks in and out of chunked storage.
//!
//! This binary wires the [`TrackStore`] to the HTTP layer in
//! `trackvault-http` and serves it until `SIGINT`, draining in-flight
//! transfers before exiting.
//!
//! # Usage
//!
//! ```text
//! DATABASE=file:///var/lib/trackvault TRACKS_LISTEN=0.0.0.0:4343 trackvault-server
//! ```
//!
//! # Environment Variables
//!
//! A `.env` file in the working directory is loaded first.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TRACKS_LISTEN` | `0.0.0.0:4343` | Bind address |
//! | `DATABASE` | `memory://` | Storage connection string |
//! | `DATABASE_NAME` | `qb_track_db` | Database name |
//! | `TRACKS_BUCKET` | `tracks` | Bucket name |
//! | `TRACKS_CHUNK_SIZE` | `261120` | Chunk size in bytes |
//! | `TRACKS_MAX_UPLOAD_SIZE` | `100000000` | Largest accepted track in bytes |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use trackvault_core::{TrackStore, TrackStoreConfig};
use trackvault_http::service::{TrackHttpConfig, TrackHttpService};

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref(), log_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

fn log_filter(rust_log: Option<&str>, log_level: &str) -> Result<EnvFilter> {
    let directives = rust_log.filter(|d| !d.trim().is_empty()).unwrap_or(log_level);
    EnvFilter::try_new(directives).with_context(|| format!("invalid log filter: {directives}"))
}

/// Accept connections until `shutdown` resolves, then wait for in-flight
/// transfers to drain.
async fn serve(
    listener: TcpListener,
    service: TrackHttpService,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let graceful = GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());
    tokio::pin!(shutdown);

    loop {
        let (stream, peer_addr) = tokio::select! {
            () = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            },
        };
        debug!(%peer_addr, "accepted connection");

        let conn = graceful.watch(
            http.serve_connection(TokioIo::new(stream), service.clone())
                .into_owned(),
        );
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                error!(%peer_addr, error = %e, "connection error");
            }
        });
    }

    info!("draining open transfers");
    graceful.shutdown().await;
    info!("all transfers drained, exiting");
    Ok(())
}

/// Resolve on `SIGINT`.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for SIGINT, running until killed");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}

/// Query the health endpoint of a running server.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if is_healthy_response(&response) {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

fn is_healthy_response(response: &str) -> bool {
    response.starts_with("HTTP/1.1 200") && response.contains("\"status\":\"running\"")
}

/// The address a local health check should connect to for a bind address.
fn health_check_address(listen: &str) -> String {
    listen.replace("0.0.0.0", "127.0.0.1")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = TrackStoreConfig::from_env();
        let healthy = run_health_check(&health_check_address(&config.listen))
            .await
            .is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = TrackStoreConfig::from_env();

    init_tracing(&config.log_level)?;

    info!(
        listen = %config.listen,
        database = %config.database_url,
        database_name = %config.database_name,
        bucket = %config.bucket,
        chunk_size = config.chunk_size,
        max_upload_size = config.max_upload_size,
        version = VERSION,
        "starting TrackVault Server",
    );

    let http_config = TrackHttpConfig::from_store_config(&config);
    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let store = match TrackStore::connect(config).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to connect to storage");
            std::process::exit(1);
        }
    };
    info!("connected to storage");

    let service = TrackHttpService::new(store, http_config);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service, ctrl_c()).await
}
