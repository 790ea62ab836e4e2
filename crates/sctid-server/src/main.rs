#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use futures::{Stream, StreamExt};
use sctid::{Coordinator, FileStore};
use server::config::{CliArgs, ServerConfig};
use server::connection::serve_connection;
use server::service::handler::SctIdService;
use server::telemetry::init_telemetry;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    let store = FileStore::open(&config.data_dir)
        .with_context(|| format!("failed to open data directory {}", config.data_dir.display()))?;
    let coordinator = Coordinator::new(store, config.coordinator.clone());
    let service = SctIdService::new(coordinator, config.authorizer.clone(), &config.service);

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(incoming, service).await;
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(incoming, service).await
    }
}

async fn run_server_with_incoming<I, IO>(incoming: I, service: SctIdService) -> anyhow::Result<()>
where
    I: Stream<Item = std::io::Result<IO>>,
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let shutdown = shutdown_signal();
    tokio::pin!(incoming);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            conn = incoming.next() => match conn {
                Some(Ok(io)) => {
                    tokio::spawn(serve_connection(io, service.clone()));
                }
                Some(Err(e)) => tracing::warn!(error = %e, "failed to accept connection"),
                None => break,
            },
        }
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    service.shutdown().await?;
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    tracing::info!(
        addr,
        data_dir = %config.data_dir.display(),
        workers = config.service.num_workers,
        max_batch_size = config.coordinator.max_batch_size,
        lock_timeout = ?config.coordinator.lock_timeout,
        recycle = ?config.coordinator.recycle,
        principals = config.authorizer.len(),
        "Starting SCTID service"
    );
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
