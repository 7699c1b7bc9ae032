// logctl controller - Holds the logging configuration and serves the CLI and agents

use anyhow::Context;
use clap::Parser;
use logctl::config::ControllerConfig;
use logctl::controller::Controller;
use logctl::ipc::IpcServer;
use logctl::logging::{init_tracing, LogManager, LoggerDirectory};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

/// logctl controller daemon
#[derive(Parser)]
#[command(name = "logctl-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket to listen on; overrides the configuration file
    #[arg(short, long)]
    socket: Option<PathBuf>,
}

/// Resolve on SIGTERM or SIGINT
async fn shutdown_signal() {
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to setup SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = signal::ctrl_c() => tracing::info!("Received SIGINT"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    let directory: Arc<dyn LoggerDirectory> = Arc::new(LogManager::new());
    init_tracing(Arc::clone(&directory), &config.log_filter)?;

    let mut server = IpcServer::with_socket_path(&config.socket_path);
    server.start().context("starting IPC server")?;

    let controller = Arc::new(Controller::new(config, directory)?);
    controller.serve(server, shutdown_signal()).await?;

    tracing::info!("Controller stopped");
    Ok(())
}
