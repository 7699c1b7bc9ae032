// logctl agent - Worker process that applies the controller's logging configuration

use anyhow::Context;
use clap::Parser;
use logctl::agent::Agent;
use logctl::config::DEFAULT_SOCKET_PATH;
use logctl::control::{LevelRegistry, RemoteApplyState};
use logctl::logging::{init_tracing, LogManager, LoggerDirectory};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// logctl agent
#[derive(Parser)]
#[command(name = "logctl-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Name shown in `logctl agents` (defaults to agent-<pid>)
    #[arg(short, long)]
    name: Option<String>,

    /// Controller socket
    #[arg(short, long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Seconds between reconnection attempts; 0 exits when the controller goes away
    #[arg(long, default_value = "5")]
    reconnect_secs: u64,

    /// Emit an INFO record on `logctl::agent::heartbeat` every N seconds
    #[arg(long)]
    heartbeat_secs: Option<u64>,

    /// Console filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let name = args
        .name
        .unwrap_or_else(|| format!("agent-{}", std::process::id()));

    let directory: Arc<dyn LoggerDirectory> = Arc::new(LogManager::new());
    init_tracing(Arc::clone(&directory), &args.log_filter)?;

    let registry = Arc::new(LevelRegistry::new(directory));
    let state = Arc::new(RemoteApplyState::new(registry));

    let mut agent = Agent::new(&name, &args.socket, state);
    if args.reconnect_secs > 0 {
        agent = agent.with_reconnect_delay(Duration::from_secs(args.reconnect_secs));
    }

    if let Some(secs) = args.heartbeat_secs.filter(|s| *s > 0) {
        let agent_name = name.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            let mut beat: u64 = 0;
            loop {
                ticker.tick().await;
                beat += 1;
                tracing::info!(target: "logctl::agent::heartbeat", agent = %agent_name, beat, "alive");
            }
        });
    }

    agent
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .with_context(|| format!("agent {} stopped", name))?;

    Ok(())
}
