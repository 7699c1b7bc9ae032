// Controller - Owns the configuration planes and serves CLI and agent connections

use crate::auth;
use crate::config::{check_target_name, ControllerConfig, NameCheck};
use crate::control::{
    ApplyChannel, ConfigBroadcaster, LevelRegistry, LoggerBinding, RemoteApplyState, Scope,
    TailSession,
};
use crate::error::{LogCtlError, Result};
use crate::ipc::{
    AgentHello, AgentInfo, AgentLogOptions, Command, Connection, ControllerStatus, IpcServer,
    Request, Response, ResponseData, SocketTransport, TailOptions, TargetOptions,
};
use crate::logging::{ChannelSink, Level, LoggerDirectory, RecordSink};
use crate::workers::{WorkerLink, WorkerRegistry};
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Name the controller's own link is listed under
pub const CONTROLLER_NAME: &str = "(controller)";

/// The central process: two configuration planes, the live workers, and the
/// IPC front door
pub struct Controller {
    config: ControllerConfig,
    registry: Arc<LevelRegistry>,
    workers: Arc<WorkerRegistry>,
    local: Arc<RemoteApplyState>,
    /// Admin console targets, applied here and on every agent
    targets: Arc<ConfigBroadcaster>,
    /// `configure-agent-logs` names, applied on agents only
    agent_logs: Arc<ConfigBroadcaster>,
    /// Flipped to `true` once when serving stops; ends live tail sessions
    stopping: watch::Sender<bool>,
    start_time: SystemTime,
}

impl Controller {
    /// Create a controller writing its own targets to the real stderr
    pub fn new(config: ControllerConfig, directory: Arc<dyn LoggerDirectory>) -> Result<Self> {
        let registry = Arc::new(LevelRegistry::new(directory));
        let local = Arc::new(RemoteApplyState::new(Arc::clone(&registry)));
        Self::with_apply_state(config, registry, local)
    }

    /// Create a controller around an existing registry and apply state
    ///
    /// Applies the configured startup targets before returning.
    pub fn with_apply_state(
        config: ControllerConfig,
        registry: Arc<LevelRegistry>,
        local: Arc<RemoteApplyState>,
    ) -> Result<Self> {
        config.validate()?;
        let startup = config.bindings()?;

        let workers = Arc::new(WorkerRegistry::new(CONTROLLER_NAME));
        let targets = ConfigBroadcaster::new(
            ApplyChannel::StderrTargets,
            Scope::LocalAndRemote,
            Arc::clone(&workers),
            Arc::clone(&local),
        );
        let agent_logs = ConfigBroadcaster::new(
            ApplyChannel::AgentStdout,
            Scope::RemoteOnly,
            Arc::clone(&workers),
            Arc::clone(&local),
        );

        if !startup.is_empty() {
            targets.set_configuration(startup);
        }

        Ok(Self {
            config,
            registry,
            workers,
            local,
            targets,
            agent_logs,
            stopping: watch::channel(false).0,
            start_time: SystemTime::now(),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LevelRegistry> {
        &self.registry
    }

    pub fn workers(&self) -> &Arc<WorkerRegistry> {
        &self.workers
    }

    pub fn targets(&self) -> &Arc<ConfigBroadcaster> {
        &self.targets
    }

    pub fn agent_logs(&self) -> &Arc<ConfigBroadcaster> {
        &self.agent_logs
    }

    /// Handle a request-response command
    ///
    /// `TailLog` and `AgentHello` take over their connection and are served
    /// by [`Controller::handle_connection`] instead.
    pub fn handle_command(&self, command: Command) -> Result<ResponseData> {
        match command {
            Command::ConfigureAgentLogs(options) => self.configure_agent_logs(options),
            Command::SetTargets(options) => self.set_targets(options),
            Command::ClearTargets => {
                let (config, agents) = self.targets.clear();
                Ok(ResponseData::TargetsApplied {
                    generation: config.generation(),
                    agents,
                })
            }
            Command::GetTargets => Ok(ResponseData::Targets(
                self.targets.current_configuration().map(|c| (*c).clone()),
            )),
            Command::ListAgents => Ok(ResponseData::Agents(self.list_agents())),
            Command::Status => Ok(ResponseData::Status(self.status())),
            Command::TailLog(_) | Command::AgentHello(_) => Err(LogCtlError::ProtocolError(
                "This command needs a dedicated connection".to_string(),
            )),
        }
    }

    fn configure_agent_logs(&self, options: AgentLogOptions) -> Result<ResponseData> {
        let level = Level::parse(&options.level)?;
        let bindings: Vec<LoggerBinding> = options
            .names
            .iter()
            .map(|name| LoggerBinding::new(name.trim(), level))
            .collect();

        let (config, agents) = self.agent_logs.set_configuration(bindings);
        Ok(ResponseData::AgentLogsConfigured {
            generation: config.generation(),
            agents,
        })
    }

    fn set_targets(&self, options: TargetOptions) -> Result<ResponseData> {
        // parse everything before touching any logger
        let bindings = options
            .targets
            .iter()
            .map(|t| LoggerBinding::parse_target(t))
            .collect::<Result<Vec<_>>>()?;

        for binding in &bindings {
            if let NameCheck::Warning(msg) = check_target_name(&binding.name) {
                warn!("Target {}: {}", binding, msg);
            }
        }

        let (config, agents) = self.targets.set_configuration(bindings);
        Ok(ResponseData::TargetsApplied {
            generation: config.generation(),
            agents,
        })
    }

    fn list_agents(&self) -> Vec<AgentInfo> {
        self.workers
            .list_live_workers()
            .into_iter()
            .map(|link| AgentInfo {
                id: link.id(),
                name: link.name().to_string(),
                local: link.is_local_controller(),
                connected_at: link.connected_at(),
            })
            .collect()
    }

    fn status(&self) -> ControllerStatus {
        let generation =
            |b: &Arc<ConfigBroadcaster>| b.current_configuration().map_or(0, |c| c.generation());

        ControllerStatus {
            pid: std::process::id(),
            uptime: SystemTime::now()
                .duration_since(self.start_time)
                .unwrap_or_default(),
            agents: self.workers.remote_count(),
            targets_generation: generation(&self.targets),
            agent_logs_generation: generation(&self.agent_logs),
        }
    }

    /// Accept connections until `shutdown` resolves, then revert everything
    /// this process applied
    pub async fn serve<F>(self: Arc<Self>, mut server: IpcServer, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if !server.is_started() {
            server.start()?;
        }
        info!("Controller listening on {}", server.socket_path().display());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = server.accept() => match accepted {
                    Ok(conn) => {
                        let controller = Arc::clone(&self);
                        tokio::spawn(async move { controller.handle_connection(conn).await });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        info!("Controller shutting down");
        self.stopping.send_replace(true);
        let dropped = self.workers.disconnect_all();
        debug!("Dropped {} agent connection(s)", dropped);
        self.local.clear();
        server.stop()
    }

    /// Serve one connection: a single request, or a tail/agent session
    pub async fn handle_connection(self: Arc<Self>, mut conn: Connection) {
        let request = match conn.read_request().await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read request: {}", e);
                return;
            }
        };
        let Request { id, command } = request;

        if command.is_administrative() {
            if let Err(e) = auth::require_admin(conn.peer_uid(), &self.config.admin_uids) {
                warn!("Rejected {:?} from uid {:?}: {}", command, conn.peer_uid(), e);
                let _ = conn.write_response(&Response::error(id, e.to_string())).await;
                return;
            }
        }

        let result = match command {
            Command::TailLog(options) => self.run_tail(conn, id, options).await,
            Command::AgentHello(hello) => self.attach_agent(conn, id, hello).await,
            command => {
                let response = match self.handle_command(command) {
                    Ok(data) => Response::success(id, data),
                    Err(e) => Response::error(id, e.to_string()),
                };
                conn.write_response(&response).await
            }
        };

        if let Err(e) = result {
            warn!("Connection ended with error: {}", e);
        }
    }

    /// Stream records for the requested loggers until the client hangs up
    async fn run_tail(&self, mut conn: Connection, id: u64, options: TailOptions) -> Result<()> {
        let (sink, mut records) = ChannelSink::new();
        let sink = Arc::new(sink);
        let session = Level::parse(&options.level).and_then(|level| {
            let session_sink: Arc<dyn RecordSink> = sink.clone();
            TailSession::new(Arc::clone(&self.registry), options.names, level, session_sink)
        });
        let session = match session {
            Ok(session) => session,
            Err(e) => return conn.write_response(&Response::error(id, e.to_string())).await,
        };

        conn.write_response(&Response::success(
            id,
            ResponseData::TailStarted {
                names: session.names().to_vec(),
            },
        ))
        .await?;

        let stopping = self.stopping.subscribe();
        let (mut reader, mut writer) = conn.into_split();
        let mut forwarder = tokio::spawn(async move {
            while let Some(line) = records.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err()
                {
                    break;
                }
            }
        });
        let hangup = async move {
            let mut discard = String::new();
            while let Ok(read) = reader.read_line(&mut discard).await {
                if read == 0 {
                    break;
                }
                discard.clear();
            }
        };

        let state = session
            .run(async {
                tokio::select! {
                    _ = hangup => {}
                    _ = &mut forwarder => {}
                    _ = wait_until_stopping(stopping) => {}
                }
            })
            .await?;
        debug!("Tail request {} finished as {:?}", id, state);
        if sink.dropped() > 0 {
            warn!(
                "Tail request {} dropped {} record(s) the client was too slow to take",
                id,
                sink.dropped()
            );
        }
        Ok(())
    }

    /// Accept an agent into the live set; its connection becomes the
    /// worker's transport
    async fn attach_agent(&self, mut conn: Connection, id: u64, hello: AgentHello) -> Result<()> {
        let worker_id = self.workers.next_worker_id();
        conn.write_response(&Response::success(id, ResponseData::Welcome { worker_id }))
            .await?;
        info!(
            "Agent {} (pid {}) connected as worker {}",
            hello.name, hello.pid, worker_id
        );

        let (reader, writer) = conn.into_split();
        let (transport, responses) = SocketTransport::new(reader, writer);
        self.workers
            .connect(WorkerLink::spawn(worker_id, &hello.name, transport))?;

        // only read once registered, so a hang-up always finds the worker
        let workers = Arc::downgrade(&self.workers);
        responses.spawn(move || {
            if let Some(workers) = workers.upgrade() {
                workers.disconnect(worker_id);
            }
        });
        Ok(())
    }
}

async fn wait_until_stopping(mut stopping: watch::Receiver<bool>) {
    loop {
        let stop = *stopping.borrow_and_update();
        if stop || stopping.changed().await.is_err() {
            return;
        }
    }
}
