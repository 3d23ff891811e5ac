//! Wires the owned subsystems together and exposes the single `ControlHandler`
//! / `ExecutionPrep` seam each transport (control channel, HTTP) talks to.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use shelld_config::Settings;
use shelld_control::ControlHandler;
use shelld_core::history::JsonlHistorySink;
use shelld_core::ids::{ExecutionId, SubscriberId, TerminalId};
use shelld_core::types::{DaemonInfo, Dimensions, ShellType};
use shelld_http::{AppState, ExecutionPrep};
use shelld_monitor::MonitorRegistry;
use shelld_process::ProcessSupervisor;
use shelld_pty::TerminalManager;
use shelld_pubsub::{FileSinkSubscriber, InMemoryFileRegistry, PublisherFabric, ReplayBufferSubscriber};

const TERMINAL_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

pub struct Daemon {
    pub settings: Settings,
    pub fabric: Arc<PublisherFabric>,
    pub process: Arc<ProcessSupervisor>,
    pub terminals: Arc<TerminalManager>,
    pub monitors: Arc<MonitorRegistry>,
    pub file_registry: Arc<InMemoryFileRegistry>,
    pub replay: Arc<ReplayBufferSubscriber>,
    file_sink_id: SubscriberId,
    replay_id: SubscriberId,
    started_at: Instant,
    primary_terminal: RwLock<Option<TerminalId>>,
    shutdown: CancellationToken,
}

impl Daemon {
    pub async fn new(settings: Settings) -> anyhow::Result<Arc<Self>> {
        let fabric = PublisherFabric::new();

        let history_path = settings.output_dir.join("history.jsonl");
        let history = Arc::new(JsonlHistorySink::open(history_path)?);
        let process = ProcessSupervisor::with_collaborators(
            settings.workspace_cwd.clone(),
            fabric.clone(),
            history,
        );

        let terminals = TerminalManager::new(settings.workspace_cwd.clone());
        let monitors = MonitorRegistry::new();

        let file_registry = Arc::new(InMemoryFileRegistry::new());
        let file_sink = FileSinkSubscriber::new(settings.output_dir.clone(), file_registry.clone());
        let replay = ReplayBufferSubscriber::new();

        let file_sink_id = SubscriberId::generate();
        let replay_id = SubscriberId::generate();
        fabric.subscribe(file_sink_id.clone(), file_sink).await;
        fabric.subscribe(replay_id.clone(), replay.clone()).await;

        Ok(Arc::new(Self {
            settings,
            fabric,
            process,
            terminals,
            monitors,
            file_registry,
            replay,
            file_sink_id,
            replay_id,
            started_at: Instant::now(),
            primary_terminal: RwLock::new(None),
            shutdown: CancellationToken::new(),
        }))
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn http_state(self: &Arc<Self>) -> Arc<AppState> {
        Arc::new(AppState {
            process: self.process.clone(),
            prep: self.clone(),
            started_at: self.started_at,
            version: env!("CARGO_PKG_VERSION"),
        })
    }

    pub fn spawn_background_tasks(self: &Arc<Self>) {
        self.replay.spawn_sweeper();
        self.monitors.spawn_system_stats_sampler();

        let this = self.clone();
        spawn_supervised("terminal sweep loop", async move {
            let mut ticker = tokio::time::interval(TERMINAL_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                this.terminals.sweep_closed().await;
            }
        });
    }

    pub async fn serve_http(self: &Arc<Self>) -> anyhow::Result<SocketAddr> {
        let state = self.http_state();
        let router = shelld_http::build_router(state)
            .into_make_service_with_connect_info::<SocketAddr>();
        let addr: SocketAddr = (self.settings.executor_host, self.settings.executor_port).into();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        let shutdown = self.shutdown.clone();
        spawn_supervised("executor http server", async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "executor http server exited");
            }
        });
        Ok(bound)
    }

    pub async fn serve_control(self: &Arc<Self>) -> anyhow::Result<()> {
        let socket_path = self.settings.socket_path.clone();
        let handler: Arc<dyn ControlHandler> = self.clone();
        shelld_control::server::run(&socket_path, handler, self.shutdown.clone()).await
    }

    async fn ensure_primary_terminal(&self, requested: Option<String>) -> shelld_core::Result<TerminalId> {
        if let Some(id) = requested {
            let id = TerminalId::from_str_id(id);
            self.terminals.status(&id).await?;
            *self.primary_terminal.write().await = Some(id.clone());
            return Ok(id);
        }

        if let Some(existing) = self.primary_terminal.read().await.clone() {
            if self.terminals.status(&existing).await.is_ok() {
                return Ok(existing);
            }
        }

        let id = self
            .terminals
            .create(ShellType::Bash, None, Dimensions::default(), None)
            .await?;
        *self.primary_terminal.write().await = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl ExecutionPrep for Daemon {
    async fn prepare(&self, execution_id: &ExecutionId) {
        self.fabric.attach(execution_id.clone(), self.file_sink_id.clone()).await;
        self.fabric.attach(execution_id.clone(), self.replay_id.clone()).await;
    }
}

#[async_trait]
impl ControlHandler for Daemon {
    async fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "execution_count": self.process.execution_count(),
            "terminal_count": self.terminals.terminal_count(),
            "monitor_count": self.monitors.monitor_count(),
            "uptime_seconds": self.started_at.elapsed().as_secs(),
        })
    }

    async fn info(&self) -> serde_json::Value {
        let info = DaemonInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now() - chrono::Duration::seconds(self.started_at.elapsed().as_secs() as i64),
            pid: std::process::id(),
            workspace_cwd: self.settings.workspace_cwd.display().to_string(),
            branch: self.settings.branch.clone(),
            execution_count: self.process.execution_count(),
            terminal_count: self.terminals.terminal_count(),
            monitor_count: self.monitors.monitor_count(),
        };
        serde_json::to_value(info).unwrap_or(serde_json::Value::Null)
    }

    async fn attach(&self, session_id: Option<String>) -> Result<(), String> {
        self.ensure_primary_terminal(session_id)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn reattach(&self, session_id: Option<String>) -> Result<(), String> {
        self.ensure_primary_terminal(session_id)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn detach(&self) -> Result<(), String> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), String> {
        info!("stop requested over control channel");
        self.shutdown.cancel();
        Ok(())
    }
}

/// Spawns `fut` and logs (rather than silently drops) a panic in it, so a bug
/// in one background loop doesn't just vanish from the logs.
fn spawn_supervised<F>(name: &'static str, fut: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = tokio::spawn(fut).await {
            tracing::error!(task = name, error = %e, "background task panicked");
        }
    });
}
