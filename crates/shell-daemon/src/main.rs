use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use shell_daemon::daemon::Daemon;
use shelld_config::Settings;

#[derive(Parser, Debug)]
#[command(name = "shell-daemon", version, about = "Per-workspace shell execution daemon")]
struct Args {
    /// Workspace directory this daemon serves; defaults to the current directory.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Branch namespace, overriding MCP_SHELL_DAEMON_BRANCH / the "main" default.
    #[arg(long)]
    branch: Option<String>,

    /// Control-channel socket path override.
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let workspace_cwd = args.cwd.unwrap_or(std::env::current_dir()?);
    let settings = Settings::load(workspace_cwd, args.branch.as_deref(), args.socket)?;

    let daemon = Daemon::new(settings).await?;
    daemon.spawn_background_tasks();
    let http_addr = daemon.serve_http().await?;

    tracing::info!(
        socket = %daemon.settings.socket_path.display(),
        http = %http_addr,
        workspace = %daemon.settings.workspace_cwd.display(),
        branch = %daemon.settings.branch,
        "shell-daemon listening"
    );

    let ctrl_c_shutdown = daemon.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.cancel();
        }
    });

    daemon.serve_control().await
}
