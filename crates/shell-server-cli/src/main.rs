use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use shelld_config::Settings;
use shelld_control::{client, ControlRequest};

#[derive(Parser, Debug)]
#[command(name = "shell-server", version, about = "Control client for the per-workspace shell daemon")]
struct Cli {
    /// Workspace directory the target daemon serves; defaults to the current directory.
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Branch namespace, overriding MCP_SHELL_SERVER_BRANCH / the "main" default.
    #[arg(long, global = true)]
    branch: Option<String>,

    /// Control-channel socket path override.
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report live execution/terminal/monitor counts.
    Status,
    /// Report daemon version, pid, and workspace metadata.
    Info,
    /// Attach to (creating if needed) the daemon's primary terminal session.
    Attach {
        #[arg(long)]
        session: Option<String>,
    },
    /// Detach from the primary terminal session without closing it.
    Detach,
    /// Reattach to a specific terminal session by id.
    Reattach {
        #[arg(long)]
        session: Option<String>,
    },
    /// Request a graceful daemon shutdown.
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let workspace_cwd = cli.cwd.unwrap_or(std::env::current_dir()?);
    let settings = Settings::load(workspace_cwd, cli.branch.as_deref(), cli.socket)?;

    let request = match cli.command {
        Commands::Status => ControlRequest::Status,
        Commands::Info => ControlRequest::Info,
        Commands::Attach { session } => ControlRequest::Attach { session_id: session },
        Commands::Detach => ControlRequest::Detach,
        Commands::Reattach { session } => ControlRequest::Reattach { session_id: session },
        Commands::Stop => ControlRequest::Stop,
    };

    let response = client::send(&settings.socket_path, request)
        .await
        .map_err(|e| anyhow::anyhow!("no daemon reachable at {}: {e}", settings.socket_path.display()))?;

    if !response.ok {
        bail!(response.error.unwrap_or_else(|| "daemon returned an error".to_string()));
    }

    match response.data {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("ok"),
    }
    Ok(())
}
