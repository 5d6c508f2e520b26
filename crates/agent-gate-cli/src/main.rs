// crates/agent-gate-cli/src/main.rs
// ============================================================================
// Module: Agent Gate CLI Entry Point
// Description: Command dispatcher for the agent-gate proxy server.
// Purpose: Load policy, bootstrap state, and run the HTTP surface.
// Dependencies: agent-gate-config, agent-gate-server, clap, tokio
// ============================================================================

//! ## Overview
//! The CLI loads the policy configuration, resolves the persistent data
//! layout (honoring the `SECURE_WRAPPER_*` overrides), and runs the proxy
//! until shutdown. Configuration generation is a separate one-shot setup
//! utility; this binary refuses to start without a valid config on disk.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use agent_gate_config::DataPaths;
use agent_gate_config::GateConfig;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "agent-gate", version, about = "Local security proxy for agent Gmail/Calendar access")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proxy server.
    Serve(ServeCommand),
}

/// `serve` command arguments.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Data directory holding config and persistent state.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Config file path; overrides the data-directory layout.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Bind address override, `host:port`.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI errors.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration loading or validation failures.
    #[error("{0}")]
    Config(#[from] agent_gate_config::ConfigError),
    /// Server lifecycle failures.
    #[error("{0}")]
    Server(#[from] agent_gate_server::ServerError),
    /// Argument shape failures.
    #[error("invalid argument: {0}")]
    Argument(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(command) => serve(command).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the proxy server until shutdown.
async fn serve(command: ServeCommand) -> Result<(), CliError> {
    let data_dir = command.data_dir.unwrap_or_else(default_data_dir);
    let mut paths = DataPaths::resolve(&data_dir);
    if let Some(config_path) = command.config {
        paths.config = config_path;
    }
    let mut config = GateConfig::load(&paths.config)?;
    if let Some(bind) = command.bind {
        apply_bind_override(&mut config, &bind)?;
    }
    agent_gate_server::serve(config, &paths).await?;
    Ok(())
}

/// Default data directory: `~/.agent-gate`, falling back to the cwd.
fn default_data_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .map_or_else(|| PathBuf::from(".agent-gate"), |home| home.join(".agent-gate"))
}

/// Applies a `host:port` bind override to the loaded configuration.
fn apply_bind_override(config: &mut GateConfig, bind: &str) -> Result<(), CliError> {
    let (host, port) = bind
        .rsplit_once(':')
        .ok_or_else(|| CliError::Argument(format!("bind must be host:port, got {bind}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| CliError::Argument(format!("invalid bind port in {bind}")))?;
    config.server.host = host.to_string();
    config.server.port = port;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
