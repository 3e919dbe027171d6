//! minichat daemon - session registry and broadcast relay
//!
//! This binary runs the chat server, accepting TCP connections and relaying
//! lines between registered participants.
//!
//! # Usage
//!
//! ```bash
//! # Start the server (foreground)
//! minichatd start
//!
//! # Start the server (background/daemonized)
//! minichatd start -d
//!
//! # Listen somewhere else
//! minichatd start --bind 127.0.0.1 --port 6000
//! MINICHAT_ADDR=127.0.0.1:6000 minichatd start
//!
//! # Stop the server
//! minichatd stop
//!
//! # Check server status
//! minichatd status
//!
//! # Enable debug logging
//! RUST_LOG=minichatd=debug minichatd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown (every connection is closed)

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use minichatd::config::ServerConfig;
use minichatd::daemon::{self, PidFile};
use minichatd::registry::spawn_registry;
use minichatd::server::ChatServer;

/// minichat daemon - line-oriented TCP chat relay
#[derive(Parser, Debug)]
#[command(name = "minichatd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server
    Start(StartArgs),
    /// Stop the running server
    Stop,
    /// Show server status
    Status,
}

#[derive(clap::Args, Debug, Default)]
struct StartArgs {
    /// Run as a background daemon (fork to background)
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Address to listen on (`IP` or `IP:PORT`)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (default: <config_dir>/minichat/minichatd.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Default to 'start' if no subcommand given
    let command = args
        .command
        .unwrap_or_else(|| Command::Start(StartArgs::default()));

    let pid_file = PidFile::default_location();

    match command {
        Command::Start(start) => {
            // Check if already running
            if let Some(pid) = pid_file.running_pid() {
                eprintln!("Server is already running (PID {pid})");
                eprintln!("Use 'minichatd stop' to stop it first.");
                process::exit(1);
            }

            // Resolve config before forking so errors reach the terminal
            let config = resolve_config(&start)?;

            if start.daemon {
                // Daemonize before starting tokio runtime
                daemon::daemonize(&daemon::log_file_path())?;
            }

            pid_file.write_current()?;

            let result = run_server(config);

            // Clean up PID file on exit
            pid_file.remove();

            result
        }
        Command::Stop => {
            if let Some(pid) = pid_file.running_pid() {
                println!("Stopping server (PID {pid})...");
                daemon::send_terminate(pid)?;

                if daemon::wait_for_exit(pid, Duration::from_secs(5)) {
                    println!("Server stopped.");
                    return Ok(());
                }

                eprintln!("Server did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Server is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = pid_file.running_pid() {
                println!("Server is running (PID {pid})");
                println!("PID file: {}", pid_file.path().display());
                Ok(())
            } else {
                println!("Server is not running.");
                process::exit(1);
            }
        }
    }
}

/// Layers defaults, config file, environment and CLI flags.
fn resolve_config(start: &StartArgs) -> Result<ServerConfig> {
    let mut config = ServerConfig::load_or_default(start.config.as_deref())
        .context("Failed to load configuration")?;

    config
        .apply_env()
        .context("Invalid MINICHAT_ADDR")?;

    if let Some(bind) = &start.bind {
        config
            .apply_addr_override(bind)
            .context("Invalid --bind")?;
    }
    if let Some(port) = start.port {
        config.set_port(port);
    }

    Ok(config)
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("minichatd=info".parse()?)
                .add_directive("minichat_core=info".parse()?)
                .add_directive("minichat_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "minichat server starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    info!("Session registry started");

    let server = ChatServer::bind(config, registry, cancel_token)
        .await
        .context("Failed to start server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("minichat server stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
