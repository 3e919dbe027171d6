//! minichat - terminal client for the chat relay
//!
//! # Usage
//!
//! ```text
//! minichat                    # connect to 127.0.0.1:5555
//! minichat chat.example.org   # default port
//! minichat 10.0.0.5 6000
//! ```
//!
//! Type a name at the prompt, then chat. `AllUsers` lists who is online,
//! `Bye` leaves.

use std::process;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use minichat_client::{ChatClient, ClientConfig, ClientError};
use minichatd::config::DEFAULT_PORT;

/// minichat - chat from the terminal
#[derive(Parser, Debug)]
#[command(name = "minichat", version, about)]
struct Args {
    /// Server host
    #[arg(default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never interleave with the chat on stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("minichat_client=warn".parse()?),
        )
        .init();

    let cancel_token = CancellationToken::new();

    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Received Ctrl+C");
            ctrl_c_token.cancel();
        }
    });

    let config = ClientConfig::for_server(&args.host, args.port);
    let client = ChatClient::new(config, cancel_token);

    match client
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
    {
        Ok(()) | Err(ClientError::Cancelled) => {
            info!("Session ended");
            Ok(())
        }
        Err(e @ ClientError::Connection { .. }) => {
            eprintln!("Failed to connect to server: {e}");
            process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
