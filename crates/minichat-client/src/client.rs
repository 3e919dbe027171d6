//! Server connection and console bridge.
//!
//! This module provides the `ChatClient` which handles:
//! - Connection to the server with exponential backoff
//! - Translating the registration exchange into a friendly console prompt
//! - Relaying console lines to the server and server lines to the console
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use minichat_protocol::{
    parse_line, registration_line, ClientLine, NAME_EMPTY, NAME_TAKEN, REGISTRATION_PROMPT,
};

use crate::error::{ClientError, Result};

/// Shown in place of the server's registration prompt.
pub const USERNAME_PROMPT: &str = "Enter the username:";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the chat client.
///
/// # Example
///
/// ```rust
/// use minichat_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     server_addr: "chat.example.org:5555".to_string(),
///     retry_initial_delay: Duration::from_millis(200),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the server.
    pub server_addr: String,

    /// Connection attempts before giving up.
    pub connect_attempts: u32,

    /// Initial delay before first retry after connection failure.
    pub retry_initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub retry_multiplier: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:5555".to_string(),
            connect_attempts: 3,
            retry_initial_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(5),
            retry_multiplier: 2.0,
        }
    }
}

impl ClientConfig {
    /// Config for `host` and `port` with default retry behavior.
    pub fn for_server(host: &str, port: u16) -> Self {
        Self {
            server_addr: format!("{host}:{port}"),
            ..Default::default()
        }
    }
}

// ============================================================================
// Chat Client
// ============================================================================

/// Client for one chat session.
pub struct ChatClient {
    config: ClientConfig,

    /// Cancellation token for graceful shutdown.
    cancel_token: CancellationToken,
}

impl ChatClient {
    #[must_use]
    pub fn new(config: ClientConfig, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            cancel_token,
        }
    }

    /// Connects and bridges the server to `input`/`output` until the user
    /// says `Bye`, the console closes, or the server hangs up.
    pub async fn run<I, O>(&self, input: I, mut output: O) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let stream = self.connect_with_retry().await?;

        let peer = stream.peer_addr()?;
        info!(peer = %peer, "Connected to server");
        write_console(&mut output, &format!("Connection accepted {peer}\n")).await?;

        let (reader, writer) = stream.into_split();

        tokio::select! {
            result = chat(reader, writer, input, output) => result,
            _ = self.cancel_token.cancelled() => {
                info!("Client cancelled");
                Err(ClientError::Cancelled)
            }
        }
    }

    /// Attempts to connect, retrying with exponential backoff.
    async fn connect_with_retry(&self) -> Result<TcpStream> {
        let mut delay = self.config.retry_initial_delay;
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!(
                attempt,
                addr = %self.config.server_addr,
                "Attempting to connect to server"
            );

            match TcpStream::connect(&self.config.server_addr).await {
                Ok(stream) => {
                    debug!(attempt, "Connection successful");
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Connection attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt == attempts {
                break;
            }

            // Wait before retry, checking for cancellation
            tokio::select! {
                _ = sleep(delay) => {
                    let next_delay_ms = (delay.as_millis() as f64 * self.config.retry_multiplier) as u64;
                    delay = Duration::from_millis(next_delay_ms).min(self.config.retry_max_delay);
                }
                _ = self.cancel_token.cancelled() => {
                    info!("Connection retry cancelled");
                    return Err(ClientError::Cancelled);
                }
            }
        }

        Err(ClientError::Connection {
            addr: self.config.server_addr.clone(),
            reason: last_error,
        })
    }
}

// ============================================================================
// Console Bridge
// ============================================================================

/// How a server line is shown on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLine {
    /// The registration prompt; replaced by [`USERNAME_PROMPT`].
    Prompt,

    /// A rejected name; shown, followed by [`USERNAME_PROMPT`].
    Rejected,

    /// Anything else; shown verbatim.
    Display,
}

pub fn classify(line: &str) -> ServerLine {
    match line {
        REGISTRATION_PROMPT => ServerLine::Prompt,
        NAME_TAKEN | NAME_EMPTY => ServerLine::Rejected,
        _ => ServerLine::Display,
    }
}

/// Relays lines between a server connection and a console.
///
/// While no name has been sent, each console line is turned into a
/// registration line; a rejection puts the client back in that state.
/// Returns after sending `Bye`, at console EOF, or when the server closes.
pub async fn chat<R, W, I, O>(
    server_reader: R,
    mut server_writer: W,
    input: I,
    mut output: O,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut server_lines = BufReader::new(server_reader).lines();
    let mut console_lines = input.lines();
    let mut awaiting_name = true;
    let mut prompted = false;

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Server closed the connection");
                    return Ok(());
                };

                match classify(&line) {
                    ServerLine::Prompt => {
                        // Later prompts only repeat what the user has already seen
                        if !prompted {
                            write_console(&mut output, USERNAME_PROMPT).await?;
                            prompted = true;
                        }
                    }
                    ServerLine::Rejected => {
                        awaiting_name = true;
                        write_console(&mut output, &line).await?;
                        write_console(&mut output, USERNAME_PROMPT).await?;
                    }
                    ServerLine::Display => write_console(&mut output, &line).await?,
                }
            }

            line = console_lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Console closed");
                    server_writer.shutdown().await?;
                    return Ok(());
                };

                let outgoing = if awaiting_name {
                    awaiting_name = false;
                    outgoing_registration(&line)
                } else {
                    line
                };

                server_writer.write_all(outgoing.as_bytes()).await?;
                server_writer.write_all(b"\n").await?;
                server_writer.flush().await?;

                if !awaiting_name && parse_line(&outgoing) == ClientLine::Leave {
                    debug!("Sent Bye, leaving");
                    server_writer.shutdown().await?;
                    return Ok(());
                }
            }
        }
    }
}

/// The registration line for what the user typed at the name prompt.
fn outgoing_registration(typed: &str) -> String {
    match parse_line(typed) {
        ClientLine::Register { .. } => typed.to_string(),
        _ => registration_line(typed.trim()),
    }
}

async fn write_console<O>(output: &mut O, line: &str) -> Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
