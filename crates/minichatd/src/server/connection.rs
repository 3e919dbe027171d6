//! Connection handler for individual chat clients.
//!
//! Each accepted connection gets two tasks:
//! - a `ConnectionHandler` that reads lines, drives the registration state
//!   machine, and forwards chat lines into the registry
//! - a writer task that drains the connection's outbound queue onto the
//!   socket, so no registry broadcast ever waits on a peer
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::ops::ControlFlow;
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use minichat_core::{ConnectionId, DisplayName, DomainError};
use minichat_protocol::{
    error_reply, goodbye_text, parse_line, welcome_text, ClientLine, REGISTRATION_PROMPT,
};

use crate::config::ServerConfig;
use crate::registry::{DeliveryError, RegistryError, RegistryHandle, SendHandle};

/// Where a connection is in its lifecycle.
///
/// Transitions only move forward; a failed registration stays `Unregistered`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unregistered,
    Registered(DisplayName),
    Closed,
}

/// Serves one client until it leaves, fails, or is closed by the server.
///
/// Spawns the writer task, runs the handler, then waits for queued output
/// to be flushed.
pub async fn serve_connection<R, W>(
    reader: R,
    writer: W,
    registry: RegistryHandle,
    connection: ConnectionId,
    config: ServerConfig,
    closer: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, lines) = SendHandle::channel(config.outbound_capacity, closer.clone());

    let writer_task = tokio::spawn(run_writer(
        writer,
        lines,
        closer,
        config.write_timeout,
        connection,
    ));

    ConnectionHandler::new(
        reader,
        outbound,
        registry,
        connection,
        config.max_line_length,
    )
    .run()
    .await;

    if let Err(e) = writer_task.await {
        warn!(connection = %connection, error = %e, "Writer task failed");
    }
}

// ============================================================================
// Connection Handler
// ============================================================================

/// Per-connection registration and chat state machine.
pub struct ConnectionHandler<R> {
    /// Buffered reader for incoming lines
    reader: BufReader<R>,

    /// This connection's own outbound queue
    outbound: SendHandle,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Identity used to deregister only our own session
    connection: ConnectionId,

    state: ConnectionState,

    /// Longest accepted line in bytes, excluding the terminator
    max_line_length: usize,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        reader: R,
        outbound: SendHandle,
        registry: RegistryHandle,
        connection: ConnectionId,
        max_line_length: usize,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            outbound,
            registry,
            connection,
            state: ConnectionState::Unregistered,
            max_line_length,
        }
    }

    /// Runs the connection handler.
    ///
    /// Sends the registration prompt, processes lines until the connection
    /// ends, then closes the session exactly once.
    pub async fn run(mut self) {
        debug!(connection = %self.connection, "Client connected");

        let result = match self.reply(REGISTRATION_PROMPT).await {
            Ok(()) => self.process_lines().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            debug!(connection = %self.connection, error = %e, "Connection ended");
        }

        self.close().await;
    }

    /// Main line processing loop.
    ///
    /// Returns `Ok(())` on a clean end: `Bye`, EOF, or the server closing
    /// this connection.
    async fn process_lines(&mut self) -> Result<(), ConnectionError> {
        let closer = self.outbound.closer().clone();

        loop {
            let line = tokio::select! {
                biased;

                _ = closer.cancelled() => {
                    debug!(connection = %self.connection, "Connection closed by server");
                    return Ok(());
                }

                result = read_line(&mut self.reader, self.max_line_length) => result?,
            };

            let Some(line) = line else {
                debug!(connection = %self.connection, "Client sent EOF");
                return Ok(());
            };

            if self.handle_line(&line).await?.is_break() {
                return Ok(());
            }
        }
    }

    /// Applies one line to the state machine.
    async fn handle_line(&mut self, line: &str) -> Result<ControlFlow<()>, ConnectionError> {
        let parsed = parse_line(line);

        match self.state.clone() {
            ConnectionState::Unregistered => self.handle_unregistered(parsed).await,
            ConnectionState::Registered(name) => self.handle_registered(name, parsed).await,
            ConnectionState::Closed => Ok(ControlFlow::Break(())),
        }
    }

    async fn handle_unregistered(
        &mut self,
        line: ClientLine<'_>,
    ) -> Result<ControlFlow<()>, ConnectionError> {
        match line {
            ClientLine::Blank => {}
            ClientLine::Register { name, .. } => self.try_register(name).await?,
            ClientLine::Leave | ClientLine::ListUsers | ClientLine::Text(_) => {
                self.reply(REGISTRATION_PROMPT).await?;
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn handle_registered(
        &mut self,
        name: DisplayName,
        line: ClientLine<'_>,
    ) -> Result<ControlFlow<()>, ConnectionError> {
        match line {
            ClientLine::Blank => {}
            ClientLine::Leave => {
                debug!(name = %name, "Client said Bye");
                return Ok(ControlFlow::Break(()));
            }
            ClientLine::ListUsers => {
                let roster = self.registry.list_users(name).await?;
                self.reply(roster).await?;
            }
            // An empty name carries nothing to re-register with; relay as typed
            ClientLine::Register { name: rest, line: raw } => {
                let text = if rest.is_empty() { raw } else { rest };
                self.registry
                    .broadcast_from(name, self.connection, text)
                    .await?;
            }
            ClientLine::Text(text) => {
                self.registry
                    .broadcast_from(name, self.connection, text)
                    .await?;
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Attempts to claim `raw` as this connection's display name.
    async fn try_register(&mut self, raw: &str) -> Result<(), ConnectionError> {
        let name = match DisplayName::parse(raw) {
            Ok(name) => name,
            Err(e) => {
                debug!(connection = %self.connection, error = %e, "Rejected registration");
                return self.reply(error_reply(&e)).await;
            }
        };

        let claimed = self
            .registry
            .register(
                name.clone(),
                self.outbound.clone(),
                Local::now(),
                self.connection,
            )
            .await?;

        if !claimed {
            let e = DomainError::NameTaken { name };
            debug!(connection = %self.connection, error = %e, "Rejected registration");
            return self.reply(error_reply(&e)).await;
        }

        info!(connection = %self.connection, name = %name, "Client registered");

        self.state = ConnectionState::Registered(name.clone());
        self.registry
            .broadcast_server_message(welcome_text(name.as_str()))
            .await?;
        Ok(())
    }

    /// Queues a line for this connection only.
    async fn reply(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        self.outbound.send(text.into()).await?;
        Ok(())
    }

    /// Enters `Closed`: deregisters, announces the departure, and releases
    /// the transport.
    async fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);

        if let ConnectionState::Registered(name) = previous {
            if let Err(e) = self.registry.deregister(name.clone(), self.connection).await {
                warn!(name = %name, error = %e, "Failed to deregister session");
            }

            if let Err(e) = self
                .registry
                .broadcast_server_message(goodbye_text(name.as_str()))
                .await
            {
                warn!(name = %name, error = %e, "Failed to announce departure");
            }

            info!(connection = %self.connection, name = %name, "Client left");
        } else {
            debug!(connection = %self.connection, "Unregistered client disconnected");
        }

        self.outbound.close();
    }
}

/// Reads one line of at most `max` bytes, excluding the terminator.
///
/// Returns `Ok(None)` at EOF. Invalid UTF-8 is replaced rather than
/// rejected.
async fn read_line<R>(reader: &mut BufReader<R>, max: usize) -> Result<Option<String>, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = (max as u64).saturating_add(1);

    let bytes_read = (&mut *reader)
        .take(limit)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|e| ConnectionError::Io(e.to_string()))?;

    if bytes_read == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') && buf.len() > max {
        return Err(ConnectionError::LineTooLong { max });
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

// ============================================================================
// Writer
// ============================================================================

/// Drains `lines` onto `writer` until the connection is closed.
///
/// On close, lines already queued are still written before the write side
/// is shut down. A failed or timed-out write cancels `closer`, which makes
/// the registry reap this session on its next broadcast.
pub async fn run_writer<W>(
    writer: W,
    mut lines: mpsc::Receiver<String>,
    closer: CancellationToken,
    write_timeout: Duration,
    connection: ConnectionId,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);

    loop {
        let line = tokio::select! {
            biased;

            _ = closer.cancelled() => break,

            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        if let Err(e) = write_line(&mut writer, &line, write_timeout).await {
            warn!(connection = %connection, error = %e, "Write failed, closing connection");
            closer.cancel();
            return;
        }
    }

    // Flush whatever was queued before the close
    lines.close();
    while let Ok(line) = lines.try_recv() {
        if let Err(e) = write_line(&mut writer, &line, write_timeout).await {
            debug!(connection = %connection, error = %e, "Dropped queued lines on close");
            break;
        }
    }

    match timeout(write_timeout, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(connection = %connection, error = %e, "Shutdown failed"),
        Err(_) => debug!(connection = %connection, "Shutdown timed out"),
    }

    debug!(connection = %connection, "Writer finished");
}

async fn write_line<W>(
    writer: &mut BufWriter<W>,
    line: &str,
    write_timeout: Duration,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    };

    match timeout(write_timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that end a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}
