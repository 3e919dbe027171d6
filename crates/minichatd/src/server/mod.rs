//! TCP server for the chat relay.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns one connection task (plus its writer) per client
//! - Logs a console transcript of registry events
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!         ▲                        │
//!         │ SendHandle (queued)    │ broadcast
//!         └────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{
    run_writer, serve_connection, ConnectionError, ConnectionHandler, ConnectionState,
};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use minichat_core::ConnectionId;

use crate::config::ServerConfig;
use crate::registry::{RegistryEvent, RegistryHandle};

/// TCP server for the chat relay.
///
/// Owns the listening socket and the set of running connection tasks.
pub struct ChatServer {
    listener: TcpListener,

    config: ServerConfig,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating connection IDs
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds the listening socket.
    ///
    /// Use port 0 in `config.bind_addr` to let the OS pick a free port, then
    /// read it back with [`ChatServer::local_addr`].
    pub async fn bind(
        config: ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.bind_addr,
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            config,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(1),
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// closes every session and waits for connection tasks to finish.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Chat server listening");

        self.spawn_event_logger();

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            self.handle_connection(stream, peer, &mut connections);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        self.shutdown(connections).await;
        Ok(())
    }

    /// Spawns the tasks serving one accepted connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        connections: &mut JoinSet<()>,
    ) {
        let connection = ConnectionId::new(self.connection_counter.fetch_add(1, Ordering::Relaxed));

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection = %connection, error = %e, "Failed to set TCP_NODELAY");
        }

        info!(connection = %connection, peer = %peer, "Connection accepted");

        let (reader, writer) = stream.into_split();
        connections.spawn(serve_connection(
            reader,
            writer,
            self.registry.clone(),
            connection,
            self.config.clone(),
            self.cancel_token.child_token(),
        ));
    }

    /// Spawns the task that logs registry events as a console transcript.
    fn spawn_event_logger(&self) {
        let mut event_rx = self.registry.subscribe();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event logger shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => log_event(&event),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event logger lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Closes every session, then waits up to the grace period for the
    /// connection tasks to flush and exit.
    async fn shutdown(&self, mut connections: JoinSet<()>) {
        match self.registry.shutdown_all().await {
            Ok(closed) => info!(sessions = closed, "Closed all sessions"),
            Err(e) => warn!(error = %e, "Failed to close sessions"),
        }

        let drained = timeout(self.config.shutdown_grace, async {
            while let Some(joined) = connections.join_next().await {
                if let Err(e) = joined {
                    debug!(error = %e, "Connection task failed during shutdown");
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                remaining = connections.len(),
                "Connections still open after grace period, aborting"
            );
            connections.abort_all();
        }

        info!("Server cleanup complete");
    }
}

/// Writes one registry event to the log.
fn log_event(event: &RegistryEvent) {
    match event {
        RegistryEvent::Joined { name, connection } => {
            info!(name = %name, connection = %connection, "Joined");
        }
        RegistryEvent::Removed { name, reason } => {
            info!(name = %name, reason = %reason, "Left");
        }
        RegistryEvent::Broadcast { line, recipients } => {
            info!(recipients = recipients, "{line}");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("I/O error: {0}")]
    Io(String),
}
