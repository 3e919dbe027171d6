//! Send-handles and the per-session record the registry stores.
//!
//! A `SendHandle` is the registry's only way to reach a connection: a bounded
//! queue of outbound lines drained by the connection's writer task, plus the
//! connection's cancellation token. Broadcast delivery never waits on the
//! queue; a full queue is reported as `DeliveryError::Backlogged`.

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use minichat_core::ConnectionId;

/// Why a line could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The connection's transport is closed or closing.
    #[error("connection closed")]
    Closed,

    /// The outbound queue is full; the peer is not keeping up.
    #[error("outbound queue full")]
    Backlogged,
}

/// Cloneable, thread-safe output channel to one connection.
#[derive(Debug, Clone)]
pub struct SendHandle {
    lines: mpsc::Sender<String>,
    closer: CancellationToken,
}

impl SendHandle {
    /// Creates a handle and the receiving end for the connection's writer.
    ///
    /// `capacity` is clamped to at least one line.
    pub fn channel(capacity: usize, closer: CancellationToken) -> (Self, mpsc::Receiver<String>) {
        let (lines, receiver) = mpsc::channel(capacity.max(1));
        (Self { lines, closer }, receiver)
    }

    /// Queues a line without waiting.
    pub fn deliver(&self, line: String) -> Result<(), DeliveryError> {
        if self.closer.is_cancelled() {
            return Err(DeliveryError::Closed);
        }

        self.lines.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backlogged,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queues a line, waiting for queue space.
    ///
    /// Used by a connection for its own replies, where back-pressure from its
    /// own peer is acceptable.
    pub async fn send(&self, line: String) -> Result<(), DeliveryError> {
        if self.closer.is_cancelled() {
            return Err(DeliveryError::Closed);
        }

        self.lines
            .send(line)
            .await
            .map_err(|_| DeliveryError::Closed)
    }

    /// Asks the connection to close its transport.
    ///
    /// Lines already queued are still flushed by the writer.
    pub fn close(&self) {
        self.closer.cancel();
    }

    /// True once the connection is closing or its writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled() || self.lines.is_closed()
    }

    /// The token cancelled when this connection should close.
    pub fn closer(&self) -> &CancellationToken {
        &self.closer
    }
}

/// A registered participant as stored in the registry.
#[derive(Debug, Clone)]
pub struct Session {
    pub handle: SendHandle,
    pub joined_at: DateTime<Local>,
    pub connection: ConnectionId,
}

impl Session {
    pub fn new(handle: SendHandle, joined_at: DateTime<Local>, connection: ConnectionId) -> Self {
        Self {
            handle,
            joined_at,
            connection,
        }
    }
}
