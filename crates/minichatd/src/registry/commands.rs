//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for subscribers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use minichat_core::{ConnectionId, DisplayName};
use minichat_protocol::Roster;
use thiserror::Error;
use tokio::sync::oneshot;

use super::session::Session;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Queries and membership changes carry a oneshot channel for the response;
/// broadcasts are fire-and-forget. Commands from one sender are processed in
/// the order they were sent.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Claim `name` for a session.
    ///
    /// Responds `false` without mutating anything if the name is held.
    Register {
        name: DisplayName,
        session: Session,
        respond_to: oneshot::Sender<bool>,
    },

    /// Remove whatever session holds `name` and close its handle.
    ///
    /// Responds `false` if the name was not registered.
    Remove {
        name: DisplayName,
        respond_to: oneshot::Sender<bool>,
    },

    /// Remove `name` only if it is held by `connection`.
    Deregister {
        name: DisplayName,
        connection: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Deliver `<HH:MM:SS> Server: <text>` to every session.
    BroadcastServerMessage { text: String },

    /// Deliver `<HH:MM:SS> <name>: <text>` to every session, sender included.
    ///
    /// Dropped unless `connection` still holds `name`.
    BroadcastFrom {
        name: DisplayName,
        connection: ConnectionId,
        text: String,
    },

    /// Build the roster for `requester`.
    ListUsers {
        requester: DisplayName,
        respond_to: oneshot::Sender<Roster>,
    },

    /// Number of registered sessions.
    SessionCount { respond_to: oneshot::Sender<usize> },

    /// Whether `name` is currently registered.
    IsRegistered {
        name: DisplayName,
        respond_to: oneshot::Sender<bool>,
    },

    /// Close every session's handle and clear the registry.
    ///
    /// Responds with the number of sessions closed.
    ShutdownAll { respond_to: oneshot::Sender<usize> },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Ordinary conditions (duplicate or absent names) are not errors; the only
/// failure is losing the actor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The command or response channel was closed.
    ///
    /// This typically indicates the actor was shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A name was claimed.
    Joined {
        name: DisplayName,
        connection: ConnectionId,
    },

    /// A session left the registry.
    Removed {
        name: DisplayName,
        reason: RemovalReason,
    },

    /// A line was fanned out.
    Broadcast { line: String, recipients: usize },
}

/// Reason why a session was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Removed by name through `remove`.
    Explicit,

    /// The owning connection closed (Bye, EOF or I/O error).
    Departed,

    /// A broadcast could not be delivered; the session was reaped.
    DeliveryFailed,

    /// Server shutdown.
    Shutdown,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicitly removed"),
            Self::Departed => write!(f, "connection closed"),
            Self::DeliveryFailed => write!(f, "delivery failed"),
            Self::Shutdown => write!(f, "server shutdown"),
        }
    }
}
