//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to registry events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, mpsc, oneshot};

use minichat_core::{ConnectionId, DisplayName};
use minichat_protocol::Roster;

use super::commands::{RegistryCommand, RegistryError, RegistryEvent};
use super::session::{SendHandle, Session};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let registry = spawn_registry();
///
/// // Claim a name for a connection
/// let claimed = registry.register(name, handle, Local::now(), connection).await?;
///
/// // Fan out a line
/// registry.broadcast_from(name, connection, "Hi").await?;
///
/// // Subscribe to events
/// let mut rx = registry.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    /// * `event_sender` - The broadcast sender for subscribing to events
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Send a command and wait for its reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Claim `name` for the connection behind `handle`.
    ///
    /// Returns `Ok(true)` if the name was free and is now held, `Ok(false)` if
    /// another session holds it. Two concurrent claims for the same name
    /// never both succeed.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        name: DisplayName,
        handle: SendHandle,
        joined_at: DateTime<Local>,
        connection: ConnectionId,
    ) -> Result<bool, RegistryError> {
        let session = Session::new(handle, joined_at, connection);
        self.request(|respond_to| RegistryCommand::Register {
            name,
            session,
            respond_to,
        })
        .await
    }

    /// Remove whatever session holds `name`.
    ///
    /// Removing an absent name is a no-op and returns `Ok(false)`. The
    /// removed session's handle is closed, which ends its connection.
    pub async fn remove(&self, name: DisplayName) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::Remove { name, respond_to })
            .await
    }

    /// Remove `name` only if `connection` still holds it.
    pub async fn deregister(
        &self,
        name: DisplayName,
        connection: ConnectionId,
    ) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::Deregister {
            name,
            connection,
            respond_to,
        })
        .await
    }

    /// Deliver `<HH:MM:SS> Server: <text>` to every registered session.
    pub async fn broadcast_server_message(
        &self,
        text: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::BroadcastServerMessage { text: text.into() })
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Deliver `<HH:MM:SS> <name>: <text>` to every registered session,
    /// the sender included.
    ///
    /// The line is dropped if `connection` no longer holds `name`.
    pub async fn broadcast_from(
        &self,
        name: DisplayName,
        connection: ConnectionId,
        text: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::BroadcastFrom {
                name,
                connection,
                text: text.into(),
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Snapshot of the current sessions, sorted by name.
    pub async fn roster(&self, requester: DisplayName) -> Result<Roster, RegistryError> {
        self.request(|respond_to| RegistryCommand::ListUsers {
            requester,
            respond_to,
        })
        .await
    }

    /// The rendered roster text, delivered only to `requester`.
    pub async fn list_users(&self, requester: DisplayName) -> Result<String, RegistryError> {
        Ok(self.roster(requester).await?.to_string())
    }

    /// Number of registered sessions.
    ///
    /// Returns 0 if the actor is gone.
    pub async fn session_count(&self) -> usize {
        self.request(|respond_to| RegistryCommand::SessionCount { respond_to })
            .await
            .unwrap_or(0)
    }

    /// Whether `name` is currently registered.
    ///
    /// Returns false if the actor is gone.
    pub async fn is_registered(&self, name: DisplayName) -> bool {
        self.request(|respond_to| RegistryCommand::IsRegistered { name, respond_to })
            .await
            .unwrap_or(false)
    }

    /// Close every session's transport and clear the registry.
    ///
    /// Returns the number of sessions closed.
    pub async fn shutdown_all(&self) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::ShutdownAll { respond_to })
            .await
    }

    /// Subscribe to registry events.
    ///
    /// Returns a broadcast receiver that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        let handle = RegistryHandle::new(cmd_tx, event_tx);
        (handle, cmd_rx)
    }

    fn create_send_handle() -> SendHandle {
        SendHandle::channel(4, CancellationToken::new()).0
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
        // Compiles = test passes
    }

    #[tokio::test]
    async fn test_register_sends_command() {
        let (handle, mut rx) = create_test_handle();

        // Spawn task to handle the command
        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Register {
                name,
                session,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(name.as_str(), "UNO");
                assert_eq!(session.connection, ConnectionId::new(7));
                let _ = respond_to.send(true);
                return true;
            }
            false
        });

        let result = handle
            .register(
                DisplayName::new("UNO"),
                create_send_handle(),
                Local::now(),
                ConnectionId::new(7),
            )
            .await;
        assert_eq!(result, Ok(true));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_register_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx); // Close the channel

        let result = handle
            .register(
                DisplayName::new("UNO"),
                create_send_handle(),
                Local::now(),
                ConnectionId::new(1),
            )
            .await;

        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_broadcast_is_fire_and_forget() {
        let (handle, mut rx) = create_test_handle();

        handle
            .broadcast_from(DisplayName::new("CS"), ConnectionId::new(3), "Hi")
            .await
            .unwrap();

        match rx.recv().await {
            Some(RegistryCommand::BroadcastFrom {
                name,
                connection,
                text,
            }) => {
                assert_eq!(name.as_str(), "CS");
                assert_eq!(connection, ConnectionId::new(3));
                assert_eq!(text, "Hi");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.broadcast_server_message("Welcome UNO").await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_session_count_returns_zero_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert_eq!(handle.session_count().await, 0);
        assert!(!handle.is_registered(DisplayName::new("UNO")).await);
    }

    #[tokio::test]
    async fn test_dropped_responder_is_channel_closed() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop without answering
            let _ = rx.recv().await;
        });

        let result = handle.remove(DisplayName::new("UNO")).await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_subscribe_returns_receiver() {
        let (handle, _rx) = create_test_handle();
        let _subscriber = handle.subscribe();
        // Compiles = test passes
    }
}
