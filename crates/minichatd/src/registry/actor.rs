//! Registry actor - owns the name → session map and processes commands.
//!
//! The RegistryActor is the single owner of session state in the server.
//! It receives commands via an mpsc channel and publishes events via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::HashMap;

use chrono::Local;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use minichat_core::{ConnectionId, DisplayName, SessionInfo};
use minichat_protocol::{chat_line, server_line, Roster};

use super::commands::{RegistryCommand, RegistryEvent, RemovalReason};
use super::session::{DeliveryError, Session};

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all session state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially, so
/// the check-then-insert in `register` is atomic and every broadcast walks a
/// map that cannot change underneath it. Delivery is a non-blocking enqueue
/// on each recipient's bounded queue; no peer I/O happens on this task.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Active sessions keyed by display name
    sessions: HashMap<DisplayName, Session>,

    /// Event publisher for the console transcript and tests
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                name,
                session,
                respond_to,
            } => {
                let result = self.handle_register(name, session);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove { name, respond_to } => {
                let result = self.handle_remove(&name, RemovalReason::Explicit);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Deregister {
                name,
                connection,
                respond_to,
            } => {
                let result = self.handle_deregister(&name, connection);
                let _ = respond_to.send(result);
            }
            RegistryCommand::BroadcastServerMessage { text } => {
                self.handle_broadcast(server_line(&Local::now(), &text));
            }
            RegistryCommand::BroadcastFrom {
                name,
                connection,
                text,
            } => {
                self.handle_broadcast_from(&name, connection, &text);
            }
            RegistryCommand::ListUsers {
                requester,
                respond_to,
            } => {
                let result = self.handle_list_users(&requester);
                let _ = respond_to.send(result);
            }
            RegistryCommand::SessionCount { respond_to } => {
                let _ = respond_to.send(self.sessions.len());
            }
            RegistryCommand::IsRegistered { name, respond_to } => {
                let _ = respond_to.send(self.sessions.contains_key(&name));
            }
            RegistryCommand::ShutdownAll { respond_to } => {
                let result = self.handle_shutdown_all();
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles a name claim.
    fn handle_register(&mut self, name: DisplayName, session: Session) -> bool {
        if self.sessions.contains_key(&name) {
            debug!(
                name = %name,
                connection = %session.connection,
                "Name already registered, rejecting"
            );
            return false;
        }

        let connection = session.connection;
        self.sessions.insert(name.clone(), session);

        info!(
            name = %name,
            connection = %connection,
            total_sessions = self.sessions.len(),
            "Session registered"
        );

        // Publish event (ignore if no subscribers)
        let _ = self
            .event_publisher
            .send(RegistryEvent::Joined { name, connection });

        true
    }

    /// Handles removing a session by name. Absent names are a no-op.
    ///
    /// The removed session's handle is closed, so its connection stops
    /// speaking under the name and says goodbye on its way out.
    fn handle_remove(&mut self, name: &DisplayName, reason: RemovalReason) -> bool {
        let Some(session) = self.sessions.remove(name) else {
            debug!(name = %name, "Remove for unregistered name, ignoring");
            return false;
        };
        session.handle.close();

        info!(
            name = %name,
            reason = %reason,
            total_sessions = self.sessions.len(),
            "Session removed"
        );

        let _ = self.event_publisher.send(RegistryEvent::Removed {
            name: name.clone(),
            reason,
        });

        true
    }

    /// Handles a connection removing its own session.
    ///
    /// If the name was reaped and claimed again by another connection, the
    /// newer session is left alone.
    fn handle_deregister(&mut self, name: &DisplayName, connection: ConnectionId) -> bool {
        match self.sessions.get(name) {
            Some(session) if session.connection == connection => {
                self.handle_remove(name, RemovalReason::Departed)
            }
            Some(session) => {
                debug!(
                    name = %name,
                    owner = %session.connection,
                    requester = %connection,
                    "Deregister from non-owning connection, ignoring"
                );
                false
            }
            None => false,
        }
    }

    /// Fans out a chat line, provided `connection` still holds `name`.
    fn handle_broadcast_from(
        &mut self,
        name: &DisplayName,
        connection: ConnectionId,
        text: &str,
    ) {
        match self.sessions.get(name) {
            Some(session) if session.connection == connection => {}
            _ => {
                debug!(
                    name = %name,
                    connection = %connection,
                    "Chat line from connection not holding the name, dropping"
                );
                return;
            }
        }

        self.handle_broadcast(chat_line(&Local::now(), name.as_str(), text));
    }

    /// Fans `line` out to every registered session.
    ///
    /// A session whose handle is closed, or whose queue is full, is marked
    /// during the walk; marked sessions are removed afterwards and their
    /// handles closed so the owning connection shuts down and announces the
    /// departure itself.
    fn handle_broadcast(&mut self, line: String) {
        let mut failed: Vec<(DisplayName, DeliveryError)> = Vec::new();
        let mut delivered = 0usize;

        for (name, session) in &self.sessions {
            match session.handle.deliver(line.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(name = %name, error = %e, "Delivery failed");
                    failed.push((name.clone(), e));
                }
            }
        }

        for (name, error) in failed {
            if let Some(session) = self.sessions.remove(&name) {
                session.handle.close();

                warn!(
                    name = %name,
                    connection = %session.connection,
                    error = %error,
                    reason = %RemovalReason::DeliveryFailed,
                    "Session reaped"
                );

                let _ = self.event_publisher.send(RegistryEvent::Removed {
                    name,
                    reason: RemovalReason::DeliveryFailed,
                });
            }
        }

        debug!(recipients = delivered, "Broadcast delivered");

        let _ = self.event_publisher.send(RegistryEvent::Broadcast {
            line,
            recipients: delivered,
        });
    }

    /// Builds the roster for one requester.
    fn handle_list_users(&self, requester: &DisplayName) -> Roster {
        let entries = self
            .sessions
            .iter()
            .map(|(name, session)| SessionInfo::new(name.clone(), session.joined_at))
            .collect();

        let roster = Roster::new(Local::now(), entries);
        debug!(requester = %requester, users = roster.len(), "Listing users");
        roster
    }

    /// Closes every handle and clears the map.
    fn handle_shutdown_all(&mut self) -> usize {
        let count = self.sessions.len();

        for (name, session) in self.sessions.drain() {
            session.handle.close();
            let _ = self.event_publisher.send(RegistryEvent::Removed {
                name,
                reason: RemovalReason::Shutdown,
            });
        }

        info!(closed = count, "All sessions closed");
        count
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of sessions currently registered.
    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
