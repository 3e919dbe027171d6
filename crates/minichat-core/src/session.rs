//! Session identity and presentation data.

use std::fmt;

use chrono::{DateTime, Local};

use crate::DisplayName;

/// Identifier the listener assigns to each accepted connection.
///
/// Distinguishes two connections that held the same display name at
/// different times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Read-only view of a registered participant.
///
/// `joined_at` is captured when registration succeeds and is only ever used
/// for presentation (the user roster), never for ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: DisplayName,
    pub joined_at: DateTime<Local>,
}

impl SessionInfo {
    pub fn new(name: DisplayName, joined_at: DateTime<Local>) -> Self {
        Self { name, joined_at }
    }
}
