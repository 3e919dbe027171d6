//! The `AllUsers` listing.

use std::fmt;

use chrono::{DateTime, Local};
use minichat_core::SessionInfo;

use crate::message::clock;

/// Snapshot of registered participants, sorted by name.
///
/// Rendered as a block that starts with an empty line, then a header, then
/// one numbered entry per participant:
///
/// ```text
///
/// List of users connected at time: 12:00:05
/// 	1) CS since Sat Mar 09 12:00:02 +01:00 2024
/// 	2) UNO since Sat Mar 09 12:00:01 +01:00 2024
/// ```
///
/// The zone field is the numeric UTC offset of `Local` (`+01:00`), not a
/// zone abbreviation such as `CET`.
///
/// The writer's line terminator closes the block with a second empty line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    taken_at: DateTime<Local>,
    entries: Vec<SessionInfo>,
}

impl Roster {
    /// Builds a roster, sorting entries by display name.
    pub fn new(taken_at: DateTime<Local>, mut entries: Vec<SessionInfo>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { taken_at, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in roster order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

impl fmt::Display for Roster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "List of users connected at time: {}", clock(&self.taken_at))?;
        for (index, entry) in self.entries.iter().enumerate() {
            writeln!(
                f,
                "\t{}) {} since {}",
                index + 1,
                entry.name,
                entry.joined_at.format("%a %b %d %H:%M:%S %Z %Y")
            )?;
        }
        Ok(())
    }
}
