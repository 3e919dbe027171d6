//! Parsing of client-to-server lines.

use crate::message::{LEAVE_COMMAND, LIST_USERS_COMMAND};

/// Keyword that opens a registration line: `username = <name>`.
pub const REGISTER_KEYWORD: &str = "username";

/// A single line received from a client, classified.
///
/// All borrowed text points into the trimmed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientLine<'a> {
    /// Empty or whitespace-only line.
    Blank,

    /// `username = <name>`; `name` is trimmed and may be empty.
    Register {
        name: &'a str,
        /// The whole trimmed line, for use when the name is not meaningful
        line: &'a str,
    },

    /// The exact line `Bye`.
    Leave,

    /// The exact line `AllUsers`.
    ListUsers,

    /// Anything else, trimmed.
    Text(&'a str),
}

/// Classifies a raw line.
///
/// Surrounding whitespace (including a trailing `\r`) is ignored. The
/// registration form is the keyword `username`, optional whitespace, `=`,
/// then the rest of the line.
pub fn parse_line(raw: &str) -> ClientLine<'_> {
    let line = raw.trim();

    if line.is_empty() {
        return ClientLine::Blank;
    }
    if line == LEAVE_COMMAND {
        return ClientLine::Leave;
    }
    if line == LIST_USERS_COMMAND {
        return ClientLine::ListUsers;
    }

    match registration_payload(line) {
        Some(name) => ClientLine::Register { name, line },
        None => ClientLine::Text(line),
    }
}

fn registration_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(REGISTER_KEYWORD)?;
    let rest = rest.trim_start().strip_prefix('=')?;
    Some(rest.trim())
}
