//! Server-to-client texts and line formatting.

use chrono::{DateTime, Local};
use minichat_core::DomainError;

/// Sent on connect and whenever an unregistered client sends something
/// that is not a registration line.
pub const REGISTRATION_PROMPT: &str = "Please set your username: username = <name>";

/// Reply to a registration for a name held by another session.
pub const NAME_TAKEN: &str = "Username already taken. Please choose another: username = <name>";

/// Reply to a registration whose name is empty.
pub const NAME_EMPTY: &str = "Username cannot be empty. Please try again: username = <name>";

/// Leave command.
pub const LEAVE_COMMAND: &str = "Bye";

/// Roster request command.
pub const LIST_USERS_COMMAND: &str = "AllUsers";

/// Author shown on server-generated broadcast lines.
pub const SERVER_AUTHOR: &str = "Server";

/// Formats the `HH:MM:SS` stamp that prefixes every broadcast line.
pub fn clock(at: &DateTime<Local>) -> String {
    at.format("%H:%M:%S").to_string()
}

/// Formats a broadcast line: `<HH:MM:SS> <author>: <text>`.
pub fn chat_line(at: &DateTime<Local>, author: &str, text: &str) -> String {
    format!("{} {}: {}", clock(at), author, text)
}

/// Formats a server-authored broadcast line.
pub fn server_line(at: &DateTime<Local>, text: &str) -> String {
    chat_line(at, SERVER_AUTHOR, text)
}

pub fn welcome_text(name: &str) -> String {
    format!("Welcome {name}")
}

pub fn goodbye_text(name: &str) -> String {
    format!("Goodbye {name}")
}

/// The line a client sends to claim `name`.
pub fn registration_line(name: &str) -> String {
    format!("{} = {name}", crate::parse::REGISTER_KEYWORD)
}

/// Maps a recoverable protocol error to the line sent back to the client.
pub fn error_reply(error: &DomainError) -> &'static str {
    match error {
        DomainError::EmptyName => NAME_EMPTY,
        DomainError::NameTaken { .. } => NAME_TAKEN,
    }
}
