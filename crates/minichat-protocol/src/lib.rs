//! minichat protocol - wire format shared by server and client
//!
//! The protocol is plain UTF-8 text, one message per newline-terminated line:
//! - `parse` turns client lines into commands
//! - `message` holds the fixed server texts and line formatting
//! - `roster` renders the `AllUsers` listing

pub mod message;
pub mod parse;
pub mod roster;

pub use message::{
    chat_line, clock, error_reply, goodbye_text, registration_line, server_line, welcome_text,
    LIST_USERS_COMMAND, LEAVE_COMMAND, NAME_EMPTY, NAME_TAKEN, REGISTRATION_PROMPT,
    SERVER_AUTHOR,
};
pub use parse::{parse_line, ClientLine, REGISTER_KEYWORD};
pub use roster::Roster;
