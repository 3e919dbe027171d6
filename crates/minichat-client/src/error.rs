//! Error types for the terminal client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server after every retry.
    #[error("Failed to connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    /// The user cancelled (Ctrl+C) before the session finished.
    #[error("Cancelled")]
    Cancelled,

    /// I/O error passthrough, from the socket or the console.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
