//! minichat client - line-oriented terminal client for the chat relay
//!
//! The client connects to a `minichatd` server and bridges it to a console:
//!
//! 1. **Registration**: the server's technical prompt is replaced with
//!    `Enter the username:` and whatever the user types is sent as
//!    `username = <typed>`
//! 2. **Chat**: console lines go to the server verbatim, server lines are
//!    printed verbatim
//! 3. **Exit**: typing `Bye` sends it and ends the session
//!
//! All tasks respect a shared `CancellationToken` for graceful shutdown.

pub mod client;
pub mod error;

// Re-export commonly used types
pub use client::{chat, classify, ChatClient, ClientConfig, ServerLine, USERNAME_PROMPT};
pub use error::{ClientError, Result};
