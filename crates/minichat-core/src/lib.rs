//! minichat core - shared domain types for the chat relay
//!
//! This crate provides the types shared between the server (minichatd),
//! the wire protocol and the terminal client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod name;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use name::DisplayName;
pub use session::{ConnectionId, SessionInfo};
