//! Domain-specific error types following panic-free policy.

use crate::DisplayName;
use thiserror::Error;

/// Recoverable protocol errors.
///
/// These are reported to the offending client only; the connection stays in
/// its current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The proposed display name was empty after trimming.
    #[error("display name cannot be empty")]
    EmptyName,

    /// Another active session already holds this display name.
    #[error("display name already taken: {name}")]
    NameTaken { name: DisplayName },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
