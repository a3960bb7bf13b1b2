//! Common error types for Dhan Saathi.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::ids::MessageId;
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the chat client.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A message with the specified ID was not found.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
