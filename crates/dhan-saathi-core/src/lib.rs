//! Core types and utilities for Dhan Saathi.
//!
//! This crate provides the foundational types shared by the chat client:
//!
//! - **Identifiers**: Strongly-typed IDs for chat messages and users
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use dhan_saathi_core::{MessageId, UserId};
//!
//! // Parse a user ID handed over by the identity provider
//! let user_id = UserId::new("user_2abc").unwrap();
//! assert_eq!(user_id.as_str(), "user_2abc");
//!
//! // Generate a message ID
//! let message_id = MessageId::generate();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::{CoreError, Result};
pub use ids::{IdError, MessageId, UserId, MAX_USER_ID_LEN};
