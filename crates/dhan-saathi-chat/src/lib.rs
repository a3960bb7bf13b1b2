//! Streaming chat client for the Dhan Saathi finance assistant.
//!
//! The assistant answers over a WebSocket, possibly in many small fragments.
//! This crate turns that stream into a conversation log whose in-flight
//! reply is revealed at a steady typing pace:
//!
//! - **Transport**: one WebSocket connection with explicit state and manual retry
//! - **Decoder**: folds every known frame shape into text plus a done flag
//! - **Reveal**: paces buffered text onto the screen
//! - **Conversation**: the ordered message log
//! - **Session**: the controller tying them together
//!
//! # Example
//!
//! ```no_run
//! use dhan_saathi_chat::{ChatConfig, ChatSession, Profile, SessionChange};
//!
//! # async fn run() -> Result<(), dhan_saathi_chat::SessionError> {
//! let mut session = ChatSession::new(ChatConfig::default(), Profile::default());
//! session.submit("How much did I spend on food last month?").await?;
//!
//! loop {
//!     match session.next_change().await {
//!         SessionChange::Finalized(_) | SessionChange::TurnFailed { .. } => break,
//!         _ => {}
//!     }
//! }
//! println!("{}", session.messages().last().map_or("", |m| m.content.as_str()));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod conversation;
pub mod decoder;
pub mod profile;
pub mod reveal;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{ClientError, DashboardClient};
pub use config::{ChatConfig, ConfigError, RevealConfig};
pub use conversation::{ConversationError, ConversationLog};
pub use decoder::{decode, Fragment};
pub use profile::{IdentityProvider, PrivilegeTier, Profile, StaticIdentity, UserState};
pub use reveal::{RevealError, RevealScheduler, StreamBuffer};
pub use session::{ChatSession, SessionChange, SessionError, TurnFailure};
pub use transport::{ConnectionState, Transport, TransportError};
pub use types::{ChatRequest, Message, PendingRequest, Role};
