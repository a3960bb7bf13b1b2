//! Chat and API types.
//!
//! The wire types mirror what the assistant backend and the dashboard REST API
//! exchange; [`Message`] is the client-side log entry rendered by the UI.

use dhan_saathi_core::MessageId;
use serde::{Deserialize, Serialize};

use crate::profile::{PrivilegeTier, Profile};

// =============================================================================
// Conversation Types
// =============================================================================

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person using the dashboard.
    User,
    /// The assistant backend.
    Assistant,
}

impl Role {
    /// Wire/display string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the session.
    pub id: MessageId,
    /// Who wrote it.
    pub role: Role,
    /// Text shown to the user. For a streaming message this is the revealed prefix.
    pub content: String,
    /// Whether the message is still receiving or revealing text.
    pub streaming: bool,
}

impl Message {
    /// Create a finished user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::User,
            content: content.into(),
            streaming: false,
        }
    }

    /// Create a finished assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::Assistant,
            content: content.into(),
            streaming: false,
        }
    }

    /// Create an empty assistant placeholder that will receive a streamed reply.
    #[must_use]
    pub fn assistant_placeholder() -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::Assistant,
            content: String::new(),
            streaming: true,
        }
    }

    /// Check if this is a user message.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// A submitted user turn waiting for its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// The text the user submitted.
    pub text: String,
    /// Placeholder assistant message the reply streams into.
    pub reply_id: MessageId,
}

// =============================================================================
// Assistant Protocol Types
// =============================================================================

/// Client -> assistant: one request per user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's text.
    pub message: String,
    /// Signed-in user id, or `"guest"`.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Privilege tier.
    pub mode: PrivilegeTier,
}

impl ChatRequest {
    /// Build the request for `text` on behalf of `profile`.
    #[must_use]
    pub fn new(text: impl Into<String>, profile: &Profile) -> Self {
        Self {
            message: text.into(),
            user_id: profile.wire_user_id().to_string(),
            mode: profile.tier,
        }
    }
}

// =============================================================================
// Dashboard API Types
// =============================================================================

/// Response of the suggested-prompts endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    /// Prompt strings to offer before the first turn.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Error response from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error message.
    pub error: String,
}
