//! Ordered in-memory message log.
//!
//! The log is append-only apart from in-place updates to the single assistant
//! message that is currently streaming. Updates addressed to any other message
//! are ignored, which discards stale reveal output once a turn has ended.

use dhan_saathi_core::{CoreError, MessageId};

use crate::types::{Message, Role};

/// Error returned when appending would break the log's invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    /// Another assistant message is already streaming.
    #[error("message {0} is still streaming")]
    AlreadyStreaming(MessageId),

    /// Only assistant messages may stream.
    #[error("user messages cannot be streaming")]
    StreamingUserMessage,

    /// The id is already present in the log.
    #[error("duplicate message id: {0}")]
    DuplicateId(MessageId),
}

/// The conversation shown in the chat pane.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    in_flight: Option<MessageId>,
}

impl ConversationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log seeded with a finished assistant greeting.
    #[must_use]
    pub fn with_welcome(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::assistant(text)],
            in_flight: None,
        }
    }

    /// Append a message.
    ///
    /// A streaming message becomes the in-flight message.
    ///
    /// # Errors
    ///
    /// Fails if the message would be a second streaming message, is a
    /// streaming user message, or reuses an id.
    pub fn append(&mut self, message: Message) -> Result<(), ConversationError> {
        if message.streaming {
            if message.role == Role::User {
                return Err(ConversationError::StreamingUserMessage);
            }
            if let Some(current) = self.in_flight {
                return Err(ConversationError::AlreadyStreaming(current));
            }
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return Err(ConversationError::DuplicateId(message.id));
        }

        if message.streaming {
            self.in_flight = Some(message.id);
        }
        self.messages.push(message);
        Ok(())
    }

    /// Replace the content of the in-flight message.
    ///
    /// Passing `still_streaming = false` finalizes it. Returns `false` without
    /// touching the log when `id` is not the in-flight message.
    pub fn update_streaming(&mut self, id: MessageId, content: String, still_streaming: bool) -> bool {
        if self.in_flight != Some(id) {
            tracing::trace!(message_id = %id, "Ignoring update for a message that is not in flight");
            return false;
        }
        let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == id) else {
            self.in_flight = None;
            return false;
        };

        message.content = content;
        message.streaming = still_streaming;
        if !still_streaming {
            self.in_flight = None;
        }
        true
    }

    /// All messages in order.
    #[must_use]
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    /// Look up a message by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MessageNotFound`] for an unknown id.
    pub fn get(&self, id: MessageId) -> dhan_saathi_core::Result<&Message> {
        self.messages
            .iter()
            .find(|m| m.id == id)
            .ok_or(CoreError::MessageNotFound(id))
    }

    /// The assistant message currently streaming, if any.
    #[must_use]
    pub const fn in_flight(&self) -> Option<MessageId> {
        self.in_flight
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
