//! Chat session controller.
//!
//! [`ChatSession`] ties the transport, decoder, reveal scheduler and
//! conversation log together. It is owned by a single task: the front-end
//! calls [`ChatSession::submit`] for user input and awaits
//! [`ChatSession::next_change`] in its event loop, redrawing whenever a change
//! is reported.
//!
//! A turn starts with a user message and an empty streaming placeholder and
//! ends with exactly one terminal assistant message: the full reply, or a
//! notice explaining why there is none.

use dhan_saathi_core::MessageId;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::config::ChatConfig;
use crate::conversation::{ConversationError, ConversationLog};
use crate::decoder;
use crate::profile::Profile;
use crate::reveal::{RevealError, RevealScheduler};
use crate::transport::{ConnectionEvent, ConnectionState, Transport, TransportEvent};
use crate::types::{ChatRequest, Message, PendingRequest};

/// Shown when the request could not be handed to the transport.
pub const RETRY_PROMPT: &str = "I couldn't reach the assistant. Check your connection and try again.";

/// Shown when the connection closes before the reply finished.
pub const CONNECTION_LOST_NOTICE: &str = "The connection was lost before the reply finished. Please try again.";

/// Shown when the connection fails while a reply is outstanding.
pub const SERVICE_UNAVAILABLE_NOTICE: &str =
    "The assistant service is unavailable right now. Please try again in a moment.";

/// Shown when no reply arrives in time.
pub const RESPONSE_TIMEOUT_NOTICE: &str = "The assistant took too long to respond. Please try again.";

/// Error returned by [`ChatSession::submit`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The text was empty or whitespace.
    #[error("message is empty")]
    EmptyMessage,

    /// A reply is still outstanding.
    #[error("a reply is still in progress")]
    Busy,

    /// The request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The conversation log rejected the turn.
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    /// The reveal scheduler rejected the turn.
    #[error(transparent)]
    Reveal(#[from] RevealError),
}

/// Why a turn ended without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnFailure {
    /// The request never reached the transport.
    ConnectionUnavailable,
    /// The connection failed while the reply was outstanding.
    RemoteError,
    /// The connection closed while the reply was outstanding.
    RemoteClosed,
    /// Nothing arrived before the response timeout.
    ResponseTimeout,
}

impl TurnFailure {
    /// Text written into the failed assistant message.
    #[must_use]
    pub const fn notice(&self) -> &'static str {
        match self {
            Self::ConnectionUnavailable => RETRY_PROMPT,
            Self::RemoteError => SERVICE_UNAVAILABLE_NOTICE,
            Self::RemoteClosed => CONNECTION_LOST_NOTICE,
            Self::ResponseTimeout => RESPONSE_TIMEOUT_NOTICE,
        }
    }
}

/// What [`ChatSession::next_change`] applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// Nothing visible changed.
    None,
    /// The connection state changed.
    Connection(ConnectionState),
    /// Text was buffered for the in-flight message but not yet shown.
    Received(MessageId),
    /// More of the in-flight message is visible.
    Revealed(MessageId),
    /// The reply finished and its message is final.
    Finalized(MessageId),
    /// The turn ended with a notice instead of a reply.
    TurnFailed {
        /// The assistant message holding the notice.
        message_id: MessageId,
        /// Why.
        failure: TurnFailure,
    },
}

impl SessionChange {
    /// Whether the UI should redraw.
    #[must_use]
    pub const fn needs_redraw(&self) -> bool {
        !matches!(self, Self::None | Self::Received(_))
    }
}

/// Bookkeeping for the outstanding request.
#[derive(Debug)]
struct Turn {
    request: PendingRequest,
    sent_at: Instant,
    last_frame_at: Option<Instant>,
}

/// Which reply deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    FirstFrame,
    ReplyIdle,
}

/// A chat session with the assistant.
#[derive(Debug)]
pub struct ChatSession {
    config: ChatConfig,
    profile: Profile,
    transport: Transport,
    events: mpsc::Receiver<TransportEvent>,
    conversation: ConversationLog,
    reveal: RevealScheduler,
    turn: Option<Turn>,
}

impl ChatSession {
    /// Create a session. Nothing connects until the first submission.
    #[must_use]
    pub fn new(config: ChatConfig, profile: Profile) -> Self {
        let (transport, events) = Transport::new(config.ws_url.clone(), config.connect_timeout());
        let conversation = if config.welcome_message.is_empty() {
            ConversationLog::new()
        } else {
            ConversationLog::with_welcome(config.welcome_message.clone())
        };
        let reveal = RevealScheduler::new(config.reveal.clone());

        Self {
            config,
            profile,
            transport,
            events,
            conversation,
            reveal,
            turn: None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// All messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.conversation.all()
    }

    /// Look up one message.
    ///
    /// # Errors
    ///
    /// Returns [`dhan_saathi_core::CoreError::MessageNotFound`] for an unknown id.
    pub fn message(&self, id: MessageId) -> dhan_saathi_core::Result<&Message> {
        self.conversation.get(id)
    }

    /// Connection state for the status badge.
    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Whether the input box accepts a new submission.
    #[must_use]
    pub const fn input_enabled(&self) -> bool {
        self.conversation.in_flight().is_none()
    }

    /// The request whose reply is outstanding.
    #[must_use]
    pub fn pending_request(&self) -> Option<&PendingRequest> {
        self.turn.as_ref().map(|t| &t.request)
    }

    /// Identity and tier used for new requests.
    #[must_use]
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Replace the identity and tier. Applies from the next submission.
    pub fn set_profile(&mut self, profile: Profile) {
        tracing::debug!(user_id = %profile.wire_user_id(), tier = %profile.tier, "Profile updated");
        self.profile = profile;
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Submit user text.
    ///
    /// Appends the user message and a streaming placeholder, connects if
    /// needed and sends the request. If the transport cannot take the request,
    /// the placeholder is finalized with [`RETRY_PROMPT`] and the id is still
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyMessage`] for blank text,
    /// [`SessionError::Busy`] while a reply is outstanding and
    /// [`SessionError::Reveal`] if the reveal scheduler is still held by an
    /// earlier message. The log is unchanged in each case.
    pub async fn submit(&mut self, text: impl Into<String>) -> Result<MessageId, SessionError> {
        let text = text.into();
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if !self.input_enabled() {
            return Err(SessionError::Busy);
        }

        let payload = serde_json::to_string(&ChatRequest::new(text, &self.profile))?;

        let placeholder = Message::assistant_placeholder();
        let reply_id = placeholder.id;
        self.reveal.begin(reply_id)?;
        let appended = self
            .conversation
            .append(Message::user(text))
            .and_then(|()| self.conversation.append(placeholder));
        if let Err(e) = appended {
            self.reveal.cancel();
            return Err(e.into());
        }

        self.transport.connect();
        match self.transport.send(payload).await {
            Ok(()) => {
                tracing::debug!(message_id = %reply_id, state = %self.transport.state(), "Request sent");
                self.turn = Some(Turn {
                    request: PendingRequest {
                        text: text.to_string(),
                        reply_id,
                    },
                    sent_at: Instant::now(),
                    last_frame_at: None,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Assistant unreachable");
                self.fail_turn(TurnFailure::ConnectionUnavailable);
            }
        }
        Ok(reply_id)
    }

    /// Start a new connection attempt if the last one closed or failed.
    pub fn reconnect(&mut self) -> ConnectionState {
        self.transport.connect()
    }

    /// Stop revealing, finalize any in-flight message and close the connection.
    pub fn shutdown(&mut self) {
        if let Some(id) = self.conversation.in_flight() {
            self.complete_turn(id);
        }
        self.reveal.cancel();
        self.turn = None;
        self.transport.close();
    }

    // =========================================================================
    // Event Loop
    // =========================================================================

    /// Wait for the next transport event, reveal tick or reply deadline and
    /// apply it.
    ///
    /// Cancel safe: dropping the future before it completes loses nothing.
    pub async fn next_change(&mut self) -> SessionChange {
        let deadline = self.reply_deadline();
        tokio::select! {
            Some(event) = self.events.recv() => self.handle_transport_event(event),
            () = self.reveal.next_tick() => self.tick(),
            expired = wait_for(deadline) => self.expire(expired),
        }
    }

    /// Apply one transport event.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> SessionChange {
        let Some(event) = self.transport.handle_event(event) else {
            return SessionChange::None;
        };

        match event {
            ConnectionEvent::Opened => SessionChange::Connection(self.transport.state()),
            ConnectionEvent::Frame(raw) => self.apply_frame(&raw),
            ConnectionEvent::Failed(_) => self.end_connection(TurnFailure::RemoteError),
            ConnectionEvent::Closed => self.end_connection(TurnFailure::RemoteClosed),
        }
    }

    /// Advance the reveal by one step.
    pub fn tick(&mut self) -> SessionChange {
        let Some(update) = self.reveal.tick() else {
            return SessionChange::None;
        };
        if self
            .conversation
            .update_streaming(update.message_id, update.content, update.streaming)
        {
            SessionChange::Revealed(update.message_id)
        } else {
            SessionChange::None
        }
    }

    fn apply_frame(&mut self, raw: &str) -> SessionChange {
        let fragment = decoder::decode(raw);
        let Some(id) = self.conversation.in_flight() else {
            tracing::debug!(len = raw.len(), "Dropping frame with no reply in flight");
            return SessionChange::None;
        };

        if let Some(turn) = self.turn.as_mut() {
            turn.last_frame_at = Some(Instant::now());
        }
        self.reveal.push(id, &fragment.text);

        if fragment.done {
            self.complete_turn(id)
        } else {
            SessionChange::Received(id)
        }
    }

    fn end_connection(&mut self, failure: TurnFailure) -> SessionChange {
        match self.fail_turn(failure) {
            Some(message_id) => SessionChange::TurnFailed { message_id, failure },
            None => SessionChange::Connection(self.transport.state()),
        }
    }

    fn expire(&mut self, deadline: Deadline) -> SessionChange {
        let Some(id) = self.conversation.in_flight() else {
            self.turn = None;
            return SessionChange::None;
        };
        let received = self.reveal.buffer().is_some_and(|b| !b.pending().is_empty());

        // Anything the server still sends belongs to the abandoned request.
        self.transport.close();

        match deadline {
            Deadline::ReplyIdle if received => {
                tracing::debug!(message_id = %id, "Reply went quiet, treating it as complete");
                self.complete_turn(id)
            }
            Deadline::FirstFrame | Deadline::ReplyIdle => {
                tracing::warn!(message_id = %id, "Timed out waiting for a reply");
                self.end_connection(TurnFailure::ResponseTimeout)
            }
        }
    }

    // =========================================================================
    // Turn Completion
    // =========================================================================

    /// Finalize the in-flight message with everything received.
    fn complete_turn(&mut self, id: MessageId) -> SessionChange {
        self.turn = None;
        let content = match self.reveal.finish(id) {
            Some(update) => update.content,
            None => self
                .conversation
                .get(id)
                .map(|m| m.content.clone())
                .unwrap_or_default(),
        };
        self.conversation.update_streaming(id, content, false);
        tracing::debug!(message_id = %id, "Reply complete");
        SessionChange::Finalized(id)
    }

    /// Replace the in-flight message with the failure notice.
    fn fail_turn(&mut self, failure: TurnFailure) -> Option<MessageId> {
        self.reveal.cancel();
        self.turn = None;
        let id = self.conversation.in_flight()?;
        self.conversation
            .update_streaming(id, failure.notice().to_string(), false);
        tracing::info!(message_id = %id, ?failure, "Turn failed");
        Some(id)
    }

    fn reply_deadline(&self) -> Option<(Instant, Deadline)> {
        let turn = self.turn.as_ref()?;
        match turn.last_frame_at {
            None => self
                .config
                .response_timeout()
                .map(|timeout| (turn.sent_at + timeout, Deadline::FirstFrame)),
            Some(at) => self
                .config
                .reply_idle()
                .map(|idle| (at + idle, Deadline::ReplyIdle)),
        }
    }
}

/// Sleep until `deadline`, or forever if there is none.
async fn wait_for(deadline: Option<(Instant, Deadline)>) -> Deadline {
    match deadline {
        Some((at, kind)) => {
            time::sleep_until(at).await;
            kind
        }
        None => std::future::pending().await,
    }
}
