//! Paced reveal of streamed text.
//!
//! Network frames arrive in bursts; the reveal scheduler turns them into a
//! steady typing effect. Received text is appended to a [`StreamBuffer`] and a
//! single ticker, owned by the scheduler, moves the visible cursor forward on
//! every tick. The visible text is always a prefix of what was received.
//!
//! The ticker only exists while there is unrevealed text. When the buffer
//! drains, the message finalizes, or the scheduler is cancelled, the ticker is
//! dropped and [`RevealScheduler::next_tick`] stops resolving.

use std::future;

use dhan_saathi_core::MessageId;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::config::RevealConfig;

/// Error returned by [`RevealScheduler::begin`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevealError {
    /// Another message is still being revealed.
    #[error("message {0} is already being revealed")]
    Busy(MessageId),
}

/// Text received for one message and how much of it is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBuffer {
    pending: String,
    // Byte offset into `pending`, always on a char boundary.
    revealed: usize,
}

impl StreamBuffer {
    /// Append received text.
    pub fn push(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    /// Everything received so far.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// The visible prefix.
    #[must_use]
    pub fn revealed(&self) -> &str {
        &self.pending[..self.revealed]
    }

    /// Number of received characters not yet visible.
    #[must_use]
    pub fn lag(&self) -> usize {
        self.pending[self.revealed..].chars().count()
    }

    /// Whether every received character is visible.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.revealed == self.pending.len()
    }

    /// Reveal up to `chars` more characters. Returns whether anything moved.
    pub fn advance(&mut self, chars: usize) -> bool {
        let rest = &self.pending[self.revealed..];
        let offset = rest
            .char_indices()
            .nth(chars)
            .map_or(rest.len(), |(i, _)| i);
        self.revealed += offset;
        offset > 0
    }

    /// Reveal everything received.
    pub fn reveal_all(&mut self) {
        self.revealed = self.pending.len();
    }
}

/// Lifecycle of the message being revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealPhase {
    /// Everything received is visible; waiting for more text.
    Idle,
    /// Unrevealed text is waiting for the next tick.
    Revealing,
    /// The message has been finalized. Terminal.
    Terminal,
}

/// Visible content to write into the conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealUpdate {
    /// Message to update.
    pub message_id: MessageId,
    /// New visible content.
    pub content: String,
    /// Whether the message keeps streaming.
    pub streaming: bool,
}

#[derive(Debug)]
struct ActiveReveal {
    message_id: MessageId,
    buffer: StreamBuffer,
    phase: RevealPhase,
}

/// Drives the reveal of the single in-flight message.
#[derive(Debug)]
pub struct RevealScheduler {
    config: RevealConfig,
    active: Option<ActiveReveal>,
    ticker: Option<Interval>,
}

impl RevealScheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new(config: RevealConfig) -> Self {
        Self {
            config,
            active: None,
            ticker: None,
        }
    }

    /// Start revealing a new message with an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RevealError::Busy`] while another message is active.
    pub fn begin(&mut self, message_id: MessageId) -> Result<(), RevealError> {
        if let Some(active) = &self.active {
            return Err(RevealError::Busy(active.message_id));
        }
        tracing::debug!(message_id = %message_id, "Reveal started");
        self.active = Some(ActiveReveal {
            message_id,
            buffer: StreamBuffer::default(),
            phase: RevealPhase::Idle,
        });
        Ok(())
    }

    /// Append received text for `message_id`.
    ///
    /// Returns `false` and drops the text if `message_id` is not active.
    pub fn push(&mut self, message_id: MessageId, text: &str) -> bool {
        let Some(active) = self.active.as_mut().filter(|a| a.message_id == message_id) else {
            tracing::debug!(message_id = %message_id, "Dropping text for inactive message");
            return false;
        };
        active.buffer.push(text);
        if !active.buffer.is_drained() {
            active.phase = RevealPhase::Revealing;
        }
        true
    }

    /// Advance the reveal by one step.
    ///
    /// Returns the new visible content when it changed. Draining the buffer
    /// moves the phase back to [`RevealPhase::Idle`] and drops the ticker.
    pub fn tick(&mut self) -> Option<RevealUpdate> {
        let active = self.active.as_mut()?;
        if active.phase != RevealPhase::Revealing {
            return None;
        }

        let step = step_for(&self.config, active.buffer.lag());
        let moved = active.buffer.advance(step);
        if active.buffer.is_drained() {
            active.phase = RevealPhase::Idle;
            self.ticker = None;
        }

        moved.then(|| RevealUpdate {
            message_id: active.message_id,
            content: active.buffer.revealed().to_string(),
            streaming: true,
        })
    }

    /// Reveal everything received for `message_id` and finalize it.
    ///
    /// Returns `None` if `message_id` is not active.
    pub fn finish(&mut self, message_id: MessageId) -> Option<RevealUpdate> {
        if self.active_id() != Some(message_id) {
            return None;
        }
        let mut active = self.active.take()?;
        self.ticker = None;

        active.buffer.reveal_all();
        active.phase = RevealPhase::Terminal;
        tracing::debug!(
            message_id = %message_id,
            chars = active.buffer.pending().chars().count(),
            "Reveal finished"
        );

        Some(RevealUpdate {
            message_id,
            content: active.buffer.pending,
            streaming: false,
        })
    }

    /// Drop the active message and stop ticking.
    ///
    /// Returns the id of the message that was active.
    pub fn cancel(&mut self) -> Option<MessageId> {
        self.ticker = None;
        let cancelled = self.active.take().map(|a| a.message_id);
        if let Some(id) = cancelled {
            tracing::debug!(message_id = %id, "Reveal cancelled");
        }
        cancelled
    }

    /// Wait for the next tick.
    ///
    /// Never resolves while nothing is waiting to be revealed. Cancel safe.
    pub async fn next_tick(&mut self) {
        if !self.is_ticking() {
            self.ticker = None;
            return future::pending().await;
        }

        let period = self.config.tick_interval();
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        ticker.tick().await;
    }

    /// Whether unrevealed text is waiting.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.phase() == Some(RevealPhase::Revealing)
    }

    /// The message being revealed.
    #[must_use]
    pub fn active_id(&self) -> Option<MessageId> {
        self.active.as_ref().map(|a| a.message_id)
    }

    /// Phase of the active message.
    #[must_use]
    pub fn phase(&self) -> Option<RevealPhase> {
        self.active.as_ref().map(|a| a.phase)
    }

    /// Buffer of the active message.
    #[must_use]
    pub fn buffer(&self) -> Option<&StreamBuffer> {
        self.active.as_ref().map(|a| &a.buffer)
    }
}

/// Characters to reveal on one tick given the current lag.
fn step_for(config: &RevealConfig, lag: usize) -> usize {
    let base = config.chars_per_tick.max(1);
    if lag > config.catch_up_threshold {
        (lag / config.catch_up_divisor.max(1)).max(base)
    } else {
        base
    }
}
