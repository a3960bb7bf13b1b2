//! Inbound frame decoding.
//!
//! The assistant backend has shipped several frame shapes over time: a bare
//! `[DONE]` sentinel, JSON envelopes whose text lives under one of a handful of
//! keys, and plain text replies. [`decode`] folds all of them into a
//! [`Fragment`] and never fails; anything it cannot interpret is literal text.

use serde_json::{Map, Value};

/// End-of-stream sentinel.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Keys that may carry fragment text, in priority order.
pub const CONTENT_KEYS: [&str; 4] = ["content", "text", "message", "reply"];

/// `status` values that mark the last frame of a reply.
pub const COMPLETION_STATUSES: [&str; 3] = ["complete", "completed", "done"];

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fragment {
    /// Text to append to the reply. May be empty.
    pub text: String,
    /// Whether this frame ends the reply.
    pub done: bool,
}

impl Fragment {
    /// A text fragment that does not end the reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }

    /// An empty end-of-reply marker.
    #[must_use]
    pub fn done() -> Self {
        Self {
            text: String::new(),
            done: true,
        }
    }
}

/// Decode a raw frame.
#[must_use]
pub fn decode(raw: &str) -> Fragment {
    if raw.contains(DONE_SENTINEL) {
        return Fragment::done();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => decode_envelope(&object),
        Ok(_) => Fragment::text(raw),
        Err(e) => {
            tracing::trace!(error = %e, "Frame is not JSON, using it as literal text");
            Fragment::text(raw)
        }
    }
}

fn decode_envelope(object: &Map<String, Value>) -> Fragment {
    let text = CONTENT_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string();

    let done_flag = object.get("done").and_then(Value::as_bool).unwrap_or(false);
    let done_status = object
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| {
            COMPLETION_STATUSES
                .iter()
                .any(|s| status.eq_ignore_ascii_case(s))
        });

    Fragment {
        text,
        done: done_flag || done_status,
    }
}
