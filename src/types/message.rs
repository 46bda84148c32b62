use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Locally generated identifier used to correlate a message with what was rendered.
///
/// Not guaranteed unique across sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh message id.
    pub fn generate() -> Self {
        Self(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person at the keyboard.
    User,
    /// The assistant, or a synthetic message standing in for it.
    Bot,
}

/// Where a message's content came from.
///
/// A user message starts life as a local echo and is confirmed once the server accepts the chat
/// request.  Synthetic messages (errors, the welcome banner) never exist on the server.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Shown optimistically; the server has not acknowledged it.
    LocalEcho,
    /// Acknowledged by, or loaded from, the server.
    #[default]
    Confirmed,
    /// Generated by the client and never persisted remotely.
    Synthetic,
}

/// A single entry in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Locally generated id.
    pub id: MessageId,

    /// Message body.
    pub text: String,

    /// Author of the message.
    pub sender: Sender,

    /// When the message was created or recorded.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,

    /// The service that produced a bot message, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_service: Option<String>,

    /// Local echo, confirmed, or synthetic.
    #[serde(default)]
    pub origin: Origin,
}

impl Message {
    /// Create a user message as an optimistic local echo.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            text: text.into(),
            sender: Sender::User,
            timestamp: OffsetDateTime::now_utc(),
            ai_service: None,
            origin: Origin::LocalEcho,
        }
    }

    /// Create a confirmed bot message tagged with the service that answered.
    pub fn bot(text: impl Into<String>, service: Option<String>) -> Self {
        Self {
            id: MessageId::generate(),
            text: text.into(),
            sender: Sender::Bot,
            timestamp: OffsetDateTime::now_utc(),
            ai_service: service,
            origin: Origin::Confirmed,
        }
    }

    /// Create a client-side bot message that the server never sees.
    pub fn synthetic(text: impl Into<String>, service: Option<String>) -> Self {
        Self {
            origin: Origin::Synthetic,
            ..Self::bot(text, service)
        }
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Override the origin.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// True if the server has not acknowledged this message.
    pub fn is_local_echo(&self) -> bool {
        self.origin == Origin::LocalEcho
    }
}
