use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::types::{Message, MessageId, Origin, Sender};

/// One stored message as returned by `GET /api/history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Server-side row id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// `"user"` for user messages; anything else is treated as the assistant.
    #[serde(rename = "type")]
    pub kind: String,

    /// Message body.
    pub content: String,

    /// When the server stored the message.
    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,

    /// Free-form metadata; the server records the answering service under `service`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl HistoryEntry {
    /// Create a new `HistoryEntry`.
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            content: content.into(),
            timestamp: None,
            metadata: Map::new(),
        }
    }

    /// Record the answering service in the metadata.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.metadata
            .insert("service".to_string(), Value::String(service.into()));
        self
    }

    /// The author implied by the entry's type.
    pub fn sender(&self) -> Sender {
        if self.kind == "user" {
            Sender::User
        } else {
            Sender::Bot
        }
    }

    /// Convert into a confirmed transcript message.
    pub fn into_message(self) -> Message {
        let sender = self.sender();
        let ai_service = match sender {
            Sender::Bot => self
                .metadata
                .get("service")
                .and_then(Value::as_str)
                .map(String::from),
            Sender::User => None,
        };
        Message {
            id: MessageId::generate(),
            text: self.content,
            sender,
            timestamp: self.timestamp.unwrap_or_else(OffsetDateTime::now_utc),
            ai_service,
            origin: Origin::Confirmed,
        }
    }
}
