use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::SessionId;

/// A server-tracked, persistent named conversation container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    /// Server-assigned identifier.
    pub id: SessionId,

    /// Display name of the session.
    pub name: String,

    /// Number of messages the server holds for the session.
    #[serde(default)]
    pub message_count: u64,

    /// When the session was last modified.
    #[serde(default, with = "crate::utils::time::option")]
    pub updated_at: Option<OffsetDateTime>,

    /// When the session was created.
    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,

    /// Timestamp of the newest message in the session.
    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_message_time: Option<OffsetDateTime>,
}

impl SessionInfo {
    /// Create a new `SessionInfo` with no timestamps.
    pub fn new(id: SessionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            message_count: 0,
            updated_at: None,
            created_at: None,
            last_message_time: None,
        }
    }

    /// Set the message count.
    pub fn with_message_count(mut self, message_count: u64) -> Self {
        self.message_count = message_count;
        self
    }

    /// Set the last-updated timestamp.
    pub fn with_updated_at(mut self, updated_at: OffsetDateTime) -> Self {
        self.updated_at = Some(updated_at);
        self
    }
}
