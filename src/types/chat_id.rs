use std::fmt;

use serde::{Deserialize, Serialize};

/// Client-generated identifier keying the advisory transcript backup.
///
/// This is unrelated to [`SessionId`](crate::types::SessionId); the server never sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Generate a fresh chat id.
    pub fn generate() -> Self {
        Self(format!("chat_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Wrap an existing identifier, e.g. one pinned on the command line.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
