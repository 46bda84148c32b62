use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse reachability of the remote API.
///
/// Drives a status indicator only; it never gates operations.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// The last probe or send succeeded.
    #[default]
    Online,
    /// The last probe failed, or a send failed.
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => f.write_str("online"),
            Connectivity::Offline => f.write_str("offline"),
        }
    }
}

/// What the assistant is doing from the user's point of view.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiStatus {
    /// Idle and ready for input.
    #[default]
    Ready,
    /// A chat request is in flight.
    Thinking,
    /// The last chat request failed.
    Error,
}

impl fmt::Display for AiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiStatus::Ready => f.write_str("Ready"),
            AiStatus::Thinking => f.write_str("Thinking..."),
            AiStatus::Error => f.write_str("Error"),
        }
    }
}
