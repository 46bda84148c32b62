use serde::{Deserialize, Serialize};

use crate::types::PreferredService;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The user's message text.
    pub message: String,

    /// The service the server should try first.
    #[serde(default)]
    pub preferred_service: PreferredService,
}

impl ChatRequest {
    /// Create a new `ChatRequest`.
    pub fn new(message: impl Into<String>, preferred_service: PreferredService) -> Self {
        Self {
            message: message.into(),
            preferred_service,
        }
    }
}

/// Response of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    /// The assistant's answer.
    pub response: String,

    /// Display name of the service that answered.
    #[serde(default)]
    pub service: Option<String>,
}

impl ChatReply {
    /// Create a new `ChatReply`.
    pub fn new(response: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            service: Some(service.into()),
        }
    }
}
