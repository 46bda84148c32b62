//! The remote chat API as seen by the controller.
//!
//! [`ChatClient`](crate::ChatClient) is the HTTP implementation.  Anything else that speaks the
//! same contract (an in-process fake, a recording proxy) can stand in for it.

use std::sync::Arc;

use crate::error::Result;
use crate::types::{ChatReply, ChatRequest, HistoryEntry, SessionId, SessionInfo, UsageStats};

/// Operations of the chat-session API.
///
/// Implementations report a non-2xx status as a server error and a request that produced no
/// response as a network failure (see [`Error`](crate::Error)).
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    /// `POST /api/chat`
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// `GET /api/health`
    async fn health(&self) -> Result<()>;

    /// `GET /api/history`, optionally limited to `limit` entries.
    async fn history(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>>;

    /// `GET /api/current-session`
    async fn current_session(&self) -> Result<Option<SessionId>>;

    /// `GET /api/sessions`
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>>;

    /// `POST /api/sessions`
    async fn create_session(&self, name: &str) -> Result<SessionId>;

    /// `POST /api/sessions/{id}/switch`
    async fn switch_session(&self, id: SessionId) -> Result<()>;

    /// `PUT /api/sessions/{id}/rename`
    async fn rename_session(&self, id: SessionId, name: &str) -> Result<()>;

    /// `DELETE /api/sessions/{id}`
    async fn delete_session(&self, id: SessionId) -> Result<()>;

    /// `GET /api/stats`
    async fn stats(&self) -> Result<UsageStats>;
}

#[async_trait::async_trait]
impl<T: ChatApi + ?Sized> ChatApi for Arc<T> {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        (**self).chat(request).await
    }

    async fn health(&self) -> Result<()> {
        (**self).health().await
    }

    async fn history(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
        (**self).history(limit).await
    }

    async fn current_session(&self) -> Result<Option<SessionId>> {
        (**self).current_session().await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        (**self).list_sessions().await
    }

    async fn create_session(&self, name: &str) -> Result<SessionId> {
        (**self).create_session(name).await
    }

    async fn switch_session(&self, id: SessionId) -> Result<()> {
        (**self).switch_session(id).await
    }

    async fn rename_session(&self, id: SessionId, name: &str) -> Result<()> {
        (**self).rename_session(id, name).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<()> {
        (**self).delete_session(id).await
    }

    async fn stats(&self) -> Result<UsageStats> {
        (**self).stats().await
    }
}
