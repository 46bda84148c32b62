//! The render surface: whatever turns controller state into something a person can see.
//!
//! The controller never formats output itself.  After every state transition it builds a
//! [`ChatView`] snapshot and hands it to [`RenderSurface::render`], so rendering is a pure
//! function of that snapshot.  Transient events that are not part of the state (a rename
//! succeeded, a switch failed) go through [`RenderSurface::notify`].

use crate::types::{AiStatus, Connectivity, Message, SessionId, SessionInfo, UsageStats};

/// Severity of a transient notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NotificationLevel {
    /// An operation completed.
    Success,
    /// Neutral information.
    Info,
    /// An operation failed; prior state is untouched.
    Error,
}

/// A transient, user-visible message that is not part of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Notification {
    /// A success notification.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    /// An informational notification.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    /// An error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Snapshot of everything a surface needs to draw the chat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatView {
    /// Non-persisted welcome banner shown ahead of an empty session's transcript.
    pub welcome: Option<Message>,
    /// The active session's transcript.
    pub transcript: Vec<Message>,
    /// Sessions as last reported by the server.
    pub sessions: Vec<SessionInfo>,
    /// The active session, if known.
    pub active_session: Option<SessionId>,
    /// Reachability indicator.
    pub connectivity: Connectivity,
    /// Assistant status indicator.
    pub ai_status: AiStatus,
    /// Usage counters, once loaded.
    pub stats: Option<UsageStats>,
    /// True while a chat request is in flight.
    pub send_pending: bool,
}

impl ChatView {
    /// Everything to display in the message pane, welcome banner first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.welcome.iter().chain(self.transcript.iter())
    }

    /// The listing entry of the active session.
    pub fn active_session_info(&self) -> Option<&SessionInfo> {
        let active = self.active_session?;
        self.sessions.iter().find(|session| session.id == active)
    }
}

/// Consumer of controller state.
pub trait RenderSurface: Send + Sync {
    /// Draw the given snapshot.
    fn render(&self, view: &ChatView);

    /// Show a transient notification.
    fn notify(&self, notification: &Notification) {
        _ = notification;
    }

    /// Called from the background health probe when reachability changes.
    fn connectivity_changed(&self, connectivity: Connectivity) {
        _ = connectivity;
    }
}

impl RenderSurface for () {
    fn render(&self, view: &ChatView) {
        _ = view;
    }
}
