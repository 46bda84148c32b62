use serde::{Deserialize, Serialize};

/// Usage counters reported by `GET /api/stats`.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageStats {
    /// Total users known to the server.
    #[serde(default)]
    pub users: u64,

    /// Total sessions across all users.
    #[serde(default)]
    pub sessions: u64,

    /// Total messages across all users.
    #[serde(default)]
    pub messages: u64,

    /// Sessions owned by the current user.
    #[serde(default)]
    pub user_sessions: u64,

    /// Messages in sessions owned by the current user.
    #[serde(default)]
    pub user_messages: u64,
}
