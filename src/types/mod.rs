// Public modules
pub mod chat_id;
pub mod chat_request;
pub mod history_entry;
pub mod message;
pub mod preferred_service;
pub mod session_id;
pub mod session_info;
pub mod status;
pub mod theme;
pub mod usage_stats;

// Re-exports
pub use chat_id::ChatId;
pub use chat_request::{ChatReply, ChatRequest};
pub use history_entry::HistoryEntry;
pub use message::{Message, MessageId, Origin, Sender};
pub use preferred_service::PreferredService;
pub use session_id::SessionId;
pub use session_info::SessionInfo;
pub use status::{AiStatus, Connectivity};
pub use theme::Theme;
pub use usage_stats::UsageStats;
