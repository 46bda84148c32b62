// Public modules
pub mod api;
pub mod chat;
pub mod client;
pub mod controller;
pub mod error;
pub mod health;
pub mod render;
pub mod store;
pub mod types;
pub mod utils;

mod observability;

// Re-exports
pub use api::ChatApi;
pub use client::ChatClient;
pub use controller::{
    ChatSessionController, HistorySource, IgnoreReason, SendOutcome, session_title_from_text,
};
pub use error::{Error, Result};
pub use health::{ConnectivityState, HealthProbe};
pub use observability::register_biometrics;
pub use render::{ChatView, Notification, NotificationLevel, RenderSurface};
pub use store::{LocalStore, Settings};
pub use types::*;
