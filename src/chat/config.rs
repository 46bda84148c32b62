//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved configuration used to
//! build a client and a controller.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::{ChatClient, DEFAULT_TIMEOUT};
use crate::controller::ChatSessionController;
use crate::error::Result;
use crate::health::DEFAULT_HEALTH_INTERVAL;
use crate::render::RenderSurface;
use crate::store::{LocalStore, Settings};
use crate::types::{ChatId, PreferredService, Theme};

/// Command-line arguments for the chatline-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the chat server.
    #[arrrg(
        optional,
        "Server base URL (default: $CHATLINE_BASE_URL or http://localhost:5000/)",
        "URL"
    )]
    pub base_url: Option<String>,

    /// Preferred AI service.
    #[arrrg(optional, "Preferred AI service: auto, gemini, deepseek, or any name", "SERVICE")]
    pub service: Option<String>,

    /// Directory for the theme, settings, and transcript backup.
    #[arrrg(optional, "Directory for local state (default: platform cache dir)", "DIR")]
    pub cache_dir: Option<String>,

    /// Pin the chat id that keys the transcript backup.
    #[arrrg(optional, "Chat id keying the local transcript backup", "ID")]
    pub chat_id: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 30)", "SECS")]
    pub timeout: Option<u64>,

    /// Cap on history entries loaded per session.
    #[arrrg(optional, "Maximum history entries to load", "N")]
    pub history_limit: Option<u32>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Disable the local store entirely.
    #[arrrg(flag, "Do not read or write local state")]
    pub no_cache: bool,
}

/// Resolved configuration for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Server base URL; `None` defers to the environment and then the built-in default.
    pub base_url: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Service selector sent with every chat request.
    pub preferred_service: PreferredService,

    /// Cap on history entries loaded per session.
    pub history_limit: Option<u32>,

    /// Where local state lives; `None` with caching enabled means the platform default.
    pub cache_dir: Option<PathBuf>,

    /// Whether to read and write local state at all.
    pub use_cache: bool,

    /// Chat id keying the transcript backup; generated when `None`.
    pub chat_id: Option<ChatId>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Color theme.
    pub theme: Theme,

    /// Print a timestamp next to every message.
    pub show_timestamps: bool,

    /// Spacing of the background health probe.
    pub health_interval: Duration,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Base URL: from the environment, else http://localhost:5000/
    /// - Timeout: 30 seconds
    /// - Service: auto
    /// - Local store: enabled, in the platform cache dir
    /// - Color: enabled, automatic theme, timestamps shown
    /// - Health probe: every 30 seconds
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            preferred_service: PreferredService::Auto,
            history_limit: None,
            cache_dir: None,
            use_cache: true,
            chat_id: None,
            use_color: true,
            theme: Theme::Auto,
            show_timestamps: true,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the preferred service.
    pub fn with_preferred_service(mut self, service: PreferredService) -> Self {
        self.preferred_service = service;
        self
    }

    /// Sets the history limit.
    pub fn with_history_limit(mut self, limit: Option<u32>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the local store directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Disables the local store.
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Pins the chat id.
    pub fn with_chat_id(mut self, chat_id: ChatId) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the theme.
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    /// Sets whether timestamps are shown.
    pub fn with_timestamps(mut self, show: bool) -> Self {
        self.show_timestamps = show;
        self
    }

    /// Sets the health probe interval.
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// The local store this configuration describes, if caching is enabled and a location is
    /// known.
    pub fn local_store(&self) -> Option<LocalStore> {
        if !self.use_cache {
            return None;
        }
        self.cache_dir
            .clone()
            .or_else(LocalStore::default_location)
            .map(LocalStore::new)
    }

    /// Fill in preferences saved in the local store that were not set explicitly.
    ///
    /// `explicit_service` is true when the service came from the command line.
    pub fn merge_saved(
        mut self,
        settings: &Settings,
        theme: Option<Theme>,
        explicit_service: bool,
    ) -> Self {
        self.show_timestamps = settings.show_timestamps;
        if !explicit_service {
            self.preferred_service = settings.preferred_service.clone();
        }
        if settings.health_interval_secs > 0 {
            self.health_interval = Duration::from_secs(settings.health_interval_secs);
        }
        if let Some(theme) = theme {
            self.theme = theme;
        }
        self
    }

    /// The settings blob that persists this configuration's preferences.
    pub fn settings(&self) -> Settings {
        Settings {
            show_timestamps: self.show_timestamps,
            preferred_service: self.preferred_service.clone(),
            health_interval_secs: self.health_interval.as_secs(),
        }
    }

    /// Build an HTTP client for this configuration.
    pub fn client(&self) -> Result<ChatClient> {
        ChatClient::with_options(self.base_url.clone(), Some(self.timeout))
    }

    /// Build a controller around `client` that draws on `surface`.
    pub fn controller(
        &self,
        client: ChatClient,
        surface: std::sync::Arc<dyn RenderSurface>,
    ) -> ChatSessionController<ChatClient> {
        let mut controller = ChatSessionController::new(client, surface)
            .with_preferred_service(self.preferred_service.clone())
            .with_history_limit(self.history_limit)
            .with_health_interval(self.health_interval);
        if let Some(chat_id) = &self.chat_id {
            controller = controller.with_chat_id(chat_id.clone());
        }
        if let Some(store) = self.local_store() {
            controller = controller.with_store(store);
        }
        controller
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            base_url: args.base_url,
            timeout: args
                .timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            preferred_service: args
                .service
                .map(|s| s.parse::<PreferredService>().unwrap_or_default())
                .unwrap_or_default(),
            history_limit: args.history_limit,
            cache_dir: args.cache_dir.map(PathBuf::from),
            use_cache: !args.no_cache,
            chat_id: args.chat_id.map(ChatId::new),
            use_color: !args.no_color,
            ..defaults
        }
    }
}
