//! Terminal output for the chat application.
//!
//! [`TerminalSurface`] implements [`RenderSurface`] by printing only what changed since the last
//! snapshot: new messages are appended, and a replaced transcript (a session switch, a reload) is
//! printed again under a session header.  Colors follow the selected [`Theme`].

use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use time::macros::format_description;

use crate::render::{ChatView, Notification, NotificationLevel, RenderSurface};
use crate::types::{AiStatus, Connectivity, Message, MessageId, Origin, Sender, Theme, UsageStats};

/// ANSI escape code for dim text (used for metadata).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for headers).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

const ANSI_CYAN: &str = "\x1b[36m";
const ANSI_BLUE: &str = "\x1b[34m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_MAGENTA: &str = "\x1b[35m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";

/// Escape sequences for each kind of output.  Every field is empty when color is off.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Palette {
    user: &'static str,
    bot: &'static str,
    meta: &'static str,
    header: &'static str,
    success: &'static str,
    info: &'static str,
    error: &'static str,
    reset: &'static str,
}

impl Palette {
    /// The palette for `theme`, or a colorless one.
    pub fn new(theme: Theme, use_color: bool) -> Self {
        if !use_color {
            return Self::plain();
        }
        let (user, bot) = match theme {
            Theme::Light => (ANSI_BLUE, ANSI_MAGENTA),
            Theme::Dark | Theme::Auto => (ANSI_CYAN, ANSI_GREEN),
        };
        Self {
            user,
            bot,
            meta: ANSI_DIM,
            header: ANSI_BOLD,
            success: ANSI_GREEN,
            info: ANSI_YELLOW,
            error: ANSI_RED,
            reset: ANSI_RESET,
        }
    }

    /// A palette that emits no escape codes.
    pub fn plain() -> Self {
        Self {
            user: "",
            bot: "",
            meta: "",
            header: "",
            success: "",
            info: "",
            error: "",
            reset: "",
        }
    }
}

/// Format one transcript message as a line of terminal output.
pub fn format_message(message: &Message, palette: &Palette, show_timestamps: bool) -> String {
    let stamp = if show_timestamps {
        let format = format_description!("[hour]:[minute]");
        match message.timestamp.format(format) {
            Ok(stamp) => format!(" {}[{stamp}]{}", palette.meta, palette.reset),
            Err(_) => String::new(),
        }
    } else {
        String::new()
    };
    match (message.sender, message.origin) {
        (Sender::User, _) => format!(
            "{}You{}{stamp}: {}",
            palette.user, palette.reset, message.text
        ),
        (Sender::Bot, Origin::Synthetic) if message.ai_service.as_deref() == Some("error") => {
            format!("{}{}{}", palette.error, message.text, palette.reset)
        }
        (Sender::Bot, Origin::Synthetic) => {
            format!("{}{}{}", palette.meta, message.text, palette.reset)
        }
        (Sender::Bot, _) => {
            let service = message
                .ai_service
                .as_deref()
                .map(|s| format!(" {}({s}){}", palette.meta, palette.reset))
                .unwrap_or_default();
            format!(
                "{}Bot{}{service}{stamp}: {}",
                palette.bot, palette.reset, message.text
            )
        }
    }
}

/// Format the session list, marking the active session.
pub fn format_sessions(view: &ChatView, palette: &Palette) -> String {
    if view.sessions.is_empty() {
        return "    (no sessions)".to_string();
    }
    let mut out = String::new();
    for session in &view.sessions {
        let marker = if Some(session.id) == view.active_session {
            "*"
        } else {
            " "
        };
        out.push_str(&format!(
            "  {marker} {:>4}  {}  {}({} messages){}\n",
            session.id.get(),
            session.name,
            palette.meta,
            session.message_count,
            palette.reset
        ));
    }
    out.pop();
    out
}

/// Format usage counters.
pub fn format_stats(stats: &UsageStats) -> String {
    format!(
        "    Usage Statistics:\n      Users: {}\n      Sessions: {} ({} yours)\n      \
         Messages: {} ({} yours)",
        stats.users, stats.sessions, stats.user_sessions, stats.messages, stats.user_messages
    )
}

#[derive(Default)]
struct Printed {
    messages: Vec<MessageId>,
    ai_status: AiStatus,
}

/// Render surface that writes to a terminal.
pub struct TerminalSurface {
    out: Mutex<Box<dyn Write + Send>>,
    palette: Mutex<Palette>,
    show_timestamps: AtomicBool,
    printed: Mutex<Printed>,
}

impl TerminalSurface {
    /// Creates a surface writing to stdout.
    pub fn new(theme: Theme, use_color: bool, show_timestamps: bool) -> Self {
        Self::with_writer(
            Box::new(io::stdout()),
            Palette::new(theme, use_color),
            show_timestamps,
        )
    }

    /// Creates a surface writing to `out`.
    pub fn with_writer(
        out: Box<dyn Write + Send>,
        palette: Palette,
        show_timestamps: bool,
    ) -> Self {
        Self {
            out: Mutex::new(out),
            palette: Mutex::new(palette),
            show_timestamps: AtomicBool::new(show_timestamps),
            printed: Mutex::new(Printed::default()),
        }
    }

    /// Switch palettes; affects output from now on.
    pub fn set_palette(&self, palette: Palette) {
        *self.palette.lock().unwrap_or_else(|p| p.into_inner()) = palette;
    }

    /// Show or hide timestamps from now on.
    pub fn set_show_timestamps(&self, show: bool) {
        self.show_timestamps.store(show, Ordering::Relaxed);
    }

    /// Print the session list.
    pub fn print_sessions(&self, view: &ChatView) {
        let palette = self.palette();
        self.write_line(&format_sessions(view, &palette));
    }

    /// Print usage counters.
    pub fn print_stats(&self, stats: &UsageStats) {
        self.write_line(&format_stats(stats));
    }

    /// Print an informational line.
    pub fn print_info(&self, info: &str) {
        self.notify(&Notification::info(info));
    }

    /// Print an error line.
    pub fn print_error(&self, error: &str) {
        self.notify(&Notification::error(error));
    }

    fn palette(&self) -> Palette {
        *self.palette.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

impl RenderSurface for TerminalSurface {
    fn render(&self, view: &ChatView) {
        let palette = self.palette();
        let show_timestamps = self.show_timestamps.load(Ordering::Relaxed);
        let current: Vec<&Message> = view.messages().collect();

        let mut lines = Vec::new();
        {
            let mut printed = self.printed.lock().unwrap_or_else(|p| p.into_inner());
            let extends = printed.messages.len() <= current.len()
                && printed
                    .messages
                    .iter()
                    .zip(current.iter())
                    .all(|(id, message)| *id == message.id);
            let start = if extends {
                printed.messages.len()
            } else {
                let header = match view.active_session_info() {
                    Some(session) => format!("── {} ──", session.name),
                    None => "── chat ──".to_string(),
                };
                lines.push(format!("{}{header}{}", palette.header, palette.reset));
                0
            };
            for message in &current[start..] {
                // The user already sees what they typed.
                if message.origin == Origin::LocalEcho {
                    continue;
                }
                lines.push(format_message(message, &palette, show_timestamps));
            }
            printed.messages = current.iter().map(|m| m.id.clone()).collect();

            if view.ai_status != printed.ai_status {
                if view.ai_status == AiStatus::Thinking {
                    lines.push(format!("{}thinking…{}", palette.meta, palette.reset));
                }
                printed.ai_status = view.ai_status;
            }
        }
        for line in lines {
            self.write_line(&line);
        }
    }

    fn notify(&self, notification: &Notification) {
        let palette = self.palette();
        let color = match notification.level {
            NotificationLevel::Success => palette.success,
            NotificationLevel::Info => palette.info,
            NotificationLevel::Error => palette.error,
        };
        self.write_line(&format!("{color}{}{}", notification.message, palette.reset));
    }

    fn connectivity_changed(&self, connectivity: Connectivity) {
        let palette = self.palette();
        let color = match connectivity {
            Connectivity::Online => palette.success,
            Connectivity::Offline => palette.error,
        };
        self.write_line(&format!("{color}[{connectivity}]{}", palette.reset));
    }
}
