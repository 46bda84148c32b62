//! Terminal front end for chatline.
//!
//! This module provides a REPL chat interface built on top of the
//! [`ChatSessionController`](crate::ChatSessionController). It supports:
//!
//! - Session management through slash commands
//! - ANSI-styled output with light and dark themes
//! - Configuration from the command line and the local store
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing
//! - [`render`]: The terminal render surface

mod commands;
mod config;
mod render;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use render::{Palette, TerminalSurface, format_message, format_sessions, format_stats};
