//! Slash command parsing for the chat application.
//!
//! Input that starts with `/` controls sessions and local preferences instead of being sent to
//! the server as a chat message.

use crate::types::{PreferredService, SessionId, Theme};

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Create a session, optionally named, and switch to it.
    New(Option<String>),

    /// Switch to an existing session.
    Switch(SessionId),

    /// Rename a session.
    Rename(SessionId, String),

    /// Delete a session.
    Delete(SessionId),

    /// List sessions.
    Sessions,

    /// Reload the transcript from the server.
    Reload,

    /// Show usage statistics.
    Stats,

    /// Change the service selector.
    Service(PreferredService),

    /// Change the color theme.
    Theme(Theme),

    /// Show or hide message timestamps.
    Timestamps(bool),

    /// Probe the server now.
    Health,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be sent as a
/// chat message.
///
/// # Examples
///
/// ```
/// # use chatline::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/switch 3").is_some());
/// assert!(parse_command("What is a monad?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" => ChatCommand::New(argument.map(String::from)),
        "switch" => match argument.map(parse_session_id) {
            Some(Ok(id)) => ChatCommand::Switch(id),
            Some(Err(err)) => ChatCommand::Invalid(format!("/switch {err}")),
            None => ChatCommand::Invalid("/switch requires a session id".to_string()),
        },
        "rename" => parse_rename(argument),
        "delete" => match argument.map(parse_session_id) {
            Some(Ok(id)) => ChatCommand::Delete(id),
            Some(Err(err)) => ChatCommand::Invalid(format!("/delete {err}")),
            None => ChatCommand::Invalid("/delete requires a session id".to_string()),
        },
        "sessions" | "ls" => ChatCommand::Sessions,
        "reload" => ChatCommand::Reload,
        "stats" => ChatCommand::Stats,
        "service" => match argument {
            Some(service) => match service.parse::<PreferredService>() {
                Ok(service) => ChatCommand::Service(service),
                Err(never) => match never {},
            },
            None => ChatCommand::Invalid("/service requires a service name".to_string()),
        },
        "theme" => match argument.map(str::parse::<Theme>) {
            Some(Ok(theme)) => ChatCommand::Theme(theme),
            Some(Err(err)) => ChatCommand::Invalid(format!("/theme {err}")),
            None => ChatCommand::Invalid("/theme expects light, dark, or auto".to_string()),
        },
        "timestamps" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Timestamps(value),
            None => ChatCommand::Invalid("/timestamps expects 'on' or 'off'".to_string()),
        },
        "health" => ChatCommand::Health,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_rename(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/rename requires a session id and a name".to_string());
    };
    let mut parts = arg.splitn(2, char::is_whitespace);
    let id = match parts.next().map(parse_session_id) {
        Some(Ok(id)) => id,
        Some(Err(err)) => return ChatCommand::Invalid(format!("/rename {err}")),
        None => return ChatCommand::Invalid("/rename requires a session id".to_string()),
    };
    match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => ChatCommand::Rename(id, name.to_string()),
        None => ChatCommand::Invalid("/rename requires a new name".to_string()),
    }
}

fn parse_session_id(value: &str) -> Result<SessionId, String> {
    value
        .parse::<SessionId>()
        .map_err(|_| format!("expects a numeric session id, got {value:?}"))
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new [name]            Start a new chat session (default name: New Chat)
  /switch <id>           Switch to another session
  /rename <id> <name>    Rename a session
  /delete <id>           Delete a session
  /sessions              List sessions
  /reload                Reload the transcript from the server
  /stats                 Show usage statistics
  /service <name>        Prefer a service (auto, gemini, deepseek, ...)
  /theme <mode>          Set the color theme (light, dark, auto)
  /timestamps on|off     Show or hide message timestamps
  /health                Check the server now
  /help                  Show this help message
  /quit                  Exit the chat"#
}
