//! Interactive terminal client for a chatline server.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a server on localhost:5000
//! chatline-chat
//!
//! # Point at another server and prefer a service
//! chatline-chat --base-url http://chat.internal:8080/ --service gemini
//!
//! # Keep the transcript backup under a fixed id
//! chatline-chat --chat-id chat_laptop --cache-dir ~/.chatline
//! ```
//!
//! Set `RUST_LOG=chatline=debug` to see request logs on stderr.
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/new [name]` - Start a new session
//! - `/switch <id>` - Switch sessions
//! - `/sessions` - List sessions
//! - `/quit` - Exit the application

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use chatline::chat::{
    ChatArgs, ChatCommand, ChatConfig, Palette, TerminalSurface, help_text, parse_command,
};
use chatline::{
    ChatClient, ChatSessionController, HistorySource, IgnoreReason, LocalStore, SendOutcome,
    Settings,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("chatline-chat [OPTIONS]");
    let explicit_service = args.service.is_some();
    let mut config = ChatConfig::from(args);
    let store = config.local_store();
    if let Some(store) = &store {
        let settings = store.load_settings().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring unreadable settings");
            Settings::default()
        });
        let theme = store.load_theme().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring unreadable theme preference");
            None
        });
        config = config.merge_saved(&settings, theme, explicit_service);
    }

    let surface = Arc::new(TerminalSurface::new(
        config.theme,
        config.use_color,
        config.show_timestamps,
    ));
    let client = config.client()?;
    println!("chatline ({})", client.base_url());
    println!("Type /help for commands, /quit to exit\n");

    let controller = config.controller(client, surface.clone());
    controller.initialize().await;
    controller.start_health_check();

    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline("You: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    if !run_command(cmd, &controller, &surface, &mut config, store.as_ref()).await
                    {
                        break;
                    }
                    continue;
                }

                match controller.send_message(line).await {
                    SendOutcome::Ignored(IgnoreReason::SendPending) => {
                        surface.print_info("Still waiting for the previous reply.");
                    }
                    SendOutcome::Ignored(IgnoreReason::Resyncing) => {
                        surface.print_info(
                            "The active session changed on the server; use /reload first.",
                        );
                    }
                    SendOutcome::Ignored(IgnoreReason::EmptyInput)
                    | SendOutcome::Answered
                    | SendOutcome::Failed(_) => {}
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!();
                break;
            }
            Err(err) => {
                surface.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    controller.stop_health_check();
    if let Err(err) = controller.persist_backup() {
        tracing::warn!(error = %err, "failed to save transcript backup");
    }
    println!("Goodbye!");
    Ok(())
}

/// Run one slash command.  Returns false when the REPL should exit.
async fn run_command(
    cmd: ChatCommand,
    controller: &ChatSessionController<ChatClient>,
    surface: &TerminalSurface,
    config: &mut ChatConfig,
    store: Option<&LocalStore>,
) -> bool {
    // Controller operations report their own failures through the surface.
    match cmd {
        ChatCommand::Quit => return false,
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::New(name) => {
            let _ = controller.create_new_session(name.as_deref()).await;
        }
        ChatCommand::Switch(id) => {
            let _ = controller.switch_session(id).await;
        }
        ChatCommand::Rename(id, name) => {
            let _ = controller.rename_session(id, &name).await;
        }
        ChatCommand::Delete(id) => {
            let _ = controller.delete_session(id).await;
        }
        ChatCommand::Sessions => {
            if let Err(err) = controller.refresh_sessions().await {
                surface.print_error(&format!("Could not refresh sessions: {err}"));
            }
            surface.print_sessions(&controller.view());
        }
        ChatCommand::Reload => match controller.load_chat_history().await {
            Ok(HistorySource::Server) => {}
            Ok(HistorySource::Cache) => {
                surface.print_info("Server unreachable; showing the local backup.");
            }
            Ok(HistorySource::Superseded) => {
                surface.print_info("The active session changed during the reload; try again.");
            }
            Err(err) => surface.print_error(&format!("Could not load history: {err}")),
        },
        ChatCommand::Stats => match controller.load_stats().await {
            Ok(stats) => surface.print_stats(&stats),
            Err(err) => surface.print_error(&format!("Could not load stats: {err}")),
        },
        ChatCommand::Service(service) => {
            controller.set_preferred_service(service.clone());
            surface.print_info(&format!("Preferred service set to {service}"));
            config.preferred_service = service;
            save_settings(store, config, surface);
        }
        ChatCommand::Theme(theme) => {
            surface.set_palette(Palette::new(theme, config.use_color));
            config.theme = theme;
            if let Some(store) = store
                && let Err(err) = store.save_theme(theme)
            {
                surface.print_error(&format!("Could not save theme: {err}"));
            }
            surface.print_info(&format!("Theme set to {theme}"));
        }
        ChatCommand::Timestamps(show) => {
            surface.set_show_timestamps(show);
            config.show_timestamps = show;
            save_settings(store, config, surface);
            if show {
                surface.print_info("Timestamps shown.");
            } else {
                surface.print_info("Timestamps hidden.");
            }
        }
        ChatCommand::Health => {
            let connectivity = controller.check_health().await;
            surface.print_info(&format!("Server is {connectivity}"));
        }
        ChatCommand::Invalid(message) => surface.print_error(&message),
    }
    true
}

fn save_settings(store: Option<&LocalStore>, config: &ChatConfig, surface: &TerminalSurface) {
    if let Some(store) = store
        && let Err(err) = store.save_settings(&config.settings())
    {
        surface.print_error(&format!("Could not save settings: {err}"));
    }
}
