//! Interactive mode for the ideal CLI.

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::path::PathBuf;
use tracing::error;

use crate::conversation::{ChatMessage, Conversation};
use crate::render::TerminalRenderer;
use crate::status::{build_prompt, Status};
use crate::turn::run_turn;

/// What the loop should do after a line of input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    NewChat,
    History,
    Help,
    Quit,
    Unknown(&'a str),
    Message(&'a str),
}

fn parse_command(input: &str) -> Command<'_> {
    match input {
        "/new" => Command::NewChat,
        "/history" => Command::History,
        "/help" => Command::Help,
        "/quit" | "/exit" | "exit" | "quit" => Command::Quit,
        other if other.starts_with('/') => Command::Unknown(other),
        other => Command::Message(other),
    }
}

/// Formats the transcript for `/history`.
pub fn format_history(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&format!(
            "[{}] {}: {}\n",
            message.timestamp.format("%H:%M"),
            message.sender.label(),
            message.text
        ));
        for image in &message.images {
            out.push_str(&format!("    [image: {}]\n", image.mime_type));
        }
    }
    out
}

fn print_help() {
    println!();
    println!("Commands:");
    println!("  /new      - Start a new chat (new session, empty transcript)");
    println!("  /history  - Show the conversation so far");
    println!("  /help     - Show this help message");
    println!("  /quit     - Exit");
    println!();
}

/// Run interactive mode until the user quits.
pub async fn run_interactive(mut conversation: Conversation, image_dir: Option<PathBuf>) -> Result<()> {
    println!();
    println!("ideal chat");
    println!("      >> ask me anything (/help for commands)");
    println!();

    if conversation.session_id().is_none() {
        conversation.new_chat().await;
    }
    Status::session(conversation.session_id(), conversation.client().transport_name());

    let mut rl = DefaultEditor::new()?;
    let history_file = dirs::home_dir().map(|mut path| {
        path.push(".ideal_history");
        path
    });
    if let Some(ref history_path) = history_file {
        let _ = rl.load_history(history_path);
    }

    let mut renderer = TerminalRenderer::new(std::io::stdout(), image_dir);

    loop {
        let prompt = build_prompt(conversation.session_id());
        match rl.readline(&prompt) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(input)?;

                match parse_command(input) {
                    Command::NewChat => {
                        conversation.new_chat().await;
                        Status::session(
                            conversation.session_id(),
                            conversation.client().transport_name(),
                        );
                    }
                    Command::History => {
                        if conversation.messages().is_empty() {
                            Status::info("no messages yet");
                        } else {
                            print!("{}", format_history(conversation.messages()));
                        }
                    }
                    Command::Help => print_help(),
                    Command::Quit => break,
                    Command::Unknown(command) => {
                        println!(
                            "{}Unknown command: {}{} (try /help)",
                            SetForegroundColor(Color::Yellow),
                            command,
                            ResetColor
                        );
                    }
                    Command::Message(text) => {
                        if let Err(e) = run_turn(&mut conversation, &mut renderer, text).await {
                            error!("Failed to render reply: {}", e);
                        }
                        let _ = std::io::stdout().flush();
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                error!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(ref history_path) = history_file {
        let _ = rl.save_history(history_path);
    }

    println!("Goodbye!");
    Ok(())
}
