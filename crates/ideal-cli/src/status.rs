//! Colored `ideal:` status lines and the interactive prompt.

use crossterm::style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};

pub struct Status;

impl Status {
    /// `ideal: <message>` with a bold green tag.
    pub fn info(message: &str) {
        println!(
            "{}{}ideal:{}{} {}",
            SetAttribute(Attribute::Bold),
            SetForegroundColor(Color::Green),
            ResetColor,
            SetAttribute(Attribute::Reset),
            message
        );
    }

    pub fn session(session_id: Option<&str>, transport: &str) {
        match session_id {
            Some(id) => Self::info(&format!(
                "session {}{}{} via {}",
                SetForegroundColor(Color::Cyan),
                id,
                ResetColor,
                transport
            )),
            None => Self::info(&format!("no session (via {})", transport)),
        }
    }
}

/// Builds the interactive prompt: `ideal> `, or `ideal | <session>> ` with
/// the session shown in blue.
///
/// ANSI codes are wrapped in \x01...\x02 so rustyline leaves them out of the
/// visible prompt width.
pub fn build_prompt(session_id: Option<&str>) -> String {
    let green = format!("\x01{}\x02", SetForegroundColor(Color::Green));
    let blue = format!("\x01{}\x02", SetForegroundColor(Color::Blue));
    let reset = format!("\x01{}\x02", ResetColor);
    match session_id {
        Some(id) => {
            let short: String = id.chars().take(12).collect();
            format!("{}ideal{} {}| {}>{} ", green, reset, blue, short, reset)
        }
        None => format!("{}ideal>{} ", green, reset),
    }
}
