//! Prints a streaming reply to a terminal.
//!
//! Text updates always extend what was shown before, so only the newly
//! appended suffix is written. Images become a one-line placeholder and are
//! optionally saved to disk.

use base64::Engine;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use ideal_stream::StreamUpdate;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::conversation::ChatMessage;

pub struct TerminalRenderer<W: Write> {
    out: W,
    image_dir: Option<PathBuf>,
    printed: String,
    images: usize,
    at_line_start: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, image_dir: Option<PathBuf>) -> Self {
        Self {
            out,
            image_dir,
            printed: String::new(),
            images: 0,
            at_line_start: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Resets per-reply state before a new turn.
    pub fn begin(&mut self) {
        self.printed.clear();
        self.images = 0;
        self.at_line_start = true;
    }

    pub fn on_update(&mut self, message: &ChatMessage, update: &StreamUpdate) -> io::Result<()> {
        match update {
            StreamUpdate::Text { text_so_far } => self.write_text(text_so_far),
            StreamUpdate::Image {
                data, mime_type, ..
            } => self.write_image(&message.id, data, mime_type),
        }
    }

    /// Completes the reply. A failed turn's error text is shown on its own
    /// line, after whatever partial text was already printed.
    pub fn finish(&mut self, final_text: &str, failed: bool) -> io::Result<()> {
        if failed {
            self.end_line()?;
            writeln!(
                self.out,
                "{}{}{}",
                SetForegroundColor(Color::Red),
                final_text,
                ResetColor
            )?;
            self.at_line_start = true;
        } else {
            self.write_text(final_text)?;
            self.end_line()?;
        }
        self.out.flush()
    }

    fn write_text(&mut self, text_so_far: &str) -> io::Result<()> {
        let suffix = match text_so_far.strip_prefix(self.printed.as_str()) {
            Some(suffix) => suffix,
            None => {
                // Not an extension of what is on screen; reprint in full
                debug!("Text update does not extend printed text, reprinting");
                self.end_line()?;
                self.printed.clear();
                text_so_far
            }
        };
        if suffix.is_empty() {
            return Ok(());
        }

        self.out.write_all(suffix.as_bytes())?;
        self.out.flush()?;
        self.at_line_start = suffix.ends_with('\n');
        self.printed.push_str(suffix);
        Ok(())
    }

    fn write_image(&mut self, message_id: &str, data: &str, mime_type: &str) -> io::Result<()> {
        self.images += 1;
        self.end_line()?;

        let bytes = match base64::engine::general_purpose::STANDARD.decode(data.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not decode {} image: {}", mime_type, e);
                writeln!(
                    self.out,
                    "{}[image: {}, undecodable]{}",
                    SetForegroundColor(Color::Yellow),
                    mime_type,
                    ResetColor
                )?;
                self.at_line_start = true;
                return Ok(());
            }
        };

        let saved = match &self.image_dir {
            Some(dir) => {
                let path = dir.join(image_file_name(message_id, self.images, mime_type));
                match std::fs::write(&path, &bytes) {
                    Ok(()) => Some(path),
                    Err(e) => {
                        warn!("Failed to save image to {}: {}", path.display(), e);
                        None
                    }
                }
            }
            None => None,
        };

        let location = saved
            .map(|path| format!(" -> {}", path.display()))
            .unwrap_or_default();
        writeln!(
            self.out,
            "{}[image: {}, {} bytes{}]{}",
            SetForegroundColor(Color::Cyan),
            mime_type,
            bytes.len(),
            location,
            ResetColor
        )?;
        self.at_line_start = true;
        self.out.flush()
    }

    fn end_line(&mut self) -> io::Result<()> {
        if !self.at_line_start {
            writeln!(self.out)?;
            self.at_line_start = true;
        }
        Ok(())
    }
}

/// `<message-id>-<n>.<ext>`, where the extension follows the mime subtype.
pub fn image_file_name(message_id: &str, index: usize, mime_type: &str) -> String {
    let extension = match mime_type {
        "image/jpeg" => "jpg",
        other => other
            .strip_prefix("image/")
            .filter(|subtype| !subtype.is_empty() && subtype.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("png"),
    };
    format!("{}-{}.{}", message_id, index, extension)
}
