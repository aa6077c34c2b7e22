//! Wire format of the chat stream: one JSON object per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseFailure;

pub const ASSISTANT_ROLE: &str = "assistant";
pub const START_SENTINEL: &str = "START";
pub const END_SENTINEL: &str = "END";

/// One decoded response line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl StreamEvent {
    pub fn assistant(content: &str) -> Self {
        Self {
            role: ASSISTANT_ROLE.to_string(),
            content: content.to_string(),
            mime_type: None,
        }
    }

    pub fn image(data: &str, mime_type: &str) -> Self {
        Self {
            role: ASSISTANT_ROLE.to_string(),
            content: data.to_string(),
            mime_type: Some(mime_type.to_string()),
        }
    }

    /// Reads an event out of any JSON value. Returns `None` unless the value
    /// is an object whose `role` and `content` are both strings.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let Some(Value::String(role)) = fields.remove("role") else {
            return None;
        };
        let Some(Value::String(content)) = fields.remove("content") else {
            return None;
        };
        let mime_type = match fields.remove("mimeType") {
            Some(Value::String(mime_type)) => Some(mime_type),
            _ => None,
        };
        Some(Self {
            role,
            content,
            mime_type,
        })
    }

    pub fn is_sentinel(&self) -> bool {
        self.content == START_SENTINEL || self.content == END_SENTINEL
    }
}

/// What a decoded line means to the stream consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Assistant text to accumulate
    Text(String),
    /// Base64 image payload, passed straight through to the caller
    Image { data: String, mime_type: String },
    /// Valid event with nothing to render: other roles, sentinels, empty content
    Ignored,
}

/// Classifies response lines. Holds the set of mime types treated as images.
#[derive(Debug, Clone)]
pub struct EventParser {
    image_mime_types: Vec<String>,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new(vec!["image/png".to_string()])
    }
}

impl EventParser {
    pub fn new(image_mime_types: Vec<String>) -> Self {
        Self { image_mime_types }
    }

    /// Parses one line. Blank lines yield `Ok(None)`. Only text that is not
    /// JSON at all is a failure; valid JSON of any other shape is ignored.
    pub fn parse(&self, line: &str) -> Result<Option<LineEvent>, ParseFailure> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(line).map_err(|source| ParseFailure {
            line: line.to_string(),
            source,
        })?;

        let event = match StreamEvent::from_value(value) {
            Some(event) => self.classify(event),
            None => LineEvent::Ignored,
        };
        Ok(Some(event))
    }

    pub fn classify(&self, event: StreamEvent) -> LineEvent {
        if event.role != ASSISTANT_ROLE || event.content.is_empty() {
            return LineEvent::Ignored;
        }

        if let Some(mime_type) = event.mime_type.as_deref() {
            if self.is_image_type(mime_type) {
                return LineEvent::Image {
                    data: event.content,
                    mime_type: mime_type.to_string(),
                };
            }
        }

        if event.is_sentinel() {
            return LineEvent::Ignored;
        }

        LineEvent::Text(event.content)
    }

    fn is_image_type(&self, mime_type: &str) -> bool {
        self.image_mime_types.iter().any(|t| t == mime_type)
    }
}
