//! Streaming decoder for the IDEAL chat endpoint.
//!
//! Turns a network-fragmented body of newline-delimited JSON events into a
//! sequence of display-safe text updates, with image payloads passed straight
//! through:
//!
//! transport bytes → [`framer`] → [`event`] → [`buffer`] / image passthrough → caller
//!
//! [`ChatClient::send_message`] is the entry point for one assistant turn.

pub mod buffer;
pub mod client;
pub mod error;
pub mod event;
pub mod framer;
pub mod markdown;
pub mod mock;
pub mod processor;
pub mod transport;

pub use buffer::{BufferSettings, BufferingPolicy, ImmediateBuffer, MarkdownSafeBuffer, SentenceBuffer};
pub use client::{ChatClient, TurnPhase};
pub use error::{ParseFailure, StreamError};
pub use event::{EventParser, LineEvent, StreamEvent};
pub use framer::{frame, LineFramer};
pub use markdown::{find_cut, find_fence_cut, is_safe};
pub use mock::{MockReply, MockTransport};
pub use processor::{consume_stream, StreamProcessor, StreamStats};
pub use transport::{ByteStream, ChatTransport, HttpTransport};

use ideal_config::{BufferingStrategy, DecodeFailurePolicy, StreamConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of `POST /chat/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            message: message.into(),
            session_id,
        }
    }
}

/// One emission to the caller. Text updates carry the whole reply so far,
/// which only ever grows by appending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    Text {
        text_so_far: String,
    },
    /// An inline image; `text_so_far` is unchanged by it
    Image {
        text_so_far: String,
        data: String,
        mime_type: String,
    },
}

impl StreamUpdate {
    pub fn text_so_far(&self) -> &str {
        match self {
            StreamUpdate::Text { text_so_far } | StreamUpdate::Image { text_so_far, .. } => {
                text_so_far
            }
        }
    }
}

/// Everything that shapes how one turn is decoded and emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub buffering: BufferingStrategy,
    pub buffer: BufferSettings,
    pub decode_failures: DecodeFailurePolicy,
    pub image_mime_types: Vec<String>,
    pub error_message: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for StreamSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            buffering: config.buffering,
            buffer: BufferSettings {
                emit_interval: Duration::from_millis(config.emit_interval_ms),
                max_pending_chars: config.max_pending_chars,
            },
            decode_failures: config.decode_failures,
            image_mime_types: config.image_mime_types.clone(),
            error_message: config.error_message.clone(),
        }
    }
}
