//! Scripted transport for tests and offline demos.
//!
//! Speaks the same newline-delimited JSON format as the real endpoint, so the
//! whole decoding pipeline runs unchanged against it.
//!
//! ```rust,ignore
//! use ideal_stream::mock::{MockReply, MockTransport};
//!
//! let transport = MockTransport::new()
//!     .with_reply(MockReply::lines([
//!         r#"{"role":"assistant","content":"Hello"}"#,
//!         r#"{"role":"assistant","content":" world."}"#,
//!     ]))
//!     .with_reply(MockReply::Status(500));
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::error::StreamError;
use crate::event::{StreamEvent, END_SENTINEL, START_SENTINEL};
use crate::transport::{ByteStream, ChatTransport};
use crate::ChatRequest;

/// Replies used by the demo mode. `{message}` is replaced by the user's text.
const CANNED_RESPONSES: [&str; 5] = [
    "Hello! I'm an AI assistant. I'm here to help you with any questions or tasks you might have.",
    "I understand you said: \"{message}\". That's an interesting topic to discuss.",
    "I can help you with various tasks like answering questions, providing information, writing, coding, and much more.",
    "Feel free to ask me anything you'd like to know or any task you'd like assistance with.",
    "I'm designed to be helpful, harmless, and honest in all my interactions.",
];

/// Pause before each chunk is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkDelay {
    #[default]
    None,
    Fixed(Duration),
    /// Uniformly random between the bounds (inclusive)
    Jitter { min: Duration, max: Duration },
}

impl ChunkDelay {
    fn sample(self) -> Duration {
        match self {
            ChunkDelay::None => Duration::ZERO,
            ChunkDelay::Fixed(delay) => delay,
            ChunkDelay::Jitter { min, max } if max > min => {
                let millis = rand::thread_rng()
                    .gen_range(min.as_millis() as u64..=max.as_millis() as u64);
                Duration::from_millis(millis)
            }
            ChunkDelay::Jitter { min, .. } => min,
        }
    }
}

/// One scripted answer to `open_stream`.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Success status, then the given body chunks
    Chunks { chunks: Vec<Bytes>, delay: ChunkDelay },
    /// Non-success status
    Status(u16),
    /// Success status without a readable body
    NoBody,
    /// Delivers the chunks, then fails the connection
    BrokenAfter(Vec<Bytes>),
}

impl MockReply {
    /// Each line, newline-terminated, as its own chunk.
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chunks = lines
            .into_iter()
            .map(|line| Bytes::from(format!("{}\n", line.as_ref())))
            .collect();
        MockReply::Chunks {
            chunks,
            delay: ChunkDelay::None,
        }
    }

    /// Serializes each event onto its own line.
    pub fn events(events: &[StreamEvent]) -> Self {
        Self::lines(events.iter().map(|event| {
            serde_json::to_string(event).unwrap_or_default()
        }))
    }

    /// A raw body cut into `chunk_size`-byte pieces, ignoring line and
    /// character boundaries.
    pub fn raw(body: &[u8], chunk_size: usize) -> Self {
        let chunks = body
            .chunks(chunk_size.max(1))
            .map(Bytes::copy_from_slice)
            .collect();
        MockReply::Chunks {
            chunks,
            delay: ChunkDelay::None,
        }
    }

    pub fn with_delay(self, delay: ChunkDelay) -> Self {
        match self {
            MockReply::Chunks { chunks, .. } => MockReply::Chunks { chunks, delay },
            other => other,
        }
    }
}

/// The canned reply at `index` (wrapping), with the user's message filled in.
pub fn canned_response(message: &str, index: usize) -> String {
    CANNED_RESPONSES[index % CANNED_RESPONSES.len()].replace("{message}", message)
}

/// A canned reply as the server would stream it: `START`, one event per word,
/// then `END`.
pub fn canned_events(message: &str, index: usize) -> Vec<StreamEvent> {
    let response = canned_response(message, index);
    let mut events = vec![StreamEvent::assistant(START_SENTINEL)];
    for (i, word) in response.split(' ').enumerate() {
        let content = if i == 0 {
            word.to_string()
        } else {
            format!(" {}", word)
        };
        events.push(StreamEvent::assistant(&content));
    }
    events.push(StreamEvent::assistant(END_SENTINEL));
    events
}

pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ChatRequest>>,
    demo: bool,
    fail_sessions: bool,
    session_counter: AtomicU64,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A transport that answers only with scripted replies.
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            demo: false,
            fail_sessions: false,
            session_counter: AtomicU64::new(1),
        }
    }

    /// A transport that answers every request with a random canned reply,
    /// word by word, 80 to 120 ms apart.
    pub fn demo() -> Self {
        Self {
            demo: true,
            ..Self::new()
        }
    }

    pub fn with_reply(self, reply: MockReply) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
        self
    }

    pub fn with_failing_sessions(mut self) -> Self {
        self.fail_sessions = true;
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_reply(&self, request: &ChatRequest) -> Option<MockReply> {
        let scripted = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if scripted.is_some() || !self.demo {
            return scripted;
        }

        let index = rand::thread_rng().gen_range(0..CANNED_RESPONSES.len());
        let reply = MockReply::events(&canned_events(&request.message, index)).with_delay(
            ChunkDelay::Jitter {
                min: Duration::from_millis(80),
                max: Duration::from_millis(120),
            },
        );
        Some(reply)
    }
}

fn spawn_body(chunks: Vec<Bytes>, delay: ChunkDelay, fail_at_end: bool) -> ByteStream {
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        for chunk in chunks {
            let pause = delay.sample();
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            if tx.send(Ok(chunk)).await.is_err() {
                debug!("Receiver dropped, stopping mock stream");
                return;
            }
        }
        if fail_at_end {
            let _ = tx
                .send(Err(StreamError::Transport("connection reset".to_string())))
                .await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, StreamError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        match self.next_reply(request) {
            Some(MockReply::Chunks { chunks, delay }) => Ok(spawn_body(chunks, delay, false)),
            Some(MockReply::BrokenAfter(chunks)) => Ok(spawn_body(chunks, ChunkDelay::None, true)),
            Some(MockReply::Status(status)) => Err(StreamError::Status {
                status,
                body: "mock error".to_string(),
            }),
            Some(MockReply::NoBody) => Err(StreamError::MissingBody),
            None => Err(StreamError::Transport("no scripted reply left".to_string())),
        }
    }

    async fn create_session(&self) -> Result<String, StreamError> {
        if self.fail_sessions {
            return Err(StreamError::Status {
                status: 503,
                body: "mock session failure".to_string(),
            });
        }
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-session-{}", n))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
