//! The per-turn read loop: bytes in, stream updates out.
//!
//! `StreamProcessor` holds all state of one turn and is driven synchronously,
//! so tests can feed it synthetic chunk sequences. `consume_stream` drives it
//! from a transport byte stream.

use futures_util::StreamExt;
use ideal_config::DecodeFailurePolicy;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::buffer::{build_policy, BufferingPolicy};
use crate::error::StreamError;
use crate::event::{EventParser, LineEvent};
use crate::framer::LineFramer;
use crate::transport::ByteStream;
use crate::{StreamSettings, StreamUpdate};

/// Counters reported when a turn ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: usize,
    pub lines: usize,
    pub text_events: usize,
    pub images: usize,
    pub malformed_lines: usize,
    pub emissions: usize,
}

pub struct StreamProcessor {
    framer: LineFramer,
    parser: EventParser,
    decode_failures: DecodeFailurePolicy,
    buffer: Box<dyn BufferingPolicy>,
    stats: StreamStats,
}

impl StreamProcessor {
    /// `started` is when the response began streaming; the first emission
    /// interval is measured from it.
    pub fn new(settings: &StreamSettings, started: Instant) -> Self {
        Self {
            framer: LineFramer::new(),
            parser: EventParser::new(settings.image_mime_types.clone()),
            decode_failures: settings.decode_failures,
            buffer: build_policy(settings.buffering, settings.buffer, started),
            stats: StreamStats::default(),
        }
    }

    /// Text emitted so far in this turn.
    pub fn accumulated(&self) -> &str {
        self.buffer.accumulated()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Processes one raw chunk from the transport.
    pub fn push_chunk(
        &mut self,
        chunk: &[u8],
        now: Instant,
        on_update: &mut impl FnMut(StreamUpdate),
    ) {
        self.stats.chunks += 1;
        for line in self.framer.push(chunk) {
            self.handle_line(&line, now, on_update);
        }
    }

    /// Timer path: lets the buffer flush pending text when no chunk arrived.
    pub fn poll(&mut self, now: Instant, on_update: &mut impl FnMut(StreamUpdate)) {
        if let Some(text) = self.buffer.poll(now) {
            self.stats.emissions += 1;
            on_update(StreamUpdate::Text {
                text_so_far: text.to_string(),
            });
        }
    }

    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.buffer.next_deadline(now)
    }

    /// Ends the turn: parses the trailing unterminated line, flushes all
    /// pending text regardless of markdown safety, and returns the final text.
    pub fn finish(mut self, on_update: &mut impl FnMut(StreamUpdate)) -> String {
        if let Some(line) = self.framer.finish() {
            debug!("Parsing unterminated final line");
            self.handle_line(&line, Instant::now(), on_update);
        }

        if let Some(text) = self.buffer.finish() {
            self.stats.emissions += 1;
            on_update(StreamUpdate::Text {
                text_so_far: text.to_string(),
            });
        }

        debug!(
            chunks = self.stats.chunks,
            lines = self.stats.lines,
            text_events = self.stats.text_events,
            images = self.stats.images,
            malformed_lines = self.stats.malformed_lines,
            emissions = self.stats.emissions,
            buffering = self.buffer.name(),
            "Stream finished"
        );

        self.buffer.accumulated().to_string()
    }

    fn handle_line(&mut self, line: &str, now: Instant, on_update: &mut impl FnMut(StreamUpdate)) {
        let event = match self.parser.parse(line) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(failure) => {
                self.stats.malformed_lines += 1;
                match self.decode_failures {
                    DecodeFailurePolicy::Discard => {
                        warn!("Discarding undecodable stream line: {}", failure);
                        return;
                    }
                    DecodeFailurePolicy::Literal => {
                        warn!("Appending undecodable stream line as text: {}", failure);
                        LineEvent::Text(failure.line)
                    }
                }
            }
        };
        self.stats.lines += 1;

        match event {
            LineEvent::Text(content) => {
                self.stats.text_events += 1;
                if let Some(text) = self.buffer.on_text(&content, now) {
                    self.stats.emissions += 1;
                    on_update(StreamUpdate::Text {
                        text_so_far: text.to_string(),
                    });
                }
            }
            LineEvent::Image { data, mime_type } => {
                self.stats.images += 1;
                self.stats.emissions += 1;
                debug!(mime_type = %mime_type, bytes = data.len(), "Passing image through");
                on_update(StreamUpdate::Image {
                    text_so_far: self.buffer.accumulated().to_string(),
                    data,
                    mime_type,
                });
            }
            LineEvent::Ignored => {}
        }
    }
}

enum Step {
    Chunk(Option<Result<bytes::Bytes, StreamError>>),
    Tick,
    Cancelled,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Reads `stream` to its end, feeding every chunk through `processor`.
///
/// A transport error aborts the turn; updates already delivered stay
/// delivered. Cancellation ends the turn early with a terminal flush.
pub async fn consume_stream(
    mut stream: ByteStream,
    mut processor: StreamProcessor,
    cancel: &CancellationToken,
    on_update: &mut impl FnMut(StreamUpdate),
) -> Result<String, StreamError> {
    loop {
        if cancel.is_cancelled() {
            debug!("Turn cancelled, flushing what was received");
            break;
        }

        let deadline = processor.next_deadline(Instant::now());
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            chunk = stream.next() => Step::Chunk(chunk),
            _ = wait_until(deadline) => Step::Tick,
        };

        match step {
            Step::Chunk(Some(Ok(chunk))) => {
                processor.push_chunk(&chunk, Instant::now(), on_update);
            }
            Step::Chunk(Some(Err(e))) => {
                return Err(e);
            }
            Step::Chunk(None) => {
                debug!("Received end of stream");
                break;
            }
            Step::Tick => processor.poll(Instant::now(), on_update),
            Step::Cancelled => {
                debug!("Turn cancelled, flushing what was received");
                break;
            }
        }
    }

    Ok(processor.finish(on_update))
}
