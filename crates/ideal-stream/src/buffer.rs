//! Buffering policies: decide when accumulated assistant text is shown.
//!
//! Every policy owns the accumulated text of one turn, which only ever grows
//! by appending. A flush returns the whole accumulated text so the caller can
//! replace what it displays.

use ideal_config::BufferingStrategy;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::markdown::{find_cut, find_fence_cut, is_safe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSettings {
    /// Minimum gap between two non-terminal emissions
    pub emit_interval: Duration,
    /// Pending text longer than this (in chars) is flushed regardless of safety
    pub max_pending_chars: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            emit_interval: Duration::from_millis(100),
            max_pending_chars: 150,
        }
    }
}

pub trait BufferingPolicy: Send {
    /// Accepts new text. Returns the full accumulated text if this caused a flush.
    fn on_text(&mut self, content: &str, now: Instant) -> Option<&str>;

    /// Re-evaluates pending text without new input (timer path).
    fn poll(&mut self, _now: Instant) -> Option<&str> {
        None
    }

    /// When the caller should `poll` next if no new text arrives before then.
    fn next_deadline(&self, _now: Instant) -> Option<Instant> {
        None
    }

    /// Terminal flush: moves everything pending into the accumulated text.
    /// Returns the accumulated text if anything was pending.
    fn finish(&mut self) -> Option<&str>;

    /// Text emitted so far.
    fn accumulated(&self) -> &str;

    fn name(&self) -> &'static str;
}

pub fn build_policy(
    strategy: BufferingStrategy,
    settings: BufferSettings,
    started: Instant,
) -> Box<dyn BufferingPolicy> {
    match strategy {
        BufferingStrategy::MarkdownSafe => Box::new(MarkdownSafeBuffer::new(settings, started)),
        BufferingStrategy::Sentence => Box::new(SentenceBuffer::new(settings, started)),
        BufferingStrategy::Immediate => Box::new(ImmediateBuffer::new()),
    }
}

/// State shared by the rate-limited policies.
#[derive(Debug)]
struct TextBuffer {
    settings: BufferSettings,
    accumulated: String,
    pending: String,
    pending_chars: usize,
    last_emit: Instant,
}

impl TextBuffer {
    fn new(settings: BufferSettings, started: Instant) -> Self {
        Self {
            settings,
            accumulated: String::new(),
            pending: String::new(),
            pending_chars: 0,
            last_emit: started,
        }
    }

    fn append(&mut self, content: &str) {
        self.pending.push_str(content);
        self.pending_chars += content.chars().count();
    }

    /// True while the interval has not passed and the cap is not reached.
    fn should_hold(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_emit) < self.settings.emit_interval
            && self.pending_chars < self.settings.max_pending_chars
    }

    fn over_cap(&self) -> bool {
        self.pending_chars > self.settings.max_pending_chars
    }

    fn candidate_is_safe(&self) -> bool {
        let mut candidate = String::with_capacity(self.accumulated.len() + self.pending.len());
        candidate.push_str(&self.accumulated);
        candidate.push_str(&self.pending);
        is_safe(&candidate)
    }

    /// Moves the first `len` bytes of pending into accumulated.
    fn flush_prefix(&mut self, len: usize, now: Instant) {
        let rest = self.pending.split_off(len);
        self.accumulated.push_str(&self.pending);
        self.pending = rest;
        self.pending_chars = self.pending.chars().count();
        self.last_emit = now;
    }

    fn flush_all(&mut self, now: Instant) {
        self.flush_prefix(self.pending.len(), now);
    }

    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        let deadline = self.last_emit + self.settings.emit_interval;
        (deadline > now).then_some(deadline)
    }

    fn finish(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.accumulated.push_str(&self.pending);
        self.pending.clear();
        self.pending_chars = 0;
        true
    }
}

/// Rate-limited buffer that only emits text whose markdown is balanced,
/// unless the pending text grows past the cap.
///
/// Pathological input (a code fence longer than the cap with no close) can
/// still surface an unbalanced construct. That is accepted: the cap bounds
/// how long text can be held back.
#[derive(Debug)]
pub struct MarkdownSafeBuffer {
    buffer: TextBuffer,
}

impl MarkdownSafeBuffer {
    pub fn new(settings: BufferSettings, started: Instant) -> Self {
        Self {
            buffer: TextBuffer::new(settings, started),
        }
    }

    pub fn pending(&self) -> &str {
        &self.buffer.pending
    }

    fn try_flush(&mut self, now: Instant) -> Option<&str> {
        let buffer = &mut self.buffer;
        if buffer.pending.is_empty() || buffer.should_hold(now) {
            return None;
        }

        let forced = buffer.over_cap();
        if !forced && !buffer.candidate_is_safe() {
            debug!(
                pending_chars = buffer.pending_chars,
                "Holding unbalanced markdown"
            );
            return None;
        }

        if forced {
            debug!(pending_chars = buffer.pending_chars, "Pending cap exceeded, forcing flush");
        }
        buffer.flush_all(now);
        Some(buffer.accumulated.as_str())
    }
}

impl BufferingPolicy for MarkdownSafeBuffer {
    fn on_text(&mut self, content: &str, now: Instant) -> Option<&str> {
        self.buffer.append(content);
        self.try_flush(now)
    }

    fn poll(&mut self, now: Instant) -> Option<&str> {
        self.try_flush(now)
    }

    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.buffer.next_deadline(now)
    }

    fn finish(&mut self) -> Option<&str> {
        self.buffer.finish().then_some(self.buffer.accumulated.as_str())
    }

    fn accumulated(&self) -> &str {
        &self.buffer.accumulated
    }

    fn name(&self) -> &'static str {
        "markdown_safe"
    }
}

/// Rate-limited buffer that emits up to the last sentence end or closed code
/// fence, keeping the unfinished tail pending.
#[derive(Debug)]
pub struct SentenceBuffer {
    buffer: TextBuffer,
}

impl SentenceBuffer {
    pub fn new(settings: BufferSettings, started: Instant) -> Self {
        Self {
            buffer: TextBuffer::new(settings, started),
        }
    }

    pub fn pending(&self) -> &str {
        &self.buffer.pending
    }

    fn try_flush(&mut self, now: Instant) -> Option<&str> {
        let buffer = &mut self.buffer;
        if buffer.pending.is_empty() || buffer.should_hold(now) {
            return None;
        }

        // A sentence cut that leaves markdown open falls back to the last closed fence
        let cuts = [find_cut(&buffer.pending), find_fence_cut(&buffer.pending)];
        for cut in cuts.into_iter().flatten() {
            let candidate = format!("{}{}", buffer.accumulated, &buffer.pending[..cut]);
            if is_safe(&candidate) {
                buffer.flush_prefix(cut, now);
                return Some(buffer.accumulated.as_str());
            }
        }

        if buffer.over_cap() {
            debug!(pending_chars = buffer.pending_chars, "No safe cut within cap, forcing flush");
            buffer.flush_all(now);
            return Some(buffer.accumulated.as_str());
        }

        None
    }
}

impl BufferingPolicy for SentenceBuffer {
    fn on_text(&mut self, content: &str, now: Instant) -> Option<&str> {
        self.buffer.append(content);
        self.try_flush(now)
    }

    fn poll(&mut self, now: Instant) -> Option<&str> {
        self.try_flush(now)
    }

    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.buffer.next_deadline(now)
    }

    fn finish(&mut self) -> Option<&str> {
        self.buffer.finish().then_some(self.buffer.accumulated.as_str())
    }

    fn accumulated(&self) -> &str {
        &self.buffer.accumulated
    }

    fn name(&self) -> &'static str {
        "sentence"
    }
}

/// Emits after every text event. No rate limit, no markdown checks.
#[derive(Debug, Default)]
pub struct ImmediateBuffer {
    accumulated: String,
}

impl ImmediateBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferingPolicy for ImmediateBuffer {
    fn on_text(&mut self, content: &str, _now: Instant) -> Option<&str> {
        self.accumulated.push_str(content);
        Some(self.accumulated.as_str())
    }

    fn finish(&mut self) -> Option<&str> {
        None
    }

    fn accumulated(&self) -> &str {
        &self.accumulated
    }

    fn name(&self) -> &'static str {
        "immediate"
    }
}
