//! Entry point for one assistant turn.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::processor::{consume_stream, StreamProcessor};
use crate::transport::ChatTransport;
use crate::{ChatRequest, StreamSettings, StreamUpdate};

/// Lifecycle of a turn. `Sending` and `Streaming` count as loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

impl TurnPhase {
    pub fn is_loading(self) -> bool {
        matches!(self, TurnPhase::Sending | TurnPhase::Streaming)
    }
}

/// Marks a turn as failed if it is dropped before reaching a final phase,
/// so the loading flag never stays set.
struct TurnGuard<'a> {
    phase: &'a watch::Sender<TurnPhase>,
    done: bool,
}

impl<'a> TurnGuard<'a> {
    fn start(phase: &'a watch::Sender<TurnPhase>) -> Self {
        phase.send_replace(TurnPhase::Sending);
        Self { phase, done: false }
    }

    fn streaming(&self) {
        self.phase.send_replace(TurnPhase::Streaming);
    }

    fn complete(mut self) {
        self.done = true;
        self.phase.send_replace(TurnPhase::Completed);
    }

    fn fail(mut self) {
        self.done = true;
        self.phase.send_replace(TurnPhase::Failed);
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.phase.send_replace(TurnPhase::Failed);
        }
    }
}

pub struct ChatClient {
    transport: Arc<dyn ChatTransport>,
    settings: StreamSettings,
    phase: watch::Sender<TurnPhase>,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn ChatTransport>, settings: StreamSettings) -> Self {
        let (phase, _) = watch::channel(TurnPhase::Idle);
        Self {
            transport,
            settings,
            phase,
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// True while a turn is being sent or streamed.
    pub fn is_loading(&self) -> bool {
        self.phase.borrow().is_loading()
    }

    pub fn phase(&self) -> TurnPhase {
        *self.phase.borrow()
    }

    /// Observes phase changes, e.g. to drive a spinner.
    pub fn subscribe(&self) -> watch::Receiver<TurnPhase> {
        self.phase.subscribe()
    }

    /// Requests a new session. Failures are logged and yield `None`; a chat
    /// can proceed without a session.
    pub async fn create_session(&self) -> Option<String> {
        match self.transport.create_session().await {
            Ok(session_id) => {
                info!(session_id = %session_id, "Session created");
                Some(session_id)
            }
            Err(e) => {
                warn!("Session creation failed: {}", e);
                None
            }
        }
    }

    /// Sends one message and streams the reply into `on_update`.
    ///
    /// Returns the final accumulated reply. Any transport failure is logged
    /// and replaced by the configured error message; updates already
    /// delivered are not retracted.
    pub async fn send_message(
        &self,
        request: ChatRequest,
        on_update: impl FnMut(StreamUpdate),
    ) -> String {
        self.send_message_with_cancel(request, &CancellationToken::new(), on_update)
            .await
    }

    /// Like `send_message`, but ends the turn early once `cancel` fires. A
    /// cancelled turn keeps and returns whatever text was received.
    pub async fn send_message_with_cancel(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
        mut on_update: impl FnMut(StreamUpdate),
    ) -> String {
        debug!(session_id = ?request.session_id, transport = self.transport.name(), "Sending message");
        let guard = TurnGuard::start(&self.phase);

        let stream = match self.transport.open_stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Streaming API error: {}", e);
                guard.fail();
                return self.settings.error_message.clone();
            }
        };

        guard.streaming();
        let processor = StreamProcessor::new(&self.settings, Instant::now());

        match consume_stream(stream, processor, cancel, &mut on_update).await {
            Ok(text) => {
                guard.complete();
                text
            }
            Err(e) => {
                error!("Streaming API error: {}", e);
                guard.fail();
                self.settings.error_message.clone()
            }
        }
    }
}
