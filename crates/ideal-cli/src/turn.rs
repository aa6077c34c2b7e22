//! One chat turn: send, stream into the renderer, let Ctrl-C stop it early.

use std::io::{self, Write};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::conversation::{Conversation, TurnOutcome};
use crate::render::TerminalRenderer;

/// Sends `text` and renders the reply as it streams.
///
/// Ctrl-C while the reply is streaming ends the turn and keeps the partial
/// reply. Returns `None` for blank input.
pub async fn run_turn<W: Write>(
    conversation: &mut Conversation,
    renderer: &mut TerminalRenderer<W>,
    text: &str,
) -> io::Result<Option<TurnOutcome>> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, cancelling turn");
                cancel.cancel();
            }
        })
    };

    let outcome = render_turn(conversation, renderer, text, &cancel).await;
    watcher.abort();
    outcome
}

/// `run_turn` without the Ctrl-C hook.
pub async fn render_turn<W: Write>(
    conversation: &mut Conversation,
    renderer: &mut TerminalRenderer<W>,
    text: &str,
    cancel: &CancellationToken,
) -> io::Result<Option<TurnOutcome>> {
    renderer.begin();
    let mut render_error = None;

    let outcome = conversation
        .send_with_cancel(text, cancel, |message, update| {
            if render_error.is_some() {
                return;
            }
            if let Err(e) = renderer.on_update(message, update) {
                render_error = Some(e);
            }
        })
        .await;

    if let Some(e) = render_error {
        return Err(e);
    }
    if let Some(ref outcome) = outcome {
        renderer.finish(&outcome.text, outcome.failed)?;
    }
    Ok(outcome)
}
