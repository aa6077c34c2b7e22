//! In-memory transcript of the current chat session.

use chrono::{DateTime, Local};
use ideal_stream::{ChatClient, ChatRequest, StreamUpdate, TurnPhase};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn label(self) -> &'static str {
        match self {
            Sender::User => "you",
            Sender::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    /// Base64 payload as received
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub images: Vec<ImageAttachment>,
    pub timestamp: DateTime<Local>,
}

/// Result of one `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub message_id: String,
    pub text: String,
    pub failed: bool,
}

pub struct Conversation {
    client: ChatClient,
    session_id: Option<String>,
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Conversation {
    pub fn new(client: ChatClient, session_id: Option<String>) -> Self {
        Self {
            client,
            session_id,
            messages: Vec::new(),
            next_id: 1,
        }
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.client.is_loading()
    }

    /// Starts over with a fresh session and an empty transcript.
    pub async fn new_chat(&mut self) {
        self.session_id = self.client.create_session().await;
        self.messages.clear();
        debug!(session_id = ?self.session_id, "Started new chat");
    }

    pub async fn send(
        &mut self,
        text: &str,
        on_update: impl FnMut(&ChatMessage, &StreamUpdate),
    ) -> Option<TurnOutcome> {
        self.send_with_cancel(text, &CancellationToken::new(), on_update)
            .await
    }

    /// Sends `text` and streams the reply into a new assistant message.
    ///
    /// Blank input is ignored and yields `None`. `on_update` sees the
    /// assistant message after each update has been applied to it.
    pub async fn send_with_cancel(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        mut on_update: impl FnMut(&ChatMessage, &StreamUpdate),
    ) -> Option<TurnOutcome> {
        if text.trim().is_empty() {
            return None;
        }

        if self.session_id.is_none() {
            self.session_id = self.client.create_session().await;
        }

        let user = self.new_message(Sender::User, text);
        self.messages.push(user);
        let assistant = self.new_message(Sender::Assistant, "");
        let message_id = assistant.id.clone();
        self.messages.push(assistant);
        let index = self.messages.len() - 1;

        let request = ChatRequest::new(text, self.session_id.clone());
        let Self {
            client, messages, ..
        } = self;

        let final_text = client
            .send_message_with_cancel(request, cancel, |update| {
                let message = &mut messages[index];
                match &update {
                    StreamUpdate::Text { text_so_far } => message.text.clone_from(text_so_far),
                    StreamUpdate::Image {
                        data, mime_type, ..
                    } => message.images.push(ImageAttachment {
                        data: data.clone(),
                        mime_type: mime_type.clone(),
                    }),
                }
                on_update(message, &update);
            })
            .await;

        self.messages[index].text.clone_from(&final_text);
        Some(TurnOutcome {
            message_id,
            text: final_text,
            failed: self.client.phase() == TurnPhase::Failed,
        })
    }

    fn new_message(&mut self, sender: Sender, text: &str) -> ChatMessage {
        let timestamp = Local::now();
        let id = format!("{}-{}", timestamp.format("%H%M%S"), self.next_id);
        self.next_id += 1;
        ChatMessage {
            id,
            sender,
            text: text.to_string(),
            images: Vec::new(),
            timestamp,
        }
    }
}
