//! Transports that open the chat stream: HTTP in production, scripted in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use ideal_config::ServerConfig;
use reqwest::Client;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::error::StreamError;
use crate::ChatRequest;

/// Longest error response body kept for logging.
pub const MAX_ERROR_BODY_BYTES: usize = 2048;

/// Raw response body chunks, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends the chat request and returns the response body once a success
    /// status has been received.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, StreamError>;

    /// Asks the server for a new session identifier.
    async fn create_session(&self) -> Result<String, StreamError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    stream_url: String,
    session_url: String,
}

impl HttpTransport {
    pub fn new(server: &ServerConfig) -> Result<Self, StreamError> {
        let mut builder = Client::builder();
        if let Some(seconds) = server.timeout_seconds {
            builder = builder.connect_timeout(Duration::from_secs(seconds));
        }

        Ok(Self {
            client: builder.build()?,
            stream_url: server.stream_url(),
            session_url: server.session_url(),
        })
    }

    /// Captures at most `MAX_ERROR_BODY_BYTES` of an error response body.
    async fn error_for_status(response: reqwest::Response) -> StreamError {
        let status = response.status().as_u16();
        let mut body = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let Ok(chunk) = chunk else {
                break;
            };
            let room = MAX_ERROR_BODY_BYTES - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        StreamError::Status {
            status,
            body: error_body_text(&body, truncated),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, StreamError> {
        debug!("Sending streaming request to {}", self.stream_url);

        let response = self
            .client
            .post(&self.stream_url)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        debug!(status = %response.status(), "Response headers received");
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamError::from));
        Ok(Box::pin(stream))
    }

    async fn create_session(&self) -> Result<String, StreamError> {
        debug!("Creating session at {}", self.session_url);

        let response = self.client.post(&self.session_url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        let body = response.bytes().await?;
        let session: SessionResponse = serde_json::from_slice(&body)?;
        Ok(session.session_id)
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn error_body_text(bytes: &[u8], truncated: bool) -> String {
    if bytes.is_empty() && !truncated {
        return "Unknown error".to_string();
    }
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncated {
        text.push_str("...");
    }
    text
}
