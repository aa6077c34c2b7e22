use thiserror::Error;

/// Failures that end a turn. The client never lets these escape
/// `ChatClient::send_message`; they are logged and replaced by the
/// configured error message.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response body is not readable")]
    MissingBody,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One response line that is not a valid stream event.
#[derive(Debug, Error)]
#[error("failed to decode line {line:?}: {source}")]
pub struct ParseFailure {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}
