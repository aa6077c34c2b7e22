//! End-to-end tests of one assistant turn against the scripted transport.

use ideal_config::{BufferingStrategy, DecodeFailurePolicy};
use ideal_stream::mock::{canned_events, canned_response, ChunkDelay};
use ideal_stream::{
    ChatClient, ChatRequest, MockReply, MockTransport, StreamEvent, StreamSettings, StreamUpdate,
    TurnPhase,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn client_with(transport: MockTransport, settings: StreamSettings) -> (ChatClient, Arc<MockTransport>) {
    let transport = Arc::new(transport);
    let client = ChatClient::new(transport.clone(), settings);
    (client, transport)
}

fn request(message: &str) -> ChatRequest {
    ChatRequest::new(message, Some("session-1".to_string()))
}

async fn send(client: &ChatClient, message: &str) -> (String, Vec<StreamUpdate>) {
    let mut updates = Vec::new();
    let text = client
        .send_message(request(message), |update| updates.push(update))
        .await;
    (text, updates)
}

#[tokio::test]
async fn test_hello_world() {
    let transport = MockTransport::new().with_reply(MockReply::lines([
        r#"{"role":"assistant","content":"Hello"}"#,
        r#"{"role":"assistant","content":" world."}"#,
    ]));
    let (client, _) = client_with(transport, StreamSettings::default());

    let (text, updates) = send(&client, "hi").await;

    assert_eq!(text, "Hello world.");
    assert_eq!(updates.last().map(|u| u.text_so_far()), Some("Hello world."));
    assert_eq!(client.phase(), TurnPhase::Completed);
}

#[tokio::test]
async fn test_unterminated_fence_is_flushed_at_end() {
    let transport = MockTransport::new().with_reply(MockReply::lines([
        r#"{"role":"assistant","content":"```python\ncode"}"#,
    ]));
    let (client, _) = client_with(transport, StreamSettings::default());

    let (text, updates) = send(&client, "code please").await;

    assert_eq!(text, "```python\ncode");
    assert_eq!(
        updates,
        vec![StreamUpdate::Text {
            text_so_far: "```python\ncode".to_string()
        }]
    );
}

#[tokio::test]
async fn test_image_event_is_passed_through() {
    let transport = MockTransport::new().with_reply(MockReply::lines([
        r#"{"role":"assistant","content":"abc","mimeType":"image/png"}"#,
    ]));
    let (client, _) = client_with(transport, StreamSettings::default());

    let (text, updates) = send(&client, "draw").await;

    assert_eq!(text, "");
    assert_eq!(
        updates,
        vec![StreamUpdate::Image {
            text_so_far: String::new(),
            data: "abc".to_string(),
            mime_type: "image/png".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_image_never_enters_text() {
    let transport = MockTransport::new().with_reply(MockReply::events(&[
        StreamEvent::assistant("Here is the chart. "),
        StreamEvent::image("iVBORw0KGgo=", "image/png"),
        StreamEvent::assistant("Anything else?"),
    ]));
    let (client, _) = client_with(transport, StreamSettings::default());

    let (text, updates) = send(&client, "chart").await;

    assert_eq!(text, "Here is the chart. Anything else?");
    let images: Vec<_> = updates
        .iter()
        .filter(|u| matches!(u, StreamUpdate::Image { .. }))
        .collect();
    assert_eq!(images.len(), 1);
    assert!(!images[0].text_so_far().contains("iVBOR"));
}

#[tokio::test]
async fn test_error_status_returns_error_message() {
    let transport = MockTransport::new().with_reply(MockReply::Status(500));
    let (client, _) = client_with(transport, StreamSettings::default());

    let (text, updates) = send(&client, "hi").await;

    assert_eq!(text, "Error reaching agent");
    assert!(updates.is_empty());
    assert_eq!(client.phase(), TurnPhase::Failed);
    assert!(!client.is_loading());
}

#[tokio::test]
async fn test_missing_body_is_fatal() {
    let transport = MockTransport::new().with_reply(MockReply::NoBody);
    let mut settings = StreamSettings::default();
    settings.error_message = "Sorry, I encountered an error.".to_string();
    let (client, _) = client_with(transport, settings);

    let (text, updates) = send(&client, "hi").await;

    assert_eq!(text, "Sorry, I encountered an error.");
    assert!(updates.is_empty());
}

#[tokio::test]
async fn test_broken_stream_keeps_emitted_updates() {
    let transport = MockTransport::new().with_reply(MockReply::BrokenAfter(vec![
        bytes::Bytes::from_static(b"{\"role\":\"assistant\",\"content\":\"partial \"}\n"),
    ]));
    let settings = StreamSettings {
        buffering: BufferingStrategy::Immediate,
        ..StreamSettings::default()
    };
    let (client, _) = client_with(transport, settings);

    let (text, updates) = send(&client, "hi").await;

    assert_eq!(text, "Error reaching agent");
    assert_eq!(
        updates,
        vec![StreamUpdate::Text {
            text_so_far: "partial ".to_string()
        }]
    );
    assert_eq!(client.phase(), TurnPhase::Failed);
}

#[tokio::test]
async fn test_malformed_line_discarded() {
    let transport = MockTransport::new().with_reply(MockReply::lines([
        "{not json",
        r#"{"role":"assistant","content":"valid"}"#,
    ]));
    let (client, _) = client_with(transport, StreamSettings::default());

    let (text, _) = send(&client, "hi").await;
    assert_eq!(text, "valid");
}

#[tokio::test]
async fn test_malformed_line_appended_literally() {
    let transport = MockTransport::new().with_reply(MockReply::lines([
        "{not json",
        r#"{"role":"assistant","content":"valid"}"#,
    ]));
    let settings = StreamSettings {
        decode_failures: DecodeFailurePolicy::Literal,
        ..StreamSettings::default()
    };
    let (client, _) = client_with(transport, settings);

    let (text, _) = send(&client, "hi").await;
    assert_eq!(text, "{not jsonvalid");
}

#[tokio::test]
async fn test_other_roles_never_leak_under_literal_policy() {
    let transport = MockTransport::new().with_reply(MockReply::lines([
        r#"{"role":"tool","content":{"x":1}}"#,
        "null",
        r#"{"role":"assistant","content":null}"#,
        r#"{"role":"assistant","content":"answer"}"#,
    ]));
    let settings = StreamSettings {
        decode_failures: DecodeFailurePolicy::Literal,
        ..StreamSettings::default()
    };
    let (client, _) = client_with(transport, settings);

    let (text, _) = send(&client, "hi").await;
    assert_eq!(text, "answer");
}

#[tokio::test]
async fn test_no_characters_lost_under_any_chunking() {
    let events = canned_events("chunking", 2);
    let expected = canned_response("chunking", 2);
    let body: String = events
        .iter()
        .map(|e| format!("{}\n", serde_json::to_string(e).unwrap()))
        .collect();

    for chunk_size in [1, 2, 3, 5, 8, 13, 64, 4096] {
        let transport = MockTransport::new().with_reply(MockReply::raw(body.as_bytes(), chunk_size));
        let (client, _) = client_with(transport, StreamSettings::default());

        let (text, updates) = send(&client, "chunking").await;

        assert_eq!(text, expected, "chunk size {}", chunk_size);
        assert_eq!(updates.last().map(|u| u.text_so_far()), Some(expected.as_str()));
    }
}

#[tokio::test]
async fn test_multibyte_text_split_mid_character() {
    let body = "{\"role\":\"assistant\",\"content\":\"naïve café — ok\"}\n";
    let transport = MockTransport::new().with_reply(MockReply::raw(body.as_bytes(), 1));
    let (client, _) = client_with(transport, StreamSettings::default());

    let (text, _) = send(&client, "hi").await;
    assert_eq!(text, "naïve café — ok");
}

#[tokio::test]
async fn test_text_updates_are_append_only() {
    let reply = MockReply::lines([
        r#"{"role":"assistant","content":"Use `cargo"}"#,
        r#"{"role":"assistant","content":" build` to compile. "}"#,
        r#"{"role":"assistant","content":"Then **run"}"#,
        r#"{"role":"assistant","content":"** it."}"#,
    ])
    .with_delay(ChunkDelay::Fixed(Duration::from_millis(60)));
    let (client, _) = client_with(MockTransport::new().with_reply(reply), StreamSettings::default());

    let (text, updates) = send(&client, "hi").await;

    let mut previous = String::new();
    for update in &updates {
        assert!(update.text_so_far().starts_with(&previous));
        previous = update.text_so_far().to_string();
    }
    assert_eq!(text, "Use `cargo build` to compile. Then **run** it.");
}

#[tokio::test]
async fn test_emissions_respect_interval() {
    let words: Vec<String> = (0..30)
        .map(|i| format!(r#"{{"role":"assistant","content":"w{} "}}"#, i))
        .collect();
    let reply = MockReply::lines(words).with_delay(ChunkDelay::Fixed(Duration::from_millis(15)));
    let (client, _) = client_with(MockTransport::new().with_reply(reply), StreamSettings::default());

    let mut stamps = Vec::new();
    client
        .send_message(request("hi"), |_| stamps.push(Instant::now()))
        .await;

    assert!(stamps.len() >= 2, "expected several emissions, got {}", stamps.len());
    // The last emission is the terminal flush, which is not rate limited
    let non_terminal = &stamps[..stamps.len() - 1];
    for pair in non_terminal.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_millis(90), "gap too small: {:?}", gap);
    }
}

#[tokio::test]
async fn test_quiet_stream_flushes_on_timer() {
    // Lines arrive at ~70ms and ~140ms. Without the timer, the first update
    // would be "Thinking... more" when the second line arrives.
    let reply = MockReply::lines([
        r#"{"role":"assistant","content":"Thinking..."}"#,
        r#"{"role":"assistant","content":" more"}"#,
    ])
    .with_delay(ChunkDelay::Fixed(Duration::from_millis(70)));
    let (client, _) = client_with(MockTransport::new().with_reply(reply), StreamSettings::default());

    let (text, updates) = send(&client, "hi").await;

    assert_eq!(text, "Thinking... more");
    assert_eq!(updates.first().map(|u| u.text_so_far()), Some("Thinking..."));
    assert_eq!(updates.last().map(|u| u.text_so_far()), Some("Thinking... more"));
}

#[tokio::test]
async fn test_loading_flag_during_turn() {
    let transport = MockTransport::new().with_reply(
        MockReply::lines([r#"{"role":"assistant","content":"x"}"#])
            .with_delay(ChunkDelay::Fixed(Duration::from_millis(10))),
    );
    let (client, _) = client_with(transport, StreamSettings::default());
    let phases = client.subscribe();
    assert!(!client.is_loading());
    assert_eq!(*phases.borrow(), TurnPhase::Idle);

    let mut loading_seen = Vec::new();
    client
        .send_message(request("hi"), |_| loading_seen.push(client.is_loading()))
        .await;

    assert_eq!(loading_seen, vec![true]);
    assert!(!client.is_loading());
    assert_eq!(*phases.borrow(), TurnPhase::Completed);
}

#[tokio::test]
async fn test_cancellation_keeps_partial_text() {
    let events = canned_events("stop", 0);
    let reply = MockReply::events(&events).with_delay(ChunkDelay::Fixed(Duration::from_millis(40)));
    let (client, _) = client_with(MockTransport::new().with_reply(reply), StreamSettings::default());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });

    let text = client
        .send_message_with_cancel(request("stop"), &cancel, |_| {})
        .await;

    let full = canned_response("stop", 0);
    assert!(!text.is_empty());
    assert!(text.len() < full.len());
    assert!(full.starts_with(&text));
    assert_eq!(client.phase(), TurnPhase::Completed);
}

#[tokio::test]
async fn test_request_is_forwarded() {
    let transport = MockTransport::new().with_reply(MockReply::lines(Vec::<String>::new()));
    let (client, transport) = client_with(transport, StreamSettings::default());

    let (text, updates) = send(&client, "what is rust?").await;

    assert_eq!(text, "");
    assert!(updates.is_empty());
    assert_eq!(transport.requests(), vec![request("what is rust?")]);
}

#[tokio::test]
async fn test_session_creation() {
    let (client, _) = client_with(MockTransport::new(), StreamSettings::default());
    assert_eq!(client.create_session().await.as_deref(), Some("mock-session-1"));
    assert_eq!(client.create_session().await.as_deref(), Some("mock-session-2"));

    let (failing, _) = client_with(MockTransport::new().with_failing_sessions(), StreamSettings::default());
    assert_eq!(failing.create_session().await, None);
}
