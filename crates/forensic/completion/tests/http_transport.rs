use std::sync::Arc;
use std::time::Duration;

use forensic_completion::mocks::sse_frame;
use forensic_completion::{
    CompletionError, CompletionRequest, CompletionService, HttpTransport,
    StreamingCompletionClient,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> StreamingCompletionClient {
    let transport = HttpTransport::new(
        format!("{}/v1/chat/completions", server.uri()),
        "test-key",
        Duration::from_secs(5),
    )
    .expect("transport should build");
    StreamingCompletionClient::new(Arc::new(transport)).with_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn streams_event_body_into_text() {
    let server = MockServer::start().await;
    let body = format!(
        "{}{}data: not-json\n\n{}data: [DONE]\n\n",
        sse_frame("{\"bps\": "),
        sse_frame("9650"),
        sse_frame("}")
    );

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server)
        .complete(&CompletionRequest::new("grok-4", "Lead Forensics", "jury data"))
        .await
        .expect("stream should decode");

    assert_eq!(text, "{\"bps\": 9650}");
}

#[tokio::test]
async fn non_success_status_is_unavailable_with_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("over rate limit"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .complete(&CompletionRequest::new("grok-4", "sys", "user"))
        .await
        .unwrap_err();

    match err {
        CompletionError::Unavailable { status, reason } => {
            assert_eq!(status, Some(429));
            assert!(reason.contains("over rate limit"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn request_body_is_a_streaming_chat_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(wiremock::matchers::body_partial_json(serde_json::json!({
            "model": "grok-4",
            "stream": true,
            "messages": [
                { "role": "system", "content": "sys" },
                { "role": "user", "content": "user" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("data: [DONE]\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server)
        .complete(&CompletionRequest::new("grok-4", "sys", "user"))
        .await
        .unwrap();
    assert!(text.is_empty());
}
