//! Gemini provider against a local HTTP double.

use murmur_reasoning::retry::RetryConfig;
use murmur_reasoning::{CompletionClient, CompletionParams, GeminiClient};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-test:generateContent";

fn client(server: &MockServer) -> GeminiClient {
    GeminiClient::new("test-key", "gemini-test", &server.uri())
        .unwrap()
        .with_retry_config(RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            backoff_factor: 2.0,
        })
}

fn answer(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_complete_sends_prompt_and_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "เมืองหลวงของไทยคืออะไร" }] }],
            "generationConfig": { "maxOutputTokens": 256 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(" กรุงเทพมหานคร\n")))
        .expect(1)
        .mount(&server)
        .await;

    let params = CompletionParams {
        max_output_tokens: 256,
        temperature: 0.2,
    };
    let text = client(&server)
        .complete("เมืองหลวงของไทยคืออะไร", params)
        .await
        .unwrap();
    assert_eq!(text, "กรุงเทพมหานคร");
}

#[tokio::test]
async fn test_empty_candidates_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let err = client(&server)
        .complete("hello", CompletionParams::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no candidates"));
}

#[tokio::test]
async fn test_blocked_prompt_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .complete("hello", CompletionParams::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("SAFETY"));
}

#[tokio::test]
async fn test_invalid_key_surfaces_api_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .complete("hello", CompletionParams::default())
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("API key not valid"));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("ok")))
        .mount(&server)
        .await;

    let text = client(&server)
        .complete("hello", CompletionParams::default())
        .await
        .unwrap();
    assert_eq!(text, "ok");
}

#[tokio::test]
async fn test_key_stays_out_of_the_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("ok")))
        .mount(&server)
        .await;

    client(&server)
        .complete("hello", CompletionParams::default())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query().is_none());
}

#[tokio::test]
async fn test_transport_error_does_not_leak_key() {
    let client = GeminiClient::new("SUPER-SECRET-KEY", "gemini-test", "http://127.0.0.1:1")
        .unwrap()
        .with_retry_config(RetryConfig::none());

    let err = client
        .complete("hello", CompletionParams::default())
        .await
        .unwrap_err();
    let text = format!("{:#} {:?}", err, err);
    assert!(!text.contains("SUPER-SECRET-KEY"), "{}", text);
    assert!(text.contains("Failed to send request to Gemini"));
}
