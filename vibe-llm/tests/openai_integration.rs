mod common;

use serde_json::json;
use vibe_common::{Sentiment, VibeError};
use vibe_llm::{LlmClient, OpenAiClient};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gpt-4o-mini";

fn responses_body(text: &str) -> serde_json::Value {
    json!({
        "id": "resp_1",
        "object": "response",
        "created_at": 1_718_000_000,
        "status": "completed",
        "model": MODEL,
        "output": [{
            "id": "msg_1",
            "type": "message",
            "status": "completed",
            "content": [{ "type": "output_text", "text": text }]
        }],
        "usage": { "total_tokens": 123 }
    })
}

#[tokio::test]
async fn analyze_post_round_trips_through_responses_api() {
    common::init_test_tracing();
    let server = MockServer::start().await;

    let reply = r#"{"sentiment":"mixed","confidence":0.91,
        "products":[{"name":"Cursor","sentiment":"negative"}],
        "categories":["cursor"],"explanation":"Likes the UI, hates the lag."}"#;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": MODEL })))
        .respond_with(ResponseTemplate::new(200).set_body_json(responses_body(reply)))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::with_endpoint(
        "sk-test".into(),
        MODEL.into(),
        &format!("{}/v1", server.uri()),
    )
    .unwrap();

    let analysis = client
        .analyze_post("Cursor UI is great but so laggy", &["cursor".into()])
        .await
        .unwrap();
    assert_eq!(analysis.sentiment, Sentiment::Mixed);
    assert_eq!(analysis.categories, vec!["cursor".to_string()]);
    assert_eq!(analysis.products[0].name, "Cursor");
    assert_eq!(analysis.model.as_deref(), Some(MODEL));
}

#[tokio::test]
async fn provider_outage_maps_to_unavailable() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({ "error": { "message": "overloaded" } })),
        )
        .mount(&server)
        .await;

    let client = OpenAiClient::with_endpoint("sk-test".into(), MODEL.into(), &server.uri())
        .unwrap()
        .with_retries(0);

    let err = client.analyze_post("anything", &[]).await.unwrap_err();
    match err {
        VibeError::ExternalServiceUnavailable { service, message } => {
            assert_eq!(service, "llm");
            assert!(message.contains("overloaded"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn prose_reply_is_an_analysis_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(responses_body("I'd rather not say.")),
        )
        .mount(&server)
        .await;

    let client = OpenAiClient::with_endpoint("sk-test".into(), MODEL.into(), &server.uri()).unwrap();
    let err = client.analyze_post("hello", &[]).await.unwrap_err();
    assert!(matches!(err, VibeError::ExternalServiceUnavailable { .. }));
}

#[test]
fn empty_api_key_is_a_config_error() {
    let err = OpenAiClient::new("  ".into(), MODEL.into()).err().unwrap();
    assert!(matches!(err, VibeError::Config(_)));
}

#[tokio::test]
#[ignore]
async fn openai_live_smoketest() {
    common::init_test_tracing();
    let Ok(key) = std::env::var("OPENAI_API_KEY") else {
        return;
    };
    let client = OpenAiClient::new(key, MODEL.to_string()).unwrap();
    let response = client
        .generate("Say Ok", None, Some(16), Some(0.2))
        .await
        .unwrap();
    assert!(!response.text.trim().is_empty());
}
