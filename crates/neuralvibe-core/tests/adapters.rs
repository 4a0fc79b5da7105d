//! Adapter round trips against stubbed backends

use std::sync::Arc;

use neuralvibe_core::providers::{
    AnthropicProvider, GoogleProvider, OpenAiCompatProvider, OpenAiProvider,
};
use neuralvibe_core::{
    CredentialStore, LlmProvider, MemoryCredentialStore, Message, ProviderId, RouterError,
};
use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(provider: ProviderId, key: &str) -> Arc<dyn CredentialStore> {
    Arc::new(MemoryCredentialStore::with_keys([(provider, key)]))
}

fn conversation() -> Vec<Message> {
    vec![
        Message::system("be brief"),
        Message::user("hello"),
        Message::assistant("hi there"),
        Message::user("how are you?"),
    ]
}

fn openai_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
    })
}

#[tokio::test]
async fn openai_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 4000})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("fine")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(Client::new(), store(ProviderId::OpenAi, "sk-test"))
        .with_base_url(server.uri());
    let resp = provider.send(&conversation(), "gpt-4o").await.unwrap();

    assert_eq!(resp.content, "fine");
    assert_eq!(resp.usage.prompt_tokens, 12);
    assert_eq!(resp.usage.completion_tokens, 7);
    assert_eq!(
        resp.usage.total_tokens,
        resp.usage.prompt_tokens + resp.usage.completion_tokens
    );
}

#[tokio::test]
async fn groq_round_trip_omits_max_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer gsk_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("from groq")))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::groq(Client::new(), store(ProviderId::Groq, "gsk_test"))
        .with_base_url(server.uri());
    let resp = provider.send(&conversation(), "llama3-70b-8192").await.unwrap();
    assert_eq!(resp.content, "from groq");
    assert_eq!(resp.usage.total_tokens, 19);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["model"], "llama3-70b-8192");
    assert!(body.get("max_tokens").is_none());
    assert_eq!(body["messages"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn deepseek_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer ds-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "deep"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 100}
        })))
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::deepseek(Client::new(), store(ProviderId::DeepSeek, "ds-test"))
            .with_base_url(server.uri());
    let resp = provider.send(&conversation(), "deepseek-chat").await.unwrap();
    assert_eq!(resp.content, "deep");
    // reported total is ignored
    assert_eq!(resp.usage.total_tokens, 7);
}

#[tokio::test]
async fn claude_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-opus-20240229",
            "max_tokens": 4000,
            "system": "be brief"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Doing well."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 20, "output_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(Client::new(), store(ProviderId::Claude, "sk-ant-test"))
        .with_base_url(server.uri());
    let resp = provider
        .send(&conversation(), "claude-3-opus-20240229")
        .await
        .unwrap();

    assert_eq!(resp.content, "Doing well.");
    assert_eq!(resp.usage.total_tokens, 24);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    let roles: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user"]);
}

#[tokio::test]
async fn gemini_round_trip_uses_query_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro-latest:generateContent"))
        .and(query_param("key", "AIza-test"))
        .and(body_partial_json(json!({
            "generationConfig": {"maxOutputTokens": 8192}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Great!"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 2, "totalTokenCount": 11}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GoogleProvider::new(Client::new(), store(ProviderId::Gemini, "AIza-test"))
        .with_base_url(server.uri());
    let resp = provider
        .send(&conversation(), "gemini-1.5-pro-latest")
        .await
        .unwrap();

    assert_eq!(resp.content, "Great!");
    assert_eq!(resp.usage.total_tokens, 11);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["contents"][1]["role"], "model");
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn upstream_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(Client::new(), store(ProviderId::OpenAi, "sk-bad"))
        .with_base_url(server.uri());
    let err = provider.send(&conversation(), "gpt-4o").await.unwrap_err();

    match err {
        RouterError::Upstream {
            provider,
            status,
            message,
        } => {
            assert_eq!(provider, ProviderId::OpenAi);
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn upstream_error_without_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new(Client::new(), store(ProviderId::Claude, "sk-ant"))
        .with_base_url(server.uri());
    let err = provider.send(&conversation(), "claude-3-opus-20240229").await.unwrap_err();
    assert!(err.is_upstream_failure());
    assert!(err.to_string().contains("An error occurred with the Claude API"));
}

#[tokio::test]
async fn malformed_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro-latest:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let provider = GoogleProvider::new(Client::new(), store(ProviderId::Gemini, "AIza"))
        .with_base_url(server.uri());
    let err = provider.send(&conversation(), "gemini-1.5-pro-latest").await.unwrap_err();
    assert!(matches!(
        err,
        RouterError::UpstreamMalformed {
            provider: ProviderId::Gemini,
            ..
        }
    ));
    assert!(!err.is_upstream_failure());
}

#[tokio::test]
async fn missing_key_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("x")))
        .expect(0)
        .mount(&server)
        .await;

    let empty: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let provider = OpenAiCompatProvider::deepseek(Client::new(), empty).with_base_url(server.uri());
    let err = provider.send(&conversation(), "deepseek-chat").await.unwrap_err();
    assert!(matches!(err, RouterError::CredentialMissing(ProviderId::DeepSeek)));
}

#[tokio::test]
async fn key_is_read_at_call_time() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer rotated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("ok")))
        .mount(&server)
        .await;

    let keys = Arc::new(MemoryCredentialStore::with_keys([(ProviderId::OpenAi, "old")]));
    let provider = OpenAiProvider::new(Client::new(), keys.clone()).with_base_url(server.uri());
    keys.set(ProviderId::OpenAi, "rotated").unwrap();

    let resp = provider.send(&conversation(), "gpt-4o").await.unwrap();
    assert_eq!(resp.content, "ok");
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    // nothing listens on the discard port
    let provider = OpenAiProvider::new(Client::new(), store(ProviderId::OpenAi, "sk"))
        .with_base_url("http://127.0.0.1:9");
    let err = provider.send(&conversation(), "gpt-4o").await.unwrap_err();
    assert!(matches!(
        err,
        RouterError::Transport {
            provider: ProviderId::OpenAi,
            ..
        }
    ));
    assert!(err.is_upstream_failure());
}

#[tokio::test]
async fn gemini_transport_error_hides_query_key() {
    let keys = store(ProviderId::Gemini, "AIzaSECRETKEY123");
    let provider = GoogleProvider::new(Client::new(), keys).with_base_url("http://127.0.0.1:9");
    let err = provider
        .send(&conversation(), "gemini-1.5-pro-latest")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RouterError::Transport {
            provider: ProviderId::Gemini,
            ..
        }
    ));
    assert!(!err.to_string().contains("AIzaSECRETKEY123"));
    assert!(!format!("{err:?}").contains("AIzaSECRETKEY123"));
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        assert!(!cause.to_string().contains("AIzaSECRETKEY123"));
        source = cause.source();
    }
}
