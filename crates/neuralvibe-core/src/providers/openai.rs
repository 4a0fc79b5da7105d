//! OpenAI chat completions provider

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialStore;
use crate::error::RouterError;
use crate::types::{Message, NormalizedResponse, ProviderId, Role, Usage};

use super::wire::{self, LlmProvider};

/// OpenAI provider, also the engine behind every OpenAI-compatible backend
pub struct OpenAiProvider {
    id: ProviderId,
    client: Client,
    store: Arc<dyn CredentialStore>,
    base_url: String,
    max_tokens: Option<u32>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";
    pub const DEFAULT_MAX_TOKENS: u32 = 4000;

    pub fn new(client: Client, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_identity(ProviderId::OpenAi, client, store, Self::DEFAULT_BASE_URL)
            .with_max_tokens(Some(Self::DEFAULT_MAX_TOKENS))
    }

    /// An OpenAI-shaped adapter answering as `id`, without a `max_tokens` field
    pub(crate) fn with_identity(
        id: ProviderId,
        client: Client,
        store: Arc<dyn CredentialStore>,
        base_url: &str,
    ) -> Self {
        Self {
            id,
            client,
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = base_url.as_ref().trim_end_matches('/').to_string();
        self
    }

    /// `None` leaves `max_tokens` out of the request
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Role/content pairs, system messages stay in-line
    fn to_openai_messages(conversation: &[Message]) -> Vec<OpenAiMessage> {
        conversation
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(&self, conversation: &[Message], model: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "messages": Self::to_openai_messages(conversation),
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        body
    }

    /// Convert an OpenAI response to the normalized shape
    fn from_openai_response(
        id: ProviderId,
        resp: OpenAiApiResponse,
    ) -> Result<NormalizedResponse, RouterError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| wire::malformed(id, "response had no choices"))?;

        let usage = resp.usage.map_or(Usage::default(), |u| {
            let usage = Usage::new(u.prompt_tokens, u.completion_tokens);
            if u.total_tokens.is_some_and(|t| t != usage.total_tokens) {
                debug!(
                    "{} reported total_tokens={:?}, using {}",
                    id.display_name(),
                    u.total_tokens,
                    usage.total_tokens
                );
            }
            usage
        });

        Ok(NormalizedResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn send(
        &self,
        conversation: &[Message],
        model: &str,
    ) -> Result<NormalizedResponse, RouterError> {
        let api_key = wire::api_key(self.store.as_ref(), self.id)?;
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(conversation, model);

        debug!(
            "{} request: model={}, messages={}",
            self.id.display_name(),
            model,
            conversation.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(wire::transport(self.id))?;

        let api_response: OpenAiApiResponse = wire::read_json(self.id, response).await?;
        Self::from_openai_response(self.id, api_response)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiApiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(Client::new(), Arc::new(MemoryCredentialStore::new()))
    }

    #[test]
    fn test_to_openai_messages_keeps_roles() {
        let msgs = vec![
            Message::system("be brief"),
            Message::user("hello"),
            Message::assistant("hi"),
        ];
        let result = OpenAiProvider::to_openai_messages(&msgs);
        let roles: Vec<&str> = result.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(result[1].content, "hello");
    }

    #[test]
    fn test_request_body_shape() {
        let body = provider().request_body(&[Message::user("hello")], "gpt-4o");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 4000);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        // wire messages carry only role and content
        assert_eq!(body["messages"][0].as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_request_body_without_max_tokens() {
        let body = provider()
            .with_max_tokens(None)
            .request_body(&[Message::user("hello")], "gpt-4o");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_from_openai_response_text() {
        let resp: OpenAiApiResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();
        let result = OpenAiProvider::from_openai_response(ProviderId::OpenAi, resp).unwrap();
        assert_eq!(result.content, "Hello!");
        assert_eq!(result.usage, Usage::new(10, 5));
    }

    #[test]
    fn test_from_openai_response_recomputes_total() {
        let resp: OpenAiApiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": "x"}}],
            "usage": {"prompt_tokens": 2, "completion_tokens": 3, "total_tokens": 99}
        }))
        .unwrap();
        let result = OpenAiProvider::from_openai_response(ProviderId::Groq, resp).unwrap();
        assert_eq!(result.usage.total_tokens, 5);
    }

    #[test]
    fn test_from_openai_response_null_content() {
        let resp: OpenAiApiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": null}}]
        }))
        .unwrap();
        let result = OpenAiProvider::from_openai_response(ProviderId::OpenAi, resp).unwrap();
        assert_eq!(result.content, "");
        assert_eq!(result.usage, Usage::default());
    }

    #[test]
    fn test_from_openai_response_no_choices() {
        let resp = OpenAiApiResponse {
            choices: vec![],
            usage: None,
        };
        assert!(matches!(
            OpenAiProvider::from_openai_response(ProviderId::DeepSeek, resp),
            Err(RouterError::UpstreamMalformed {
                provider: ProviderId::DeepSeek,
                ..
            })
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let p = provider().with_base_url("http://localhost:8080/");
        assert_eq!(p.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_send_without_key_fails_before_network() {
        let p = provider().with_base_url("http://127.0.0.1:9");
        let err = p.send(&[Message::user("hi")], "gpt-4o").await.unwrap_err();
        assert!(matches!(err, RouterError::CredentialMissing(ProviderId::OpenAi)));
    }

    #[test]
    fn test_openai_provider_debug_hides_key() {
        let store = Arc::new(MemoryCredentialStore::with_keys([(
            ProviderId::OpenAi,
            "sk-secret-key",
        )]));
        let provider = OpenAiProvider::new(Client::new(), store);
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-secret-key"));
    }
}
