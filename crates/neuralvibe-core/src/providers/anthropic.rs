//! Anthropic Claude provider

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialStore;
use crate::error::RouterError;
use crate::types::{Message, NormalizedResponse, ProviderId, Role, Usage};

use super::wire::{self, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    store: Arc<dyn CredentialStore>,
    base_url: String,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnthropicProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    pub const DEFAULT_MAX_TOKENS: u32 = 4000;

    pub fn new(client: Client, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            client,
            store,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = base_url.as_ref().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// System prompt (system messages joined) and the user/assistant turns
    fn to_anthropic_messages(conversation: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let system: Vec<&str> = conversation
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system = (!system.is_empty()).then(|| system.join("\n\n"));

        let messages = conversation
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    Role::User | Role::System => "user",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();

        (system, messages)
    }

    fn request_body(&self, conversation: &[Message], model: &str) -> serde_json::Value {
        let (system, messages) = Self::to_anthropic_messages(conversation);
        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = system.into();
        }
        body
    }

    /// Convert an Anthropic response to the normalized shape
    fn from_anthropic_response(
        resp: AnthropicApiResponse,
    ) -> Result<NormalizedResponse, RouterError> {
        let texts: Vec<String> = resp
            .content
            .into_iter()
            .filter_map(|b| match b {
                AnthropicBlock::Text { text } => Some(text),
                AnthropicBlock::Other => None,
            })
            .collect();

        if texts.is_empty() {
            return Err(wire::malformed(
                ProviderId::Claude,
                "response had no text content",
            ));
        }

        Ok(NormalizedResponse {
            content: texts.concat(),
            usage: Usage::new(resp.usage.input_tokens, resp.usage.output_tokens),
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Claude
    }

    async fn send(
        &self,
        conversation: &[Message],
        model: &str,
    ) -> Result<NormalizedResponse, RouterError> {
        let api_key = wire::api_key(self.store.as_ref(), ProviderId::Claude)?;
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(conversation, model);

        debug!(
            "Anthropic request: model={}, messages={}",
            model,
            conversation.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(wire::transport(ProviderId::Claude))?;

        let api_response: AnthropicApiResponse =
            wire::read_json(ProviderId::Claude, response).await?;
        Self::from_anthropic_response(api_response)
    }
}

// ── Anthropic wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicApiResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
