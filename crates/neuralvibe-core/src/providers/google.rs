//! Google Gemini provider

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialStore;
use crate::error::RouterError;
use crate::types::{Message, NormalizedResponse, ProviderId, Role, Usage};

use super::wire::{self, LlmProvider};

/// Google Gemini provider. Authenticates with the `key` query parameter.
pub struct GoogleProvider {
    client: Client,
    store: Arc<dyn CredentialStore>,
    base_url: String,
    max_tokens: u32,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl GoogleProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";
    pub const DEFAULT_MAX_TOKENS: u32 = 8192;

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

    /// Convert messages to Gemini contents; system messages become the system instruction
    fn to_gemini_contents(conversation: &[Message]) -> (Option<GeminiContent>, Vec<GeminiContent>) {
        let system_parts: Vec<GeminiPart> = conversation
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| GeminiPart {
                text: Some(m.content.clone()),
            })
            .collect();
        let system = (!system_parts.is_empty()).then_some(GeminiContent {
            role: None,
            parts: system_parts,
        });

        let contents = conversation
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        Role::User | Role::System => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        (system, contents)
    }

    fn request_body(&self, conversation: &[Message]) -> serde_json::Value {
        let (system, contents) = Self::to_gemini_contents(conversation);
        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
            },
        });
        if let Some(system) = system {
            body["systemInstruction"] = serde_json::json!(system);
        }
        body
    }

    /// Convert a Gemini response to the normalized shape
    fn from_gemini_response(resp: GeminiApiResponse) -> Result<NormalizedResponse, RouterError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| wire::malformed(ProviderId::Gemini, "response had no candidates"))?;

        let content = candidate
            .content
            .ok_or_else(|| wire::malformed(ProviderId::Gemini, "candidate had no content"))?;

        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();

        let usage = resp.usage_metadata.map_or(Usage::default(), |u| {
            Usage::new(
                u.prompt_token_count.unwrap_or(0),
                u.candidates_token_count.unwrap_or(0),
            )
        });

        Ok(NormalizedResponse {
            content: text,
            usage,
        })
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn send(
        &self,
        conversation: &[Message],
        model: &str,
    ) -> Result<NormalizedResponse, RouterError> {
        let api_key = wire::api_key(self.store.as_ref(), ProviderId::Gemini)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, model
        );
        let body = self.request_body(conversation);

        debug!(
            "Gemini request: model={}, contents={}",
            model,
            body["contents"].as_array().map_or(0, Vec::len)
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(wire::transport(ProviderId::Gemini))?;

        let api_response: GeminiApiResponse = wire::read_json(ProviderId::Gemini, response).await?;
        Self::from_gemini_response(api_response)
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}
