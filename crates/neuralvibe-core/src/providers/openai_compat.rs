//! OpenAI-compatible backends (Groq, DeepSeek)
//!
//! Reuses the OpenAI wire format with a backend-specific base URL and identity.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::credentials::CredentialStore;
use crate::error::RouterError;
use crate::types::{Message, NormalizedResponse, ProviderId};

use super::openai::OpenAiProvider;
use super::wire::LlmProvider;

/// OpenAI-compatible provider. Wraps [`OpenAiProvider`] under another identity
pub struct OpenAiCompatProvider {
    inner: OpenAiProvider,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("inner", &self.inner)
            .finish()
    }
}

impl OpenAiCompatProvider {
    pub const GROQ_BASE_URL: &'static str = "https://api.groq.com/openai";
    pub const DEEPSEEK_BASE_URL: &'static str = "https://api.deepseek.com";

    /// Groq, `POST https://api.groq.com/openai/v1/chat/completions`
    pub fn groq(client: Client, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: OpenAiProvider::with_identity(
                ProviderId::Groq,
                client,
                store,
                Self::GROQ_BASE_URL,
            ),
        }
    }

    /// DeepSeek, `POST https://api.deepseek.com/v1/chat/completions`
    pub fn deepseek(client: Client, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: OpenAiProvider::with_identity(
                ProviderId::DeepSeek,
                client,
                store,
                Self::DEEPSEEK_BASE_URL,
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.inner = self.inner.with_base_url(base_url);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.inner = self.inner.with_max_tokens(max_tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        self.inner.base_url()
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn id(&self) -> ProviderId {
        self.inner.id()
    }

    async fn send(
        &self,
        conversation: &[Message],
        model: &str,
    ) -> Result<NormalizedResponse, RouterError> {
        self.inner.send(conversation, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    #[test]
    fn test_compat_identities() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let groq = OpenAiCompatProvider::groq(Client::new(), store.clone());
        let deepseek = OpenAiCompatProvider::deepseek(Client::new(), store);
        assert_eq!(groq.id(), ProviderId::Groq);
        assert_eq!(groq.base_url(), "https://api.groq.com/openai");
        assert_eq!(deepseek.id(), ProviderId::DeepSeek);
        assert_eq!(deepseek.base_url(), "https://api.deepseek.com");
    }

    #[test]
    fn test_compat_provider_debug_hides_key() {
        let store = Arc::new(MemoryCredentialStore::with_keys([(
            ProviderId::Groq,
            "gsk_secret",
        )]));
        let p = OpenAiCompatProvider::groq(Client::new(), store);
        let debug = format!("{:?}", p);
        assert!(!debug.contains("gsk_secret"));
        assert!(debug.contains("Groq"));
    }
}
