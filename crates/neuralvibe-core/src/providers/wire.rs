//! The adapter trait and the HTTP plumbing every adapter shares

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::error::RouterError;
use crate::types::{Message, NormalizedResponse, ProviderId};

/// One backend's request/response translation
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Backend this adapter talks to
    fn id(&self) -> ProviderId;

    /// Send `conversation` to the backend using the `model` wire value.
    ///
    /// # Errors
    ///
    /// [`RouterError::CredentialMissing`] without a key,
    /// [`RouterError::Upstream`] on a non-success status,
    /// [`RouterError::UpstreamMalformed`] when the body is not in the
    /// documented shape, [`RouterError::Transport`] when the call never
    /// completes.
    async fn send(
        &self,
        conversation: &[Message],
        model: &str,
    ) -> Result<NormalizedResponse, RouterError>;
}

/// Current key for `provider`, read at call time
pub(crate) fn api_key(
    store: &dyn CredentialStore,
    provider: ProviderId,
) -> Result<String, RouterError> {
    store
        .get(provider)
        .filter(|k| !k.trim().is_empty())
        .ok_or(RouterError::CredentialMissing(provider))
}

/// The request URL is dropped from the error: Gemini carries its key in the query.
pub(crate) fn transport(provider: ProviderId) -> impl FnOnce(reqwest::Error) -> RouterError {
    move |source| RouterError::Transport {
        provider,
        source: source.without_url(),
    }
}

pub(crate) fn malformed(provider: ProviderId, reason: impl Into<String>) -> RouterError {
    RouterError::UpstreamMalformed {
        provider,
        reason: reason.into(),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// `error.message` of a JSON error body, else the raw body, else a generic message
pub(crate) fn error_message(provider: ProviderId, body: &str) -> String {
    if let Ok(ErrorEnvelope {
        error: ErrorBody {
            message: Some(message),
        },
    }) = serde_json::from_str::<ErrorEnvelope>(body)
    {
        return message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("An error occurred with the {} API", provider.display_name())
    } else {
        trimmed.to_string()
    }
}

/// Check the status and decode a success body into `T`
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: ProviderId,
    response: reqwest::Response,
) -> Result<T, RouterError> {
    let status = response.status();
    let body = response.text().await.map_err(transport(provider))?;

    if !status.is_success() {
        let message = error_message(provider, &body);
        warn!(
            "{} API request failed with status {}: {}",
            provider.display_name(),
            status,
            message
        );
        return Err(RouterError::Upstream {
            provider,
            status: status.as_u16(),
            message,
        });
    }

    debug!("{} response: {} bytes", provider.display_name(), body.len());
    serde_json::from_str(&body).map_err(|e| malformed(provider, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    #[test]
    fn test_error_message_prefers_json_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            error_message(ProviderId::OpenAi, body),
            "Incorrect API key provided"
        );
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        assert_eq!(error_message(ProviderId::Groq, "  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(
            error_message(ProviderId::Groq, r#"{"error":{}}"#),
            r#"{"error":{}}"#
        );
        assert_eq!(
            error_message(ProviderId::Gemini, ""),
            "An error occurred with the Gemini API"
        );
    }

    #[test]
    fn test_api_key_rejects_blank() {
        let store = MemoryCredentialStore::new();
        assert!(matches!(
            api_key(&store, ProviderId::Claude),
            Err(RouterError::CredentialMissing(ProviderId::Claude))
        ));
        store.set(ProviderId::Claude, " ").unwrap();
        assert!(api_key(&store, ProviderId::Claude).is_err());
        store.set(ProviderId::Claude, "sk-ant-x").unwrap();
        assert_eq!(api_key(&store, ProviderId::Claude).unwrap(), "sk-ant-x");
    }
}
