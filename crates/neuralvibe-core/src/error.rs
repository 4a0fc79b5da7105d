//! Error taxonomy for routing and dispatch

use crate::types::ProviderId;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// No provider has a credential configured.
    #[error("no API providers available")]
    EmptyProviderSet,

    /// The selected provider has no credential. The policy only picks from the
    /// available set, so this means the caller handed in a stale set.
    #[error("{} API key is required", .0.display_name())]
    CredentialMissing(ProviderId),

    /// The selected provider has no adapter registered with the dispatcher.
    #[error("no adapter registered for provider {0}")]
    AdapterMissing(ProviderId),

    /// The backend answered with a non-success status.
    #[error("{} API request failed with status {status}: {message}", .provider.display_name())]
    Upstream {
        provider: ProviderId,
        status: u16,
        message: String,
    },

    /// The backend answered 2xx but the body is not in the documented shape.
    #[error("unexpected {} API response: {reason}", .provider.display_name())]
    UpstreamMalformed { provider: ProviderId, reason: String },

    /// Connect failure, timeout, or body read failure.
    #[error("failed to reach {} API: {source}", .provider.display_name())]
    Transport {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

impl RouterError {
    /// The remote call did not succeed. Drives the legacy fallback retry.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Transport { .. })
    }

    /// Provider the error originated from, when there is one
    pub fn provider(&self) -> Option<ProviderId> {
        match self {
            Self::CredentialMissing(p) | Self::AdapterMissing(p) => Some(*p),
            Self::Upstream { provider, .. }
            | Self::UpstreamMalformed { provider, .. }
            | Self::Transport { provider, .. } => Some(*provider),
            Self::EmptyProviderSet | Self::Http(_) => None,
        }
    }
}

/// Failures of a persistent credential store
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to access credential file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("credential file {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_failure_predicate() {
        let upstream = RouterError::Upstream {
            provider: ProviderId::OpenAi,
            status: 500,
            message: "boom".to_string(),
        };
        assert!(upstream.is_upstream_failure());
        assert!(!RouterError::EmptyProviderSet.is_upstream_failure());
        assert!(!RouterError::CredentialMissing(ProviderId::Groq).is_upstream_failure());
        let malformed = RouterError::UpstreamMalformed {
            provider: ProviderId::Gemini,
            reason: "no candidates".to_string(),
        };
        assert!(!malformed.is_upstream_failure());
    }

    #[test]
    fn test_error_messages_name_the_vendor() {
        let err = RouterError::Upstream {
            provider: ProviderId::Claude,
            status: 401,
            message: "invalid x-api-key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Claude API request failed with status 401: invalid x-api-key"
        );
        assert_eq!(
            RouterError::CredentialMissing(ProviderId::DeepSeek).to_string(),
            "DeepSeek API key is required"
        );
        assert_eq!(err.provider(), Some(ProviderId::Claude));
        assert_eq!(RouterError::EmptyProviderSet.provider(), None);
    }
}
