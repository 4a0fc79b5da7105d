//! Dispatch: route a conversation, then call the chosen adapter
//!
//! [`Dispatcher`] is the single entry point. It asks the routing policy for a
//! provider, resolves the model string, windows the conversation and hands it
//! to the adapter registered for that provider. Adapter errors surface as-is.
//! [`FallbackDispatcher`] wraps it with the one-shot secondary retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::conversation::ContextWindow;
use crate::credentials::{self, CredentialStore};
use crate::error::RouterError;
use crate::policy;
use crate::providers::{
    AnthropicProvider, GoogleProvider, LlmProvider, OpenAiCompatProvider, OpenAiProvider,
};
use crate::types::{AvailableProviders, Message, NormalizedResponse, ProviderId};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of one routed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub provider: ProviderId,
    pub reason: String,
    /// Wire model string that was sent
    pub model: String,
    pub response: NormalizedResponse,
}

/// Per-provider overrides applied when the adapters are built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
}

pub struct Dispatcher {
    adapters: HashMap<ProviderId, Arc<dyn LlmProvider>>,
    store: Arc<dyn CredentialStore>,
    models: HashMap<ProviderId, String>,
    window: ContextWindow,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut adapters: Vec<ProviderId> = self.adapters.keys().copied().collect();
        adapters.sort();
        f.debug_struct("Dispatcher")
            .field("adapters", &adapters)
            .field("models", &self.models)
            .field("window", &self.window)
            .finish()
    }
}

impl Dispatcher {
    /// An empty dispatcher. Register adapters with [`Dispatcher::with_adapter`].
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            adapters: HashMap::new(),
            store,
            models: HashMap::new(),
            window: ContextWindow::default(),
        }
    }

    /// Builder wiring all five backends over one HTTP client
    pub fn builder(store: Arc<dyn CredentialStore>) -> DispatcherBuilder {
        DispatcherBuilder::new(store)
    }

    /// Register `adapter` under its own id, replacing any previous one
    pub fn with_adapter(mut self, adapter: Arc<dyn LlmProvider>) -> Self {
        self.adapters.insert(adapter.id(), adapter);
        self
    }

    pub fn with_model(mut self, provider: ProviderId, model: impl Into<String>) -> Self {
        self.models.insert(provider, model.into());
        self
    }

    pub fn with_context_window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        self
    }

    pub fn context_window(&self) -> &ContextWindow {
        &self.window
    }

    /// Providers with a usable key right now
    pub fn available(&self) -> AvailableProviders {
        credentials::available_providers(self.store.as_ref())
    }

    /// Wire model for `provider`: configured override, else the catalog default
    pub fn model_for(&self, provider: ProviderId) -> &str {
        self.models
            .get(&provider)
            .map(String::as_str)
            .unwrap_or(catalog::default_model(provider).wire_value)
    }

    /// Route `conversation` within `available` and send it.
    ///
    /// # Errors
    ///
    /// Routing errors ([`RouterError::EmptyProviderSet`]),
    /// [`RouterError::AdapterMissing`] when nothing is registered for the
    /// chosen provider, and any adapter error unchanged.
    pub async fn dispatch(
        &self,
        conversation: &[Message],
        available: &AvailableProviders,
    ) -> Result<Dispatch, RouterError> {
        let decision = policy::select_provider(conversation, available)?;
        let adapter = self
            .adapters
            .get(&decision.provider)
            .ok_or(RouterError::AdapterMissing(decision.provider))?;

        let model = self.model_for(decision.provider).to_string();
        let request = self.window.apply(conversation);
        debug!(
            "Dispatching {} messages to {} ({})",
            request.len(),
            decision.provider.display_name(),
            model
        );

        let response = adapter.send(&request, &model).await?;
        info!(
            "{} answered: {} chars, {} tokens",
            decision.provider.display_name(),
            response.content.chars().count(),
            response.usage.total_tokens
        );

        Ok(Dispatch {
            provider: decision.provider,
            reason: decision.reason,
            model,
            response,
        })
    }
}

/// Builds a [`Dispatcher`] with every backend adapter registered
pub struct DispatcherBuilder {
    store: Arc<dyn CredentialStore>,
    timeout: Duration,
    window: ContextWindow,
    settings: HashMap<ProviderId, ProviderSettings>,
}

impl DispatcherBuilder {
    fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
            window: ContextWindow::default(),
            settings: HashMap::new(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn context_window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        self
    }

    pub fn provider(mut self, provider: ProviderId, settings: ProviderSettings) -> Self {
        self.settings.insert(provider, settings);
        self
    }

    /// # Errors
    ///
    /// [`RouterError::Http`] when the HTTP client cannot be constructed.
    pub fn build(self) -> Result<Dispatcher, RouterError> {
        let client = Client::builder().timeout(self.timeout).build()?;
        let mut dispatcher =
            Dispatcher::new(self.store.clone()).with_context_window(self.window);

        for provider in ProviderId::ALL {
            let settings = self.settings.get(&provider).cloned().unwrap_or_default();
            let adapter = build_adapter(provider, &settings, client.clone(), self.store.clone());
            dispatcher = dispatcher.with_adapter(adapter);
            if let Some(model) = settings.model.filter(|m| !m.trim().is_empty()) {
                dispatcher = dispatcher.with_model(provider, model);
            }
        }

        debug!(
            "Dispatcher ready: timeout={:?}, {} adapters",
            self.timeout,
            dispatcher.adapters.len()
        );
        Ok(dispatcher)
    }
}

fn build_adapter(
    provider: ProviderId,
    settings: &ProviderSettings,
    client: Client,
    store: Arc<dyn CredentialStore>,
) -> Arc<dyn LlmProvider> {
    let base_url = settings.base_url.as_deref().filter(|u| !u.trim().is_empty());
    match provider {
        ProviderId::OpenAi => {
            let mut p = OpenAiProvider::new(client, store);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            if settings.max_tokens.is_some() {
                p = p.with_max_tokens(settings.max_tokens);
            }
            Arc::new(p)
        }
        ProviderId::Groq | ProviderId::DeepSeek => {
            let mut p = if provider == ProviderId::Groq {
                OpenAiCompatProvider::groq(client, store)
            } else {
                OpenAiCompatProvider::deepseek(client, store)
            };
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            if settings.max_tokens.is_some() {
                p = p.with_max_tokens(settings.max_tokens);
            }
            Arc::new(p)
        }
        ProviderId::Claude => {
            let mut p = AnthropicProvider::new(client, store);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            if let Some(n) = settings.max_tokens {
                p = p.with_max_tokens(n);
            }
            Arc::new(p)
        }
        ProviderId::Gemini => {
            let mut p = GoogleProvider::new(client, store);
            if let Some(url) = base_url {
                p = p.with_base_url(url);
            }
            if let Some(n) = settings.max_tokens {
                p = p.with_max_tokens(n);
            }
            Arc::new(p)
        }
    }
}

/// Outcome of a call through [`FallbackDispatcher`]
#[derive(Debug)]
pub struct FallbackDispatch {
    pub dispatch: Dispatch,
    pub used_fallback: bool,
    /// Why the first provider failed, when the secondary answered instead
    pub primary_error: Option<RouterError>,
}

/// Retries once on a designated secondary provider after an upstream failure.
/// Never retries more than once and never on any other provider.
#[derive(Debug)]
pub struct FallbackDispatcher {
    inner: Dispatcher,
    secondary: ProviderId,
}

impl FallbackDispatcher {
    pub fn new(inner: Dispatcher, secondary: ProviderId) -> Self {
        Self { inner, secondary }
    }

    pub fn inner(&self) -> &Dispatcher {
        &self.inner
    }

    pub fn secondary(&self) -> ProviderId {
        self.secondary
    }

    /// # Errors
    ///
    /// The primary error when no retry applies, otherwise the secondary's error.
    pub async fn dispatch(
        &self,
        conversation: &[Message],
        available: &AvailableProviders,
    ) -> Result<FallbackDispatch, RouterError> {
        let primary_error = match self.inner.dispatch(conversation, available).await {
            Ok(dispatch) => {
                return Ok(FallbackDispatch {
                    dispatch,
                    used_fallback: false,
                    primary_error: None,
                });
            }
            Err(e) => e,
        };

        let retryable = primary_error.is_upstream_failure()
            && available.contains(self.secondary)
            && primary_error.provider() != Some(self.secondary);
        if !retryable {
            return Err(primary_error);
        }

        warn!(
            "Primary provider failed ({}), falling back to {}",
            primary_error,
            self.secondary.display_name()
        );
        let dispatch = self
            .inner
            .dispatch(conversation, &AvailableProviders::only(self.secondary))
            .await?;

        Ok(FallbackDispatch {
            dispatch,
            used_fallback: true,
            primary_error: Some(primary_error),
        })
    }
}
