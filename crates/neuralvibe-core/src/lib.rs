//! neuralvibe-core - Routing of chat messages across LLM backends
//!
//! This crate provides:
//! - A keyword domain classifier and a rule-based provider selection policy
//! - Adapters normalizing the Groq, Gemini, OpenAI, Claude and DeepSeek APIs
//! - A dispatcher that routes, windows the conversation and calls one adapter
//! - Credential stores and the static model catalog

pub mod catalog;
pub mod classifier;
pub mod conversation;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod policy;
pub mod providers;
pub mod types;

pub use classifier::{Domain, classify};
pub use conversation::{ContextWindow, Conversation};
pub use credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, available_providers,
};
pub use dispatcher::{Dispatch, Dispatcher, FallbackDispatch, FallbackDispatcher, ProviderSettings};
pub use error::{CredentialError, RouterError};
pub use policy::select_provider;
pub use providers::LlmProvider;
pub use types::{
    AvailableProviders, Message, NormalizedResponse, ProviderId, Role, RoutingDecision, Usage,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::mem::size_of::<Dispatcher>();
        let _ = std::mem::size_of::<FallbackDispatcher>();
        let _ = std::mem::size_of::<MemoryCredentialStore>();
        let _ = std::mem::size_of::<RoutingDecision>();
        assert_eq!(classify("hello there"), None);
    }
}
