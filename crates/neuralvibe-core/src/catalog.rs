//! Static model catalog

use serde::Serialize;

use crate::types::ProviderId;

/// A concrete model a provider can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelOption {
    pub id: &'static str,
    pub display_name: &'static str,
    /// String sent in the request's model field
    pub wire_value: &'static str,
    pub description: &'static str,
    pub max_tokens: u32,
    pub provider: ProviderId,
}

pub static AVAILABLE_MODELS: [ModelOption; 5] = [
    ModelOption {
        id: "llama3",
        display_name: "LLaMA 3",
        wire_value: "llama3-70b-8192",
        description: "Meta's optimized 70B parameter model",
        max_tokens: 8192,
        provider: ProviderId::Groq,
    },
    ModelOption {
        id: "gpt4o",
        display_name: "GPT-4o",
        wire_value: "gpt-4o",
        description: "OpenAI's most capable multimodal model",
        max_tokens: 8192,
        provider: ProviderId::OpenAi,
    },
    ModelOption {
        id: "claude3",
        display_name: "Claude 3 Opus",
        wire_value: "claude-3-opus-20240229",
        description: "Anthropic's most capable language model",
        max_tokens: 4096,
        provider: ProviderId::Claude,
    },
    ModelOption {
        id: "deepseek",
        display_name: "DeepSeek Chat",
        wire_value: "deepseek-chat",
        description: "DeepSeek's large language model",
        max_tokens: 4096,
        provider: ProviderId::DeepSeek,
    },
    ModelOption {
        id: "gemini",
        display_name: "Gemini Pro",
        wire_value: "gemini-1.5-pro-latest",
        description: "Google's advanced multimodal model",
        max_tokens: 8192,
        provider: ProviderId::Gemini,
    },
];

/// Model sent to `provider` when configuration does not override it
pub fn default_model(provider: ProviderId) -> &'static ModelOption {
    AVAILABLE_MODELS
        .iter()
        .find(|m| m.provider == provider)
        .unwrap_or(&AVAILABLE_MODELS[0])
}

/// Look a model up by catalog id
pub fn find(id: &str) -> Option<&'static ModelOption> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}
