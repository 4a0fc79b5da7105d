//! Backend adapters
//!
//! Each adapter translates one backend's wire protocol into the common
//! [`NormalizedResponse`](crate::types::NormalizedResponse) shape. Groq and
//! DeepSeek speak the OpenAI wire format and reuse [`OpenAiProvider`] through
//! [`OpenAiCompatProvider`].

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod openai_compat;
mod wire;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use wire::LlmProvider;
