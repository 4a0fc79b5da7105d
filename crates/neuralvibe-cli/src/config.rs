use anyhow::{Context, Result};
use neuralvibe_core::conversation::{DEFAULT_MAX_HISTORY, DEFAULT_SYSTEM_PROMPT};
use neuralvibe_core::credentials::mask_secret;
use neuralvibe_core::dispatcher::DEFAULT_TIMEOUT;
use neuralvibe_core::{
    ContextWindow, CredentialStore, Dispatcher, FileCredentialStore, MemoryCredentialStore,
    ProviderId, ProviderSettings,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeuralVibeConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Empty disables the synthesized system message
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ProviderId>,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_history: default_max_history(),
            timeout_secs: default_timeout_secs(),
            fallback: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<ProviderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude: Option<ProviderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<ProviderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groq: Option<ProviderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepseek: Option<ProviderConfig>,
}

impl ProvidersConfig {
    pub fn get(&self, provider: ProviderId) -> Option<&ProviderConfig> {
        match provider {
            ProviderId::OpenAi => self.openai.as_ref(),
            ProviderId::Claude => self.claude.as_ref(),
            ProviderId::Gemini => self.gemini.as_ref(),
            ProviderId::Groq => self.groq.as_ref(),
            ProviderId::DeepSeek => self.deepseek.as_ref(),
        }
    }

    fn slots_mut(&mut self) -> [&mut Option<ProviderConfig>; 5] {
        [
            &mut self.openai,
            &mut self.claude,
            &mut self.gemini,
            &mut self.groq,
            &mut self.deepseek,
        ]
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ProviderConfig {
    /// Key usable as a credential: set, and not an unexpanded `${VAR}`
    fn usable_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty() && !key.contains("${")).then_some(key)
    }

    fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".neuralvibe")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Where `neuralvibe keys` stores API keys
pub fn credentials_path() -> PathBuf {
    config_dir().join("credentials.json")
}

impl NeuralVibeConfig {
    /// Load the config file. A missing default file yields the defaults;
    /// an explicit `--config` path must exist.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path.clone().unwrap_or_else(default_config_path);
        if custom_path.is_none() && !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        // Refuse group/other-readable files on Unix, they may hold API keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `neuralvibe init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        // Check for hardcoded API keys in the unexpanded text
        if let Ok(raw) = toml::from_str::<Self>(&content) {
            for provider in ProviderId::ALL {
                let hardcoded = raw
                    .providers
                    .get(provider)
                    .is_some_and(|p| p.usable_key().is_some());
                if hardcoded {
                    warn!(
                        "{} API key is hardcoded in config file. For security, use environment variables: api_key = \"${{{}}}\"",
                        provider.display_name(),
                        env_var_for(provider)
                    );
                }
            }
        }

        Ok(config)
    }

    /// Parse TOML text after expanding allowlisted `${VAR}` references
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Copy with every API key masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for slot in copy.providers.slots_mut() {
            if let Some(p) = slot.as_mut() {
                p.api_key = mask_secret(&p.api_key);
            }
        }
        copy
    }

    /// Keys from the key file, overridden by non-empty keys in this config
    pub fn credential_store(&self, key_file: &Path) -> Result<MemoryCredentialStore> {
        let file = FileCredentialStore::open(key_file)
            .with_context(|| format!("Failed to load API keys from {}", key_file.display()))?;
        let store = MemoryCredentialStore::with_keys(file.entries());
        for provider in ProviderId::ALL {
            if let Some(key) = self.providers.get(provider).and_then(ProviderConfig::usable_key) {
                store.set(provider, key)?;
            }
        }
        Ok(store)
    }

    pub fn context_window(&self) -> ContextWindow {
        let prompt = self.router.system_prompt.trim();
        ContextWindow {
            system_prompt: (!prompt.is_empty()).then(|| prompt.to_string()),
            max_history: self.router.max_history,
        }
    }

    pub fn dispatcher(&self, store: Arc<dyn CredentialStore>) -> Result<Dispatcher> {
        let mut builder = Dispatcher::builder(store)
            .timeout(Duration::from_secs(self.router.timeout_secs))
            .context_window(self.context_window());
        for provider in ProviderId::ALL {
            if let Some(p) = self.providers.get(provider) {
                builder = builder.provider(provider, p.settings());
            }
        }
        builder.build().context("Failed to build dispatcher")
    }
}

fn env_var_for(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::OpenAi => "OPENAI_API_KEY",
        ProviderId::Claude => "ANTHROPIC_API_KEY",
        ProviderId::Gemini => "GOOGLE_AI_API_KEY",
        ProviderId::Groq => "GROQ_API_KEY",
        ProviderId::DeepSeek => "DEEPSEEK_API_KEY",
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GOOGLE_AI_API_KEY",
    "GROQ_API_KEY",
    "DEEPSEEK_API_KEY",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while let Some(start) = result[pos..].find("${") {
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = &result[abs_start + 2..abs_start + end];

        if !ALLOWED_ENV_VARS.contains(&var_name) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(var_name).unwrap_or_default();
        result.replace_range(abs_start..abs_start + end + 1, &value);
        pos = abs_start + value.len();
    }
    result
}
