use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neuralvibe_core::credentials::mask_secret;
use neuralvibe_core::{
    AvailableProviders, Conversation, CredentialStore, Dispatch, Dispatcher, FallbackDispatcher,
    FileCredentialStore, Message, ProviderId, Role, RouterError, catalog, classify,
    select_provider,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::NeuralVibeConfig;

#[derive(Parser)]
#[command(name = "neuralvibe")]
#[command(version)]
#[command(about = "NeuralVibe: route chat messages to the best available LLM")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration (API keys masked)
    Config,

    /// Manage stored API keys
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// List the model catalog
    Models,

    /// Print the detected domain of a text
    Classify {
        text: String,
    },

    /// Show which provider a message would be routed to, without sending it
    Route {
        message: String,

        /// JSON file with prior turns: [{"role": "user", "content": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Send a one-shot message
    Ask {
        /// The message to send
        message: String,
    },

    /// Interactive chat session
    Chat,
}

#[derive(Subcommand)]
enum KeysAction {
    /// Store an API key
    Set { provider: ProviderId, key: String },

    /// Remove a stored API key
    Remove { provider: ProviderId },

    /// List stored keys (masked)
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins when set
    let filter = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Keys { action } => cmd_keys(action, &config::credentials_path()),
        Commands::Models => cmd_models(),
        Commands::Classify { text } => cmd_classify(&text),
        Commands::Route { message, history } => {
            cmd_route(&cli.config, &message, history.as_deref())
        }
        Commands::Ask { message } => cmd_ask(&cli.config, &message).await,
        Commands::Chat => cmd_chat(&cli.config).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config::default_config_path();
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("NeuralVibe initialized at {}", config_dir.display());
    println!(
        "Add API keys with `neuralvibe keys set <provider> <key>` or edit {}.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = NeuralVibeConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

fn cmd_keys(action: KeysAction, key_file: &Path) -> Result<()> {
    let store = FileCredentialStore::open(key_file)
        .with_context(|| format!("Failed to open key file {}", key_file.display()))?;

    match action {
        KeysAction::Set { provider, key } => {
            let key = key.trim();
            anyhow::ensure!(!key.is_empty(), "API key must not be empty");
            store.set(provider, key)?;
            println!("Saved {} API key ({})", provider.display_name(), mask_secret(key));
        }
        KeysAction::Remove { provider } => {
            store.set(provider, "")?;
            println!("Removed {} API key", provider.display_name());
        }
        KeysAction::List => {
            for provider in ProviderId::ALL {
                match store.get(provider).filter(|k| !k.trim().is_empty()) {
                    Some(key) => println!("{:<10} {:<16} available", provider, mask_secret(&key)),
                    None => println!("{:<10} {:<16} missing", provider, "(not set)"),
                }
            }
            println!("Key file: {}", store.path().display());
        }
    }
    Ok(())
}

fn cmd_models() -> Result<()> {
    for model in &catalog::AVAILABLE_MODELS {
        println!(
            "{:<10} {:<16} {:<10} {:<24} {:>6}  {}",
            model.id,
            model.display_name,
            model.provider,
            model.wire_value,
            model.max_tokens,
            model.description
        );
    }
    Ok(())
}

fn cmd_classify(text: &str) -> Result<()> {
    match classify(text) {
        Some(domain) => println!("{domain}"),
        None => println!("none"),
    }
    Ok(())
}

/// One prior turn in a `--history` file
#[derive(Debug, Deserialize)]
struct HistoryEntry {
    role: Role,
    content: String,
}

fn load_history(path: &Path) -> Result<Vec<Message>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    let entries: Vec<HistoryEntry> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse history file {}", path.display()))?;
    Ok(entries
        .into_iter()
        .map(|e| Message::new(e.role, e.content))
        .collect())
}

fn cmd_route(config_path: &Option<PathBuf>, message: &str, history: Option<&Path>) -> Result<()> {
    let cfg = NeuralVibeConfig::load(config_path)?;
    let store = cfg.credential_store(&config::credentials_path())?;
    let available = neuralvibe_core::available_providers(&store);

    let mut conversation = match history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    conversation.push(Message::user(message));

    let decision = select_provider(&conversation, &available)?;
    println!("provider:  {}", decision.provider.display_name());
    println!("reason:    {}", decision.reason);
    println!(
        "available: {}",
        available
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

/// The dispatcher, optionally wrapped with the configured fallback
enum Router {
    Direct(Dispatcher),
    WithFallback(FallbackDispatcher),
}

struct Reply {
    dispatch: Dispatch,
    used_fallback: bool,
}

impl Router {
    fn from_config(cfg: &NeuralVibeConfig) -> Result<Self> {
        let store: Arc<dyn CredentialStore> =
            Arc::new(cfg.credential_store(&config::credentials_path())?);
        let dispatcher = cfg.dispatcher(store)?;
        Ok(match cfg.router.fallback {
            Some(secondary) => Self::WithFallback(FallbackDispatcher::new(dispatcher, secondary)),
            None => Self::Direct(dispatcher),
        })
    }

    fn available(&self) -> AvailableProviders {
        match self {
            Self::Direct(d) => d.available(),
            Self::WithFallback(f) => f.inner().available(),
        }
    }

    async fn send(&self, conversation: &[Message]) -> Result<Reply, RouterError> {
        let available = self.available();
        match self {
            Self::Direct(d) => Ok(Reply {
                dispatch: d.dispatch(conversation, &available).await?,
                used_fallback: false,
            }),
            Self::WithFallback(f) => {
                let out = f.dispatch(conversation, &available).await?;
                Ok(Reply {
                    dispatch: out.dispatch,
                    used_fallback: out.used_fallback,
                })
            }
        }
    }
}

fn print_header(reply: &Reply) {
    let badge = if reply.used_fallback { " (Fallback)" } else { "" };
    println!(
        "[{}{}] {}",
        reply.dispatch.provider.display_name(),
        badge,
        reply.dispatch.reason
    );
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = NeuralVibeConfig::load(config_path)?;
    let router = Router::from_config(&cfg)?;

    let mut conversation = Conversation::new();
    conversation.push_user(message);

    let reply = router.send(conversation.messages()).await?;
    print_header(&reply);
    println!("{}", reply.dispatch.response.content);
    let usage = reply.dispatch.response.usage;
    println!(
        "tokens: {} prompt + {} completion = {}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );
    Ok(())
}

async fn cmd_chat(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = NeuralVibeConfig::load(config_path)?;
    let router = Router::from_config(&cfg)?;
    let mut conversation = Conversation::new();

    println!("NeuralVibe chat. /clear resets the conversation, /quit exits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                conversation.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        conversation.push_user(input);
        match router.send(conversation.messages()).await {
            Ok(reply) => {
                print_header(&reply);
                println!("{}", reply.dispatch.response.content);
                conversation.push_assistant(
                    reply.dispatch.response.content.clone(),
                    reply.dispatch.response.usage,
                );
                println!(
                    "tokens: {} (session {})",
                    reply.dispatch.response.usage.total_tokens,
                    conversation.total_tokens()
                );
            }
            Err(e) => {
                warn!("Request failed: {}", e);
                println!("Error: {e}");
            }
        }
    }
    Ok(())
}
