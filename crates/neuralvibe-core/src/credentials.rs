//! Per-provider API key storage
//!
//! One indexed store replaces a credential field per backend. Adapters read
//! the current value on every call; the router only ever sees the derived
//! [`AvailableProviders`] set.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use crate::error::CredentialError;
use crate::types::{AvailableProviders, ProviderId};

/// Opaque key storage keyed by provider
pub trait CredentialStore: Send + Sync {
    /// Current key for `provider`, if any
    fn get(&self, provider: ProviderId) -> Option<String>;

    /// Store `key` for `provider`. An empty key removes the entry.
    fn set(&self, provider: ProviderId, key: &str) -> Result<(), CredentialError>;
}

/// Providers whose key is present and not blank
pub fn available_providers(store: &dyn CredentialStore) -> AvailableProviders {
    ProviderId::ALL
        .into_iter()
        .filter(|p| store.get(*p).is_some_and(|k| !k.trim().is_empty()))
        .collect()
}

/// Mask a secret for display: first 3 and last 4 chars of long keys, `***` otherwise.
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

/// In-process store
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: RwLock<HashMap<ProviderId, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(provider, key)` pairs; blank keys are skipped
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = (ProviderId, S)>,
        S: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(|(p, k)| (p, k.into()))
            .filter(|(_, k)| !k.trim().is_empty())
            .collect();
        Self {
            keys: RwLock::new(keys),
        }
    }

    fn snapshot(&self) -> HashMap<ProviderId, String> {
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider: ProviderId) -> Option<String> {
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&provider)
            .cloned()
    }

    fn set(&self, provider: ProviderId, key: &str) -> Result<(), CredentialError> {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        if key.is_empty() {
            keys.remove(&provider);
        } else {
            keys.insert(provider, key.to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked: BTreeMap<ProviderId, String> = self
            .snapshot()
            .into_iter()
            .map(|(p, k)| (p, mask_secret(&k)))
            .collect();
        f.debug_struct("MemoryCredentialStore")
            .field("keys", &masked)
            .finish()
    }
}

/// JSON-file backed store, e.g. `~/.neuralvibe/credentials.json`.
///
/// The whole file is rewritten on every `set`.
pub struct FileCredentialStore {
    path: PathBuf,
    inner: MemoryCredentialStore,
}

impl FileCredentialStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let path = path.into();
        let keys: BTreeMap<ProviderId, String> = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(CredentialError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        debug!("Loaded {} credential(s) from {}", keys.len(), path.display());
        Ok(Self {
            path,
            inner: MemoryCredentialStore::with_keys(keys),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored `(provider, key)` pair, in provider order
    pub fn entries(&self) -> Vec<(ProviderId, String)> {
        let mut entries: Vec<_> = self.inner.snapshot().into_iter().collect();
        entries.sort_by_key(|(p, _)| *p);
        entries
    }

    fn persist(&self, keys: &BTreeMap<ProviderId, String>) -> Result<(), CredentialError> {
        let io_err = |source| CredentialError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let json = serde_json::to_string_pretty(keys).map_err(|source| CredentialError::Parse {
            path: self.path.display().to_string(),
            source,
        })?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&self.path, json).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, provider: ProviderId) -> Option<String> {
        self.inner.get(provider)
    }

    /// The file is written first; memory only changes once it is on disk.
    fn set(&self, provider: ProviderId, key: &str) -> Result<(), CredentialError> {
        let mut keys: BTreeMap<ProviderId, String> = self.inner.snapshot().into_iter().collect();
        if key.is_empty() {
            keys.remove(&provider);
        } else {
            keys.insert(provider, key.to_string());
        }
        self.persist(&keys)?;
        self.inner.set(provider, key)?;
        debug!("Stored credential for {} in {}", provider, self.path.display());
        Ok(())
    }
}

impl std::fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path)
            .field("inner", &self.inner)
            .finish()
    }
}
