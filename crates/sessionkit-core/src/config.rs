//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, request timeout, deployment environment and where credentials
//! are kept. Environment variables override the file.
//!
//! Configuration is stored at `~/.config/sessionkit/config.json`; the
//! session file lives in `~/.cache/sessionkit/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiClient, DEFAULT_TIMEOUT_MS};
use crate::auth::{FileStorage, KeyringStorage, MemoryStorage, SlotStorage, TokenStore, SESSION_FILE};
use crate::clock::{Clock, SystemClock};
use crate::session::SessionManager;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "sessionkit";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API used when nothing is configured
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

pub const ENV_API_URL: &str = "SESSIONKIT_API_URL";
pub const ENV_API_TIMEOUT_MS: &str = "SESSIONKIT_API_TIMEOUT_MS";
pub const ENV_ENVIRONMENT: &str = "SESSIONKIT_ENV";
pub const ENV_STORAGE: &str = "SESSIONKIT_STORAGE";
pub const ENV_STORAGE_KEY: &str = "SESSIONKIT_STORAGE_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    /// Credentials only travel over HTTPS
    Production,
}

impl Environment {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Where the credential slots are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// JSON file in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Nothing survives the process
    Memory,
}

impl StorageKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Some(StorageKind::File),
            "keyring" | "keychain" => Some(StorageKind::Keyring),
            "memory" => Some(StorageKind::Memory),
            _ => None,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub api_timeout_ms: u64,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub storage: StorageKind,
    /// Seals the session file; only ever read from the environment
    #[serde(skip)]
    pub storage_passphrase: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            api_timeout_ms: default_timeout_ms(),
            environment: Environment::default(),
            storage: StorageKind::default(),
            storage_passphrase: None,
        }
    }
}

impl ClientConfig {
    /// Load the config file (defaults when absent), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(ms) = lookup(ENV_API_TIMEOUT_MS) {
            self.api_timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds", ENV_API_TIMEOUT_MS))?;
        }
        if let Some(env) = lookup(ENV_ENVIRONMENT) {
            self.environment = match Environment::from_str(&env) {
                Some(env) => env,
                None => bail!("Unknown {} value: {}", ENV_ENVIRONMENT, env),
            };
        }
        if let Some(storage) = lookup(ENV_STORAGE) {
            self.storage = match StorageKind::from_str(&storage) {
                Some(storage) => storage,
                None => bail!("Unknown {} value: {}", ENV_STORAGE, storage),
            };
        }
        if let Some(key) = lookup(ENV_STORAGE_KEY) {
            self.storage_passphrase = Some(key);
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    /// Build the configured slot storage, keeping files under `cache_dir`
    pub fn build_storage(&self, cache_dir: &Path, clock: Arc<dyn Clock>) -> Result<Arc<dyn SlotStorage>> {
        let storage: Arc<dyn SlotStorage> = match self.storage {
            StorageKind::Memory => Arc::new(MemoryStorage::new(clock)),
            StorageKind::Keyring => Arc::new(KeyringStorage::new(clock)),
            StorageKind::File => {
                let file = FileStorage::open(cache_dir.join(SESSION_FILE), clock)?;
                match self.storage_passphrase {
                    Some(ref passphrase) => Arc::new(file.with_passphrase(passphrase)?),
                    None => Arc::new(file),
                }
            }
        };
        debug!(storage = ?self.storage, "Credential storage ready");
        Ok(storage)
    }

    /// Build the gateway over `tokens`. Production refuses plain HTTP.
    pub fn build_client(&self, tokens: Arc<TokenStore>) -> Result<ApiClient> {
        ApiClient::builder(self.api_base_url.clone())
            .timeout(self.timeout())
            .https_only(self.environment == Environment::Production)
            .build(tokens)
            .context("Failed to create API client")
    }

    /// Wire storage, token store, gateway and session manager together
    pub fn connect(&self) -> Result<SessionManager> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let storage = self.build_storage(&Self::cache_dir()?, clock.clone())?;
        let tokens = Arc::new(TokenStore::new(storage, clock));
        Ok(SessionManager::new(self.build_client(tokens)?))
    }
}
