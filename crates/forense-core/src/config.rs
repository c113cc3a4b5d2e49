//! Application configuration management.
//!
//! Configuration is stored at `~/.config/forense/config.json`; a missing
//! file means defaults. `FORENSE_BASE_URL` overrides the API origin and
//! `FORENSE_GEMINI_KEY` supplies a custom key at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileStore, KeyringStore, MemoryStore, Storage, UsageLimits};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "forense";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "https://api.orodrigoalme.com";

/// HTTP request timeout in seconds.
/// Image analysis runs several detectors server-side, so allow generous time.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Delay before the demonstration result is shown while offline
const DEFAULT_DEMO_DELAY_MS: u64 = 2000;

pub const ENV_BASE_URL: &str = "FORENSE_BASE_URL";
pub const ENV_GEMINI_KEY: &str = "FORENSE_GEMINI_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub demo_delay_ms: u64,
    pub usage_limits: UsageLimits,
    pub storage: StorageBackend,
    /// Where file-backed session state lives; defaults to the cache dir
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            demo_delay_ms: DEFAULT_DEMO_DELAY_MS,
            usage_limits: UsageLimits::default(),
            storage: StorageBackend::default(),
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(std::env::var(ENV_BASE_URL).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_overrides(&mut self, base_url: Option<String>) {
        if let Some(url) = base_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            self.base_url = url;
        }
    }

    /// Custom key supplied through the environment, if non-blank
    pub fn gemini_key_from_env() -> Option<String> {
        std::env::var(ENV_GEMINI_KEY)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn demo_delay(&self) -> Duration {
        Duration::from_millis(self.demo_delay_ms)
    }

    /// Open the configured backend for persisted session state.
    pub fn open_store(&self) -> Result<Arc<dyn Storage>> {
        let store: Arc<dyn Storage> = match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(self.data_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStore::new()),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}
