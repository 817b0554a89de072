//! Configuration management for Pagecast
//!
//! Every field carries a serde default so an empty (or missing) section is
//! valid. Secrets may also come from the environment.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, PagecastError, Result};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "PAGECAST_CONFIG";
/// Environment variable supplying the Facebook user access token
pub const FB_TOKEN_ENV: &str = "PAGECAST_FB_USER_TOKEN";
/// Environment variable supplying the Google AI API key
pub const GEMINI_KEY_ENV: &str = "PAGECAST_GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub facebook: FacebookConfig,
    pub instagram: InstagramConfig,
    pub gemini: GeminiConfig,
    pub publishing: PublishingConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/pagecast/pagecast.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacebookConfig {
    pub graph_url: String,
    pub video_url: String,
    pub api_version: String,
    pub page_id: Option<String>,
    pub user_token: Option<String>,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            graph_url: "https://graph.facebook.com".to_string(),
            video_url: "https://graph-video.facebook.com".to_string(),
            api_version: "v20.0".to_string(),
            page_id: None,
            user_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub enabled: bool,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub video_model: String,
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            image_model: "imagen-4.0-generate-001".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishingConfig {
    pub container_poll_interval_secs: u64,
    pub container_poll_attempts: u32,
    /// Concurrent carousel photo uploads
    pub upload_concurrency: usize,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            container_poll_interval_secs: 5,
            container_poll_attempts: 24,
            upload_concurrency: 3,
        }
    }
}

impl PublishingConfig {
    pub fn container_poll(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.container_poll_interval_secs),
            self.container_poll_attempts,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub video_poll_interval_secs: u64,
    pub video_poll_attempts: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            video_poll_interval_secs: 10,
            video_poll_attempts: 60,
            temperature: 0.7,
            max_tokens: 400,
        }
    }
}

impl GenerationConfig {
    pub fn video_poll(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.video_poll_interval_secs),
            self.video_poll_attempts,
        )
    }
}

/// Fixed-interval polling with a hard attempt ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// No sleeping between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(Duration::ZERO, max_attempts)
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default_config());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    /// Database path with `~` expanded
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.store.path).to_string())
    }

    /// Facebook user token, environment first
    pub fn user_token(&self) -> Option<SecretString> {
        secret_from(FB_TOKEN_ENV, self.facebook.user_token.as_deref())
    }

    /// Google AI key from environment or config file
    ///
    /// A key verified and saved through the preferences store is looked up
    /// separately by callers.
    pub fn gemini_api_key(&self) -> Option<SecretString> {
        secret_from(GEMINI_KEY_ENV, self.gemini.api_key.as_deref())
    }

    /// Target page, checked before anything talks to the Graph API
    pub fn page_id(&self) -> Result<String> {
        self.facebook
            .page_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                PagecastError::InvalidInput(
                    "No Facebook page id: set facebook.page_id in the config file".to_string(),
                )
            })
    }

    pub fn require_user_token(&self) -> Result<SecretString> {
        self.user_token().ok_or_else(|| {
            PagecastError::InvalidInput(format!(
                "No Facebook user access token: set facebook.user_token or {}",
                FB_TOKEN_ENV
            ))
        })
    }
}

fn secret_from(env_var: &str, configured: Option<&str>) -> Option<SecretString> {
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| configured.filter(|v| !v.trim().is_empty()).map(str::to_string))
        .map(SecretString::from)
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("pagecast").join("config.toml"))
}
