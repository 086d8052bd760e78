//! User settings, stored as JSON in the config directory.
//!
//! Resolution of the config directory: `--config` flag, then the
//! `MAIIDE_CONFIG_DIR` environment variable, then `~/.maiide`.
//! A missing settings file means "all defaults".

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::client::{DEFAULT_BASE_URL, ModelDescriptor};

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const CONFIG_DIR_ENV: &str = "MAIIDE_CONFIG_DIR";
pub const FALLBACK_MODEL: &str = "openrouter/auto";

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("OpenRouter API key not set. Add \"apiKey\" to {} or set {API_KEY_ENV}.", .settings_path.display())]
    MissingCredential { settings_path: PathBuf },

    #[error("failed to read settings {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("invalid settings JSON at {}: {source}", .path.display())]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("failed to write settings {}: {source}", .path.display())]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextSettings {
    /// Append the editor selection to each user turn.
    pub include_selection: bool,
    /// Append the whole active file to each user turn.
    pub include_active_file: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            include_selection: true,
            include_active_file: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentActionSettings {
    /// Act on `[ACTION: ...]` directives in replies.
    pub enabled: bool,
    /// Ask before `insert_at_cursor` too. Off by default: insertion has
    /// never been confirmation-gated, unlike commands and file creation.
    pub confirm_insert_at_cursor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub base_url: String,
    pub context: ContextSettings,
    pub agent_actions: AgentActionSettings,
    /// Seconds to wait for the next chunk of a streamed reply; 0 disables.
    pub stream_idle_timeout_secs: u64,
    pub check_for_updates: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            system_prompt: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            context: ContextSettings::default(),
            agent_actions: AgentActionSettings::default(),
            stream_idle_timeout_secs: 120,
            check_for_updates: true,
        }
    }
}

impl Settings {
    /// The settings value wins; the environment variable is the fallback.
    pub fn resolve_api_key(&self, settings_path: &Path) -> Result<String, ConfigError> {
        self.resolve_api_key_with(std::env::var(API_KEY_ENV).ok(), settings_path)
    }

    pub fn resolve_api_key_with(
        &self,
        env_value: Option<String>,
        settings_path: &Path,
    ) -> Result<String, ConfigError> {
        [self.api_key.clone(), env_value]
            .into_iter()
            .flatten()
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                settings_path: settings_path.to_path_buf(),
            })
    }

    /// Model for a chat request: the requested one, the configured one, or
    /// the service's automatic router.
    pub fn chat_model(&self, requested: Option<&str>) -> String {
        [requested, self.model.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|model| !model.is_empty())
            .unwrap_or(FALLBACK_MODEL)
            .to_string()
    }

    /// Model to preselect in a freshly listed picker.
    pub fn default_model(&self, listed: &[ModelDescriptor]) -> Option<String> {
        self.model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .or_else(|| listed.first().map(|m| m.id.clone()))
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref().filter(|p| !p.trim().is_empty())
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_secs > 0).then(|| Duration::from_secs(self.stream_idle_timeout_secs))
    }
}

pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".maiide"))
        .unwrap_or_else(|| PathBuf::from(".maiide"))
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE_NAME)
}

pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "Settings file does not exist; using defaults");
        return Ok(Settings::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

/// Write the settings through a temp file so a crash never leaves half a file.
pub fn save(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let data = serde_json::to_vec_pretty(settings).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;
    info!(path = %path.display(), "Saved settings");
    Ok(())
}
