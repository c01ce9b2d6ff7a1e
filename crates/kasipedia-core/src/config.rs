//! Configuration loading and credential resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTENT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_VOICE_INSTRUCTION: &str = "You are Kasipedia's helpful voice assistant. \
    Keep your responses concise, informative, and suitable for an encyclopedia audience. \
    Use a neutral, slightly formal but engaging tone.";

/// Top-level Kasipedia configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<WebConfig>,
}

/// Credentials for the generative-language service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Env var holding the key. Defaults to `GEMINI_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Config {
    /// Load config from a JSON5 file. A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::KasipediaError::Io)?;

        let config: Config = json5::from_str(&raw)
            .map_err(|e| crate::error::KasipediaError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location (`~/.kasipedia/config.json`).
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Resolve the service credential from the config value or the
    /// configured env var (default `GEMINI_API_KEY`).
    pub fn resolve_api_key(&self) -> Option<String> {
        let provider = self.provider.clone().unwrap_or_default();
        resolve_secret_field(
            &provider.api_key,
            provider
                .api_key_env
                .as_deref()
                .unwrap_or(DEFAULT_API_KEY_ENV),
        )
    }

    pub fn content_model(&self) -> &str {
        self.content
            .as_ref()
            .and_then(|c| c.model.as_deref())
            .unwrap_or(DEFAULT_CONTENT_MODEL)
    }

    pub fn content_temperature(&self) -> f64 {
        self.content
            .as_ref()
            .and_then(|c| c.temperature)
            .unwrap_or(0.6)
    }

    pub fn live_model(&self) -> &str {
        self.live
            .as_ref()
            .and_then(|l| l.model.as_deref())
            .unwrap_or(DEFAULT_LIVE_MODEL)
    }

    pub fn voice_instruction(&self) -> &str {
        self.live
            .as_ref()
            .and_then(|l| l.system_instruction.as_deref())
            .unwrap_or(DEFAULT_VOICE_INSTRUCTION)
    }

    pub fn web_bind(&self) -> String {
        self.web
            .as_ref()
            .and_then(|w| w.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn web_port(&self) -> u16 {
        self.web.as_ref().and_then(|w| w.port).unwrap_or(8484)
    }
}

pub fn resolve_secret_field(direct: &Option<String>, env_var: &str) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Ok(val) = std::env::var(env_var) {
        if !val.is_empty() {
            return Some(val);
        }
    }
    None
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kasipedia")
}
