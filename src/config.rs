//! Configuration management for release-confidence
//!
//! Stores settings in ~/.config/release-confidence/config.toml. Every field
//! has a default, so a missing file is not an error; a malformed one is.

use crate::keyring;
use crate::llm::ContextWindowClassifier;
use crate::truncation::{PatternMode, RiskClassifier, RiskPatterns};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const API_KEY_ENV: &str = "RELEASE_CONFIDENCE_API_KEY";
const MODEL_ENV: &str = "RELEASE_CONFIDENCE_MODEL";
const BASE_URL_ENV: &str = "RELEASE_CONFIDENCE_BASE_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSettings,
    pub truncation: TruncationSettings,
    /// `tracing` filter directive used when RUST_LOG is unset (e.g. "info")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub provider_name: String,
    pub max_tokens: u32,
    /// Per-request timeout; a timed-out attempt is never retried
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "anthropic/claude-sonnet-4".to_string(),
            provider_name: "openrouter".to_string(),
            max_tokens: 4096,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationSettings {
    /// JSON file with extra (or replacement) risk patterns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_patterns_path: Option<PathBuf>,
    pub risk_patterns_mode: PatternMode,
    /// Provider-specific context-window error fragments
    pub extra_context_indicators: Vec<String>,
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("release-confidence"))
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Load from `path` (or the default location) and apply environment
    /// overrides. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(path) if path.exists() => Self::load_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(model) = non_empty_env(MODEL_ENV) {
            self.llm.model = model;
        }
        if let Some(base_url) = non_empty_env(BASE_URL_ENV) {
            self.llm.base_url = base_url;
        }
    }

    fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path().context("Could not determine config directory"),
        }
    }

    /// Write these settings as a new config file. An existing file is only
    /// replaced when `overwrite` is set.
    pub fn init_file(&self, path: Option<&Path>, overwrite: bool) -> Result<PathBuf> {
        let path = Self::resolve_path(path)?;
        if path.exists() && !overwrite {
            anyhow::bail!(
                "Config file {} already exists (use --force to overwrite)",
                path.display()
            );
        }
        self.save(Some(&path))
    }

    /// Save config to `path` (or the default location)
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve_path(path)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    warn!("Failed to set config directory permissions: {}", e);
                }
            }
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(path)
    }

    /// The API key, from the environment first, then the system keychain
    pub fn api_key(&self) -> Option<String> {
        if let Some(key) = non_empty_env(API_KEY_ENV) {
            return Some(key);
        }
        match keyring::get_api_key() {
            Ok(key) => key,
            Err(err) => {
                keyring::warn_keychain_error_once("LLM API key", &err);
                None
            }
        }
    }

    /// Risk classifier from the embedded tables plus any configured overrides.
    /// `override_path` (from the command line) wins over the config file.
    pub fn risk_classifier(&self, override_path: Option<&Path>) -> Result<RiskClassifier> {
        let user_path = override_path.or(self.truncation.risk_patterns_path.as_deref());
        let patterns = match user_path {
            Some(path) => RiskPatterns::with_overrides(path, self.truncation.risk_patterns_mode)?,
            None => RiskPatterns::embedded()?,
        };
        Ok(RiskClassifier::new(&patterns)?)
    }

    pub fn context_classifier(&self) -> ContextWindowClassifier {
        ContextWindowClassifier::default().with_indicators(&self.truncation.extra_context_indicators)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
