//! Chat model configuration file.
//!
//! The file names a default provider/model pair and, per provider, the
//! credential, endpoint, enablement flag and the tuning parameters of each
//! model instance:
//!
//! ```json
//! {
//!   "default": { "provider": "deepseek", "model": "deepseek-chat" },
//!   "models": {
//!     "deepseek": {
//!       "api_key": "sk-...",
//!       "base_url": "https://api.deepseek.com/v1",
//!       "is_valid": 1,
//!       "instances": { "deepseek-chat": { "temperature": 0.7 } }
//!     }
//!   }
//! }
//! ```

use crate::error::{KernelError, Result};
use crate::llm::CompletionConfig;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "CHAT_MODELS_CONFIG";

/// Location of the config file relative to the service base directory.
pub const DEFAULT_CONFIG_RELATIVE_PATH: &str = "config/chat_models.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModelSelection {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    /// Azure only.
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_valid: bool,
    #[serde(default)]
    pub instances: BTreeMap<String, CompletionConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatModelsConfig {
    #[serde(default)]
    pub default: Option<ModelSelection>,
    #[serde(default)]
    pub models: BTreeMap<String, ProviderConfig>,
}

/// Everything needed to talk to one model, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub api_version: Option<String>,
    pub settings: CompletionConfig,
}

/// Accepts `1`/`0`, `true`/`false` and their string forms.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        serde_json::Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}

/// Environment variable consulted for a provider's credential.
pub fn api_key_env_var(provider: &str) -> String {
    let normalized: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_API_KEY", normalized)
}

/// Config file path for a base directory, honouring `CHAT_MODELS_CONFIG`.
pub fn default_config_path(base_dir: &Path) -> PathBuf {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => base_dir.join(DEFAULT_CONFIG_RELATIVE_PATH),
    }
}

impl ChatModelsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            KernelError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "Loaded chat model configuration");
        Self::from_json_str(&content).map_err(|e| match e {
            KernelError::ConfigError(msg) => {
                KernelError::ConfigError(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| KernelError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// The configured default provider/model pair.
    pub fn default_selection(&self) -> Result<&ModelSelection> {
        match &self.default {
            Some(sel) if !sel.provider.is_empty() && !sel.model.is_empty() => Ok(sel),
            _ => Err(KernelError::ConfigError(
                "No default provider and model configured".to_string(),
            )),
        }
    }

    /// Validate a provider/model choice and build its connection record.
    ///
    /// Falls back to the default pair unless both `provider` and `model` are
    /// given.
    pub fn resolve(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<ResolvedModel> {
        let (provider, model) = match (provider, model) {
            (Some(p), Some(m)) if !p.is_empty() && !m.is_empty() => (p, m),
            _ => {
                let selection = self.default_selection()?;
                (selection.provider.as_str(), selection.model.as_str())
            }
        };

        let provider_config = self.models.get(provider).ok_or_else(|| {
            KernelError::ConfigError(format!("Provider {} is not configured", provider))
        })?;

        if !provider_config.is_valid {
            return Err(KernelError::ConfigError(format!(
                "Provider {} is not enabled",
                provider
            )));
        }

        let settings = provider_config.instances.get(model).ok_or_else(|| {
            KernelError::ConfigError(format!(
                "Model {} is not configured for provider {}",
                model, provider
            ))
        })?;

        let api_key = api_key
            .filter(|k| !k.is_empty())
            .map(String::from)
            .or_else(|| Some(provider_config.api_key.clone()).filter(|k| !k.is_empty()))
            .or_else(|| {
                std::env::var(api_key_env_var(provider))
                    .ok()
                    .filter(|k| !k.is_empty())
            })
            .ok_or_else(|| {
                KernelError::ConfigError(format!(
                    "No API key for provider {} (set it in the config file or {})",
                    provider,
                    api_key_env_var(provider)
                ))
            })?;

        Ok(ResolvedModel {
            provider: provider.to_string(),
            model: model.to_string(),
            api_key,
            base_url: provider_config.base_url.clone(),
            api_version: provider_config.api_version.clone(),
            settings: settings.clone(),
        })
    }
}
