use crate::error::{KernelError, Result};
use crate::llm::CompletionConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Service id whose execution settings are preferred.
pub const DEFAULT_SETTINGS_ID: &str = "default";

/// Contents of a prompt function's `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub execution_settings: BTreeMap<String, CompletionConfig>,
    #[serde(default)]
    pub input_variables: Vec<InputVariable>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputVariable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default = "required_by_default")]
    pub is_required: bool,
}

fn required_by_default() -> bool {
    true
}

impl PromptConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            KernelError::PluginError(format!("Invalid prompt config {}: {}", path.display(), e))
        })
    }

    /// Execution settings for this function: the `default` entry, else the
    /// first one by key order, else nothing.
    pub fn settings(&self) -> CompletionConfig {
        self.execution_settings
            .get(DEFAULT_SETTINGS_ID)
            .or_else(|| self.execution_settings.values().next())
            .cloned()
            .unwrap_or_default()
    }

    pub fn input_variable(&self, name: &str) -> Option<&InputVariable> {
        self.input_variables.iter().find(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_config() {
        let config: PromptConfig = serde_json::from_value(json!({
            "schema": 1,
            "type": "completion",
            "description": "Summarize text",
            "execution_settings": {
                "default": {"max_tokens": 500, "temperature": 0.2, "top_p": 0.9}
            },
            "input_variables": [
                {"name": "input", "description": "Text to summarize"},
                {"name": "style", "description": "Tone", "default": "neutral", "is_required": false}
            ]
        }))
        .unwrap();

        assert_eq!(config.description, "Summarize text");
        assert_eq!(config.settings().max_tokens, Some(500));
        assert!(config.input_variables[0].is_required);
        assert!(!config.input_variables[1].is_required);
        assert_eq!(
            config.input_variable("style").and_then(|v| v.default.clone()),
            Some(json!("neutral"))
        );
    }

    #[test]
    fn test_settings_prefers_default_entry() {
        let config: PromptConfig = serde_json::from_value(json!({
            "execution_settings": {
                "azure": {"temperature": 0.1},
                "default": {"temperature": 0.9}
            }
        }))
        .unwrap();
        assert_eq!(config.settings().temperature, Some(0.9));
    }

    #[test]
    fn test_settings_falls_back_to_first_entry() {
        let config: PromptConfig = serde_json::from_value(json!({
            "execution_settings": {
                "service_b": {"temperature": 0.5},
                "service_a": {"temperature": 0.1}
            }
        }))
        .unwrap();
        assert_eq!(config.settings().temperature, Some(0.1));
    }

    #[test]
    fn test_settings_empty() {
        assert_eq!(PromptConfig::default().settings(), CompletionConfig::default());
    }
}
