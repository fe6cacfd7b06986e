pub mod anthropic;
pub mod openai;
pub mod openai_messages_adapter;
mod sse;

pub use anthropic::{AnthropicConfig, AnthropicGateway};
pub use openai::{ApiFlavor, OpenAIConfig, OpenAIGateway};

use crate::config::ResolvedModel;
use crate::error::{KernelError, Result};
use crate::llm::gateway::LlmGateway;
use std::sync::Arc;
use tracing::info;

/// Build the gateway that serves a resolved model's provider.
///
/// Provider ids are matched case-insensitively.
pub fn gateway_for(resolved: &ResolvedModel) -> Result<Arc<dyn LlmGateway>> {
    let provider = resolved.provider.to_ascii_lowercase();
    info!(provider = %provider, model = %resolved.model, "Creating gateway");

    match provider.as_str() {
        "openai" | "deepseek" | "silicon" | "siliconflow" | "qwen" => {
            let base_url = if resolved.base_url.is_empty() {
                openai::OPENAI_DEFAULT_BASE_URL.to_string()
            } else {
                resolved.base_url.clone()
            };
            Ok(Arc::new(OpenAIGateway::with_api_key_and_base_url(
                &resolved.api_key,
                base_url,
            )?))
        }
        "azure" => {
            if resolved.base_url.is_empty() {
                return Err(KernelError::ConfigError(
                    "Azure OpenAI requires a base_url naming the resource endpoint".to_string(),
                ));
            }
            Ok(Arc::new(OpenAIGateway::with_config(OpenAIConfig {
                api_key: resolved.api_key.clone(),
                base_url: resolved.base_url.clone(),
                timeout: None,
                flavor: ApiFlavor::Azure {
                    api_version: resolved
                        .api_version
                        .clone()
                        .unwrap_or_else(|| openai::AZURE_DEFAULT_API_VERSION.to_string()),
                },
            })?))
        }
        "anthropic" | "claude" => Ok(Arc::new(AnthropicGateway::with_api_key_and_base_url(
            &resolved.api_key,
            &resolved.base_url,
        )?)),
        _ => Err(KernelError::UnsupportedProvider(resolved.provider.clone())),
    }
}
