//! Error types and result aliases for promptkernel.
//!
//! Configuration problems are reported when a service is constructed; every
//! other failure comes from a provider call and is passed through unchanged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("LLM gateway error: {0}")]
    GatewayError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Plugin error: {0}")]
    PluginError(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Function {function} not found in plugin {plugin}")]
    FunctionNotFound { plugin: String, function: String },

    #[error("Template error: {0}")]
    TemplateError(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
