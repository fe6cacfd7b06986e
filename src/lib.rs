//! promptkernel: a chat-completion service with prompt plugins and native
//! function calling.
//!
//! A [`KernelService`](service::KernelService) is bound to one model chosen
//! from a JSON configuration file. It sends conversations to that model,
//! runs prompt-template plugins loaded from directories, and lets the model
//! call registered native functions automatically.

pub mod config;
pub mod core_plugins;
pub mod error;
pub mod kernel;
pub mod llm;
pub mod service;

pub use error::{KernelError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{ChatModelsConfig, ResolvedModel};
    pub use crate::error::{KernelError, Result};
    pub use crate::kernel::{KernelArguments, KernelFunction, KernelPlugin};
    pub use crate::llm::tools::{parse_args, FunctionDescriptor, LlmTool, ToolDescriptor};
    pub use crate::llm::{CompletionConfig, LlmBroker, LlmGateway, LlmMessage, MessageRole};
    pub use crate::service::{InvokeOptions, KernelService, CUSTOM_FUNCTIONS_PLUGIN};
}
