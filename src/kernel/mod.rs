//! Plugin and function registry.

pub mod loader;
pub mod plugin;
pub mod prompt_config;
pub mod template;

pub use plugin::{validate_name, KernelArguments, KernelFunction, KernelPlugin, PromptFunction};
pub use prompt_config::{InputVariable, PromptConfig};
pub use template::PromptTemplate;

use crate::error::{KernelError, Result};
use crate::llm::tools::PluginTool;
use crate::llm::LlmTool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registered plugins, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Kernel {
    plugins: BTreeMap<String, KernelPlugin>,
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, replacing any plugin of the same name.
    pub fn add_plugin(&mut self, plugin: KernelPlugin) {
        if self.plugins.contains_key(plugin.name()) {
            debug!(plugin = %plugin.name(), "Replacing plugin");
        }
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Register a native function, creating its plugin when needed.
    pub fn add_function(
        &mut self,
        plugin_name: &str,
        function_name: &str,
        tool: Arc<dyn LlmTool>,
    ) -> Result<()> {
        if !self.plugins.contains_key(plugin_name) {
            self.plugins
                .insert(plugin_name.to_string(), KernelPlugin::new(plugin_name, "")?);
        }
        match self.plugins.get_mut(plugin_name) {
            Some(plugin) => plugin.add_function(function_name, KernelFunction::Native(tool)),
            None => Err(KernelError::PluginNotFound(plugin_name.to_string())),
        }
    }

    pub fn plugin(&self, name: &str) -> Result<&KernelPlugin> {
        self.plugins
            .get(name)
            .ok_or_else(|| KernelError::PluginNotFound(name.to_string()))
    }

    pub fn function(&self, plugin: &str, function: &str) -> Result<&KernelFunction> {
        self.plugin(plugin)?
            .function(function)
            .ok_or_else(|| KernelError::FunctionNotFound {
                plugin: plugin.to_string(),
                function: function.to_string(),
            })
    }

    pub fn plugins(&self) -> impl Iterator<Item = &KernelPlugin> {
        self.plugins.values()
    }

    /// Native functions offered to the model, named `plugin-function`.
    pub fn tools(&self) -> Vec<Arc<dyn LlmTool>> {
        let mut tools: Vec<Arc<dyn LlmTool>> = Vec::new();
        for plugin in self.plugins.values() {
            for (name, function) in plugin.functions() {
                if let KernelFunction::Native(tool) = function {
                    tools.push(Arc::new(PluginTool::new(plugin.name(), name, tool.clone())));
                }
            }
        }
        tools
    }
}
