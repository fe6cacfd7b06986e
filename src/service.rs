//! High-level chat service: model selection, prompt calls and plugin calls.
//!
//! ```ignore
//! use promptkernel::prelude::*;
//!
//! let mut service = KernelService::builder().base_dir(".").build()?;
//! service.add_semantic_functions("plugins")?;
//!
//! let answer = service
//!     .invoke_prompt(&[LlmMessage::user("Hello")], InvokeOptions::default())
//!     .await?;
//! ```

use crate::config::{default_config_path, ChatModelsConfig, ResolvedModel};
use crate::error::{KernelError, Result};
use crate::kernel::loader::{is_function_dir, is_plugin_dir, load_plugin_dir, sorted_subdirs, CONFIG_FILE};
use crate::kernel::{Kernel, KernelArguments, KernelFunction, KernelPlugin};
use crate::llm::broker::DEFAULT_MAX_AUTO_INVOKE_ATTEMPTS;
use crate::llm::gateways::gateway_for;
use crate::llm::models::build_history;
use crate::llm::{CompletionConfig, LlmBroker, LlmGateway, LlmMessage, LlmTool, TextStream};
use futures::stream::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Plugin that holds functions registered with [`KernelService::add_native_function`].
pub const CUSTOM_FUNCTIONS_PLUGIN: &str = "custom_functions";

/// Per-call options for prompt invocation.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub system_prompt: Option<String>,
    /// Offer registered native functions to the model and run the ones it calls.
    pub auto_calls: bool,
    /// Overrides layered on top of function and service settings.
    pub settings: CompletionConfig,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            auto_calls: true,
            settings: CompletionConfig::default(),
        }
    }
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_auto_calls(mut self, auto_calls: bool) -> Self {
        self.auto_calls = auto_calls;
        self
    }

    pub fn with_settings(mut self, settings: CompletionConfig) -> Self {
        self.settings = settings;
        self
    }
}

/// Builder for [`KernelService`].
pub struct KernelServiceBuilder {
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    config_path: Option<PathBuf>,
    config: Option<ChatModelsConfig>,
    base_dir: Option<PathBuf>,
    settings: CompletionConfig,
    max_auto_invoke_attempts: usize,
    gateway: Option<Arc<dyn LlmGateway>>,
    core_plugins: bool,
}

impl Default for KernelServiceBuilder {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            api_key: None,
            config_path: None,
            config: None,
            base_dir: None,
            settings: CompletionConfig::default(),
            max_auto_invoke_attempts: DEFAULT_MAX_AUTO_INVOKE_ATTEMPTS,
            gateway: None,
            core_plugins: false,
        }
    }
}

impl KernelServiceBuilder {
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Read model configuration from this file instead of the default location.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Use an already-loaded configuration.
    pub fn config(mut self, config: ChatModelsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Directory that relative plugin paths and the default config path resolve against.
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Service-wide tuning, layered over the model instance defaults.
    pub fn settings(mut self, settings: CompletionConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_auto_invoke_attempts(mut self, attempts: usize) -> Self {
        self.max_auto_invoke_attempts = attempts;
        self
    }

    /// Talk to this gateway instead of the one the provider selects.
    pub fn gateway(mut self, gateway: Arc<dyn LlmGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Register the built-in `time` and `math` plugins.
    pub fn with_core_plugins(mut self) -> Self {
        self.core_plugins = true;
        self
    }

    pub fn build(self) -> Result<KernelService> {
        let base_dir = match self.base_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };

        let config = match self.config {
            Some(config) => config,
            None => {
                let path = self
                    .config_path
                    .unwrap_or_else(|| default_config_path(&base_dir));
                ChatModelsConfig::load(path)?
            }
        };

        let resolved = config.resolve(
            self.provider.as_deref(),
            self.model.as_deref(),
            self.api_key.as_deref(),
        )?;

        let gateway = match self.gateway {
            Some(gateway) => gateway,
            None => gateway_for(&resolved)?,
        };

        let broker = LlmBroker::new(&resolved.model, gateway)
            .with_max_auto_invoke_attempts(self.max_auto_invoke_attempts);
        let settings = resolved.settings.merged_with(&self.settings);

        let mut kernel = Kernel::new();
        if self.core_plugins {
            kernel.add_plugin(crate::core_plugins::time_plugin()?);
            kernel.add_plugin(crate::core_plugins::math_plugin()?);
        }

        info!(provider = %resolved.provider, model = %resolved.model, "Kernel service ready");

        Ok(KernelService {
            resolved,
            base_dir,
            broker,
            kernel,
            settings,
        })
    }
}

/// Chat service bound to one configured model.
pub struct KernelService {
    resolved: ResolvedModel,
    base_dir: PathBuf,
    broker: LlmBroker,
    kernel: Kernel,
    settings: CompletionConfig,
}

impl KernelService {
    pub fn builder() -> KernelServiceBuilder {
        KernelServiceBuilder::default()
    }

    /// Service for the configured default model, read from the default config path.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn provider(&self) -> &str {
        &self.resolved.provider
    }

    pub fn model(&self) -> &str {
        &self.resolved.model
    }

    pub fn base_url(&self) -> &str {
        &self.resolved.base_url
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings(&self) -> &CompletionConfig {
        &self.settings
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn offered_tools(&self, auto_calls: bool) -> Option<Vec<Arc<dyn LlmTool>>> {
        if !auto_calls {
            return None;
        }
        let tools = self.kernel.tools();
        if tools.is_empty() {
            None
        } else {
            Some(tools)
        }
    }

    /// Send a conversation and return the model's answer.
    ///
    /// Only user and assistant messages are forwarded; the system prompt, when
    /// given, is placed first.
    pub async fn invoke_prompt(&self, messages: &[LlmMessage], options: InvokeOptions) -> Result<String> {
        let history = build_history(options.system_prompt.as_deref(), messages);
        let settings = self.settings.merged_with(&options.settings);
        let tools = self.offered_tools(options.auto_calls);

        debug!(messages = history.len(), auto_calls = options.auto_calls, "Invoking prompt");
        self.broker.generate(&history, tools.as_deref(), &settings).await
    }

    /// Streaming form of [`invoke_prompt`](Self::invoke_prompt).
    pub fn invoke_prompt_stream(&self, messages: &[LlmMessage], options: InvokeOptions) -> TextStream<'_> {
        let history = build_history(options.system_prompt.as_deref(), messages);
        let settings = self.settings.merged_with(&options.settings);
        let tools = self.offered_tools(options.auto_calls);

        debug!(messages = history.len(), auto_calls = options.auto_calls, "Invoking prompt stream");
        self.broker.generate_stream(history, tools, settings)
    }

    /// Call a registered function by plugin and function name.
    ///
    /// Prompt functions are rendered with `arguments` and sent to the model
    /// with automatic function calling. Native functions run directly.
    pub async fn invoke_plugin_function(
        &self,
        plugin: &str,
        function: &str,
        arguments: KernelArguments,
    ) -> Result<String> {
        info!(plugin, function, "Invoking plugin function");

        match self.kernel.function(plugin, function)? {
            KernelFunction::Prompt(prompt) => {
                let messages = vec![LlmMessage::user(prompt.render(&arguments)?)];
                let settings = self.settings.merged_with(&prompt.settings());
                let tools = self.offered_tools(true);
                self.broker.generate(&messages, tools.as_deref(), &settings).await
            }
            KernelFunction::Native(tool) => Ok(value_to_text(tool.run(&arguments)?)),
        }
    }

    /// Streaming form of [`invoke_plugin_function`](Self::invoke_plugin_function).
    ///
    /// A native function yields its whole result as one fragment.
    pub fn invoke_plugin_function_stream(
        &self,
        plugin: &str,
        function: &str,
        arguments: KernelArguments,
    ) -> TextStream<'_> {
        info!(plugin, function, "Invoking plugin function stream");
        let target = self.kernel.function(plugin, function).cloned();

        Box::pin(async_stream::stream! {
            match target {
                Err(e) => yield Err(e),
                Ok(KernelFunction::Native(tool)) => {
                    yield tool.run(&arguments).map(value_to_text);
                }
                Ok(KernelFunction::Prompt(prompt)) => {
                    let rendered = match prompt.render(&arguments) {
                        Ok(rendered) => rendered,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };
                    let mut fragments = self.broker.generate_stream(
                        vec![LlmMessage::user(rendered)],
                        self.offered_tools(true),
                        self.settings.merged_with(&prompt.settings()),
                    );
                    while let Some(fragment) = fragments.next().await {
                        yield fragment;
                    }
                }
            }
        })
    }

    /// Register prompt plugins from a directory; returns how many were loaded.
    ///
    /// A directory holding `config.json` or `skprompt.txt` is loaded as one
    /// plugin. Otherwise every plugin subdirectory is loaded, and any that
    /// fails is logged and skipped.
    pub fn add_semantic_functions(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let path = if path.is_relative() {
            self.base_dir.join(path)
        } else {
            path.to_path_buf()
        };

        if !path.is_dir() {
            return Err(KernelError::PluginError(format!(
                "Plugin directory not found: {}",
                path.display()
            )));
        }

        if is_function_dir(&path) || path.join(CONFIG_FILE).is_file() {
            let plugin = load_plugin_dir(&path)?;
            info!(plugin = %plugin.name(), "Registered plugin");
            self.kernel.add_plugin(plugin);
            return Ok(1);
        }

        let mut count = 0;
        for dir in sorted_subdirs(&path)? {
            if !is_plugin_dir(&dir) {
                debug!(dir = %dir.display(), "Skipping non-plugin directory");
                continue;
            }
            match load_plugin_dir(&dir) {
                Ok(plugin) => {
                    info!(plugin = %plugin.name(), "Registered plugin");
                    self.kernel.add_plugin(plugin);
                    count += 1;
                }
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to load plugin"),
            }
        }

        if count == 0 {
            return Err(KernelError::PluginError(format!(
                "No plugins could be loaded from {}",
                path.display()
            )));
        }

        Ok(count)
    }

    /// Register a native function under the `custom_functions` plugin.
    ///
    /// The function is named after the tool's descriptor unless
    /// `function_name` is given.
    pub fn add_native_function(&mut self, tool: Arc<dyn LlmTool>, function_name: Option<&str>) -> Result<()> {
        let name = match function_name {
            Some(name) => name.to_string(),
            None => tool.descriptor().function.name,
        };
        self.kernel.add_function(CUSTOM_FUNCTIONS_PLUGIN, &name, tool)?;
        info!(plugin = CUSTOM_FUNCTIONS_PLUGIN, function = %name, "Registered native function");
        Ok(())
    }

    /// Register several native functions under `custom_functions`.
    pub fn add_native_functions(&mut self, tools: Vec<Arc<dyn LlmTool>>) -> Result<usize> {
        let count = tools.len();
        for tool in tools {
            self.add_native_function(tool, None)?;
        }
        Ok(count)
    }

    /// Register native functions as their own plugin.
    pub fn add_native_plugin(&mut self, name: &str, tools: Vec<Arc<dyn LlmTool>>) -> Result<()> {
        self.add_plugin(KernelPlugin::from_tools(name, "", tools)?);
        Ok(())
    }

    pub fn add_plugin(&mut self, plugin: KernelPlugin) {
        info!(plugin = %plugin.name(), functions = plugin.len(), "Registered plugin");
        self.kernel.add_plugin(plugin);
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
