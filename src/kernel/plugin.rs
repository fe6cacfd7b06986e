use crate::error::{KernelError, Result};
use crate::kernel::prompt_config::PromptConfig;
use crate::kernel::template::PromptTemplate;
use crate::llm::{CompletionConfig, LlmTool};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Named arguments passed to a plugin function.
pub type KernelArguments = HashMap<String, Value>;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_]+$").expect("name pattern compiles"));

/// Plugin and function names: ASCII letters, digits and underscores.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(KernelError::PluginError(format!(
            "Invalid {} name '{}': only letters, digits and underscores are allowed",
            kind, name
        )))
    }
}

/// A function defined by a prompt template.
#[derive(Debug, Clone)]
pub struct PromptFunction {
    name: String,
    template: PromptTemplate,
    config: PromptConfig,
}

impl PromptFunction {
    pub fn new(name: impl Into<String>, template: &str, config: PromptConfig) -> Result<Self> {
        let name = name.into();
        validate_name("function", &name)?;
        Ok(Self {
            name,
            template: PromptTemplate::parse(template)?,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn settings(&self) -> CompletionConfig {
        self.config.settings()
    }

    pub fn render(&self, arguments: &KernelArguments) -> Result<String> {
        self.template.render(arguments, &self.config.input_variables)
    }
}

#[derive(Clone)]
pub enum KernelFunction {
    Prompt(PromptFunction),
    Native(Arc<dyn LlmTool>),
}

impl KernelFunction {
    pub fn description(&self) -> String {
        match self {
            KernelFunction::Prompt(f) => f.description().to_string(),
            KernelFunction::Native(tool) => tool.descriptor().function.description,
        }
    }
}

impl fmt::Debug for KernelFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelFunction::Prompt(prompt) => f.debug_tuple("Prompt").field(&prompt.name).finish(),
            KernelFunction::Native(tool) => f
                .debug_tuple("Native")
                .field(&tool.descriptor().function.name)
                .finish(),
        }
    }
}

/// A named group of functions.
#[derive(Debug, Clone)]
pub struct KernelPlugin {
    name: String,
    description: String,
    functions: BTreeMap<String, KernelFunction>,
}

impl KernelPlugin {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("plugin", &name)?;
        Ok(Self {
            name,
            description: description.into(),
            functions: BTreeMap::new(),
        })
    }

    /// A plugin made of native functions, each registered under its
    /// descriptor name.
    pub fn from_tools(
        name: impl Into<String>,
        description: impl Into<String>,
        tools: Vec<Arc<dyn LlmTool>>,
    ) -> Result<Self> {
        let mut plugin = Self::new(name, description)?;
        for tool in tools {
            let function_name = tool.descriptor().function.name;
            plugin.add_function(function_name, KernelFunction::Native(tool))?;
        }
        Ok(plugin)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Add or replace a function.
    pub fn add_function(&mut self, name: impl Into<String>, function: KernelFunction) -> Result<()> {
        let name = name.into();
        validate_name("function", &name)?;
        self.functions.insert(name, function);
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&KernelFunction> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, &KernelFunction)> {
        self.functions.iter().map(|(name, f)| (name.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
