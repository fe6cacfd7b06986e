use crate::error::Result;
use crate::llm::tools::{FunctionDescriptor, LlmTool, ToolDescriptor};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Separator between plugin and function names in tool names offered to the model.
pub const TOOL_NAME_SEPARATOR: &str = "-";

/// Build the tool name a model sees for a plugin function.
pub fn qualified_name(plugin: &str, function: &str) -> String {
    format!("{}{}{}", plugin, TOOL_NAME_SEPARATOR, function)
}

/// Wraps a registered native function so the model sees it under its
/// plugin-qualified name (`plugin-function`).
pub struct PluginTool {
    plugin: String,
    function: String,
    inner: Arc<dyn LlmTool>,
}

impl PluginTool {
    pub fn new(
        plugin: impl Into<String>,
        function: impl Into<String>,
        inner: Arc<dyn LlmTool>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            function: function.into(),
            inner,
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

impl LlmTool for PluginTool {
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        self.inner.run(args)
    }

    fn descriptor(&self) -> ToolDescriptor {
        let inner = self.inner.descriptor();
        ToolDescriptor {
            r#type: inner.r#type,
            function: FunctionDescriptor {
                name: qualified_name(&self.plugin, &self.function),
                description: inner.function.description,
                parameters: inner.function.parameters,
            },
        }
    }

    fn matches(&self, name: &str) -> bool {
        name.split_once(TOOL_NAME_SEPARATOR)
            .is_some_and(|(plugin, function)| plugin == self.plugin && function == self.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    impl LlmTool for EchoTool {
        fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
            Ok(args.get("text").cloned().unwrap_or(Value::Null))
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::function(FunctionDescriptor {
                name: "echo".to_string(),
                description: "Echo the text back".to_string(),
                parameters: json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            })
        }
    }

    #[test]
    fn test_descriptor_uses_qualified_name() {
        let tool = PluginTool::new("custom_functions", "echo_text", Arc::new(EchoTool));
        let descriptor = tool.descriptor();

        assert_eq!(descriptor.function.name, "custom_functions-echo_text");
        assert_eq!(descriptor.function.description, "Echo the text back");
        assert_eq!(descriptor.function.parameters["properties"]["text"]["type"], "string");
    }

    #[test]
    fn test_matches_qualified_name_only() {
        let tool = PluginTool::new("math", "add", Arc::new(EchoTool));

        assert!(tool.matches("math-add"));
        assert!(!tool.matches("add"));
        assert!(!tool.matches("echo"));
        assert!(!tool.matches("math-multiply"));
    }

    #[test]
    fn test_run_delegates() {
        let tool = PluginTool::new("util", "echo", Arc::new(EchoTool));
        let args = HashMap::from([("text".to_string(), json!("hi"))]);
        assert_eq!(tool.run(&args).unwrap(), json!("hi"));
    }
}
