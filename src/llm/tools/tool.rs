use crate::error::{KernelError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// Descriptor for tool function parameters
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    pub r#type: String,
    pub function: FunctionDescriptor,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn function(function: FunctionDescriptor) -> Self {
        Self {
            r#type: "function".to_string(),
            function,
        }
    }
}

impl FunctionDescriptor {
    /// Describe a function whose arguments deserialize into `T`.
    ///
    /// The parameter schema is generated from `T`'s `JsonSchema` derive.
    pub fn for_args<T: schemars::JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut parameters = serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));

        if let Some(object) = parameters.as_object_mut() {
            object.remove("$schema");
            object.remove("title");
        }

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Deserialize tool-call arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(args: &HashMap<String, Value>) -> Result<T> {
    let object: serde_json::Map<String, Value> =
        args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    serde_json::from_value(Value::Object(object))
        .map_err(|e| KernelError::ToolError(format!("Invalid arguments: {}", e)))
}

/// Trait for native functions callable by the model or by name.
pub trait LlmTool: Send + Sync {
    /// Execute the tool with given arguments
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value>;

    /// Get tool descriptor for LLM
    fn descriptor(&self) -> ToolDescriptor;

    /// Check if this tool matches the given name
    fn matches(&self, name: &str) -> bool {
        self.descriptor().function.name == name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_tool_descriptor_serialization() {
        let descriptor = ToolDescriptor::function(FunctionDescriptor {
            name: "test_tool".to_string(),
            description: "A test tool".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "arg1": {"type": "string"}
                }
            }),
        });

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "test_tool");
        assert_eq!(json["function"]["description"], "A test tool");
    }

    #[derive(Debug, Deserialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct LookupArgs {
        /// Path of the file to read
        file_path: String,
        line: Option<u32>,
    }

    #[test]
    fn test_for_args_builds_object_schema() {
        let descriptor = FunctionDescriptor::for_args::<LookupArgs>("lookup", "Look something up");

        assert_eq!(descriptor.name, "lookup");
        assert_eq!(descriptor.parameters["type"], "object");
        assert!(descriptor.parameters["properties"]["file_path"].is_object());
        assert_eq!(descriptor.parameters["required"], json!(["file_path"]));
        assert!(descriptor.parameters.get("$schema").is_none());
        assert!(descriptor.parameters.get("title").is_none());
    }

    #[test]
    fn test_parse_args() {
        let args = HashMap::from([
            ("file_path".to_string(), json!("src/lib.rs")),
            ("line".to_string(), json!(12)),
        ]);

        let parsed: LookupArgs = parse_args(&args).unwrap();
        assert_eq!(parsed.file_path, "src/lib.rs");
        assert_eq!(parsed.line, Some(12));
    }

    #[test]
    fn test_parse_args_missing_field() {
        let args = HashMap::new();
        let err = parse_args::<LookupArgs>(&args).unwrap_err();
        assert!(matches!(err, KernelError::ToolError(_)));
    }

    struct MockTool;

    impl LlmTool for MockTool {
        fn run(&self, _args: &HashMap<String, Value>) -> Result<Value> {
            Ok(json!("result"))
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::function(FunctionDescriptor {
                name: "mock_tool".to_string(),
                description: "A mock tool".to_string(),
                parameters: json!({}),
            })
        }
    }

    #[test]
    fn test_tool_matches() {
        let tool = MockTool;
        assert!(tool.matches("mock_tool"));
        assert!(!tool.matches("other_tool"));
    }
}
