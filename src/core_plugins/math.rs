use crate::error::{KernelError, Result};
use crate::kernel::KernelPlugin;
use crate::llm::tools::{parse_args, FunctionDescriptor, LlmTool, ToolDescriptor};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const MATH_PLUGIN: &str = "math";

#[derive(Debug, Deserialize, JsonSchema)]
struct Operands {
    /// First operand
    a: f64,
    /// Second operand
    b: f64,
}

/// Arithmetic on two numbers.
pub struct BinaryOpTool {
    name: &'static str,
    description: &'static str,
    op: fn(f64, f64) -> Result<f64>,
}

impl BinaryOpTool {
    pub fn add() -> Self {
        Self {
            name: "add",
            description: "Add two numbers (a + b).",
            op: |a, b| Ok(a + b),
        }
    }

    pub fn subtract() -> Self {
        Self {
            name: "subtract",
            description: "Subtract b from a (a - b).",
            op: |a, b| Ok(a - b),
        }
    }

    pub fn multiply() -> Self {
        Self {
            name: "multiply",
            description: "Multiply two numbers (a * b).",
            op: |a, b| Ok(a * b),
        }
    }

    pub fn divide() -> Self {
        Self {
            name: "divide",
            description: "Divide a by b (a / b).",
            op: |a, b| {
                if b == 0.0 {
                    Err(KernelError::ToolError("Division by zero".to_string()))
                } else {
                    Ok(a / b)
                }
            },
        }
    }
}

impl LlmTool for BinaryOpTool {
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let Operands { a, b } = parse_args(args)?;
        Ok(json!((self.op)(a, b)?))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(FunctionDescriptor::for_args::<Operands>(
            self.name,
            self.description,
        ))
    }
}

pub fn math_plugin() -> Result<KernelPlugin> {
    let tools: Vec<Arc<dyn LlmTool>> = vec![
        Arc::new(BinaryOpTool::add()),
        Arc::new(BinaryOpTool::subtract()),
        Arc::new(BinaryOpTool::multiply()),
        Arc::new(BinaryOpTool::divide()),
    ];
    KernelPlugin::from_tools(MATH_PLUGIN, "Basic arithmetic", tools)
}
