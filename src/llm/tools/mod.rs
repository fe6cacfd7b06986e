mod tool;
pub mod tool_wrapper;

pub use tool::{parse_args, FunctionDescriptor, LlmTool, ToolDescriptor};
pub use tool_wrapper::{qualified_name, PluginTool};
