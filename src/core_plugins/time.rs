use crate::error::{KernelError, Result};
use crate::kernel::KernelPlugin;
use crate::llm::tools::{parse_args, FunctionDescriptor, LlmTool, ToolDescriptor};
use chrono::{DateTime, Local, TimeZone};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

pub const TIME_PLUGIN: &str = "time";

const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Default, Deserialize, JsonSchema)]
struct FormatArgs {
    /// strftime format string, e.g. '%Y-%m-%d %H:%M:%S' or '%A, %B %d, %Y'
    #[serde(default)]
    format_string: Option<String>,
}

fn format_time<Tz: TimeZone>(time: &DateTime<Tz>, format: &str) -> Result<String>
where
    Tz::Offset: std::fmt::Display,
{
    let mut formatted = String::new();
    write!(formatted, "{}", time.format(format))
        .map_err(|_| KernelError::ToolError(format!("Invalid format string: {}", format)))?;
    Ok(formatted)
}

/// Current local date and time, with timestamp and UTC offset.
pub struct NowTool;

impl LlmTool for NowTool {
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let args: FormatArgs = parse_args(args)?;
        let now = Local::now();
        let format = args.format_string.as_deref().unwrap_or(DEFAULT_DATETIME_FORMAT);

        Ok(json!({
            "current_datetime": format_time(&now, format)?,
            "timestamp": now.timestamp(),
            "timezone": now.offset().to_string()
        }))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(FunctionDescriptor::for_args::<FormatArgs>(
            "now",
            "Get the current date and time. Useful when you need to know the current time or date.",
        ))
    }
}

/// Today's local date as text.
pub struct TodayTool;

impl LlmTool for TodayTool {
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let args: FormatArgs = parse_args(args)?;
        let format = args.format_string.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
        Ok(json!(format_time(&Local::now(), format)?))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(FunctionDescriptor::for_args::<FormatArgs>(
            "today",
            "Get today's date.",
        ))
    }
}

pub fn time_plugin() -> Result<KernelPlugin> {
    let tools: Vec<Arc<dyn LlmTool>> = vec![Arc::new(NowTool), Arc::new(TodayTool)];
    KernelPlugin::from_tools(TIME_PLUGIN, "Current date and time", tools)
}
