//! Prompt plugins loaded from directories, plus a custom native function.
//!
//! Run with: cargo run --example plugins

use promptkernel::prelude::*;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Deserialize, JsonSchema)]
struct WordCountArgs {
    /// Text whose words are counted
    text: String,
}

struct WordCountTool;

impl LlmTool for WordCountTool {
    fn run(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let args: WordCountArgs = parse_args(args)?;
        Ok(json!(args.text.split_whitespace().count()))
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(FunctionDescriptor::for_args::<WordCountArgs>(
            "word_count",
            "Count the words in a text.",
        ))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("CHAT_MODELS_CONFIG")
        .unwrap_or_else(|_| "demos/chat_models.example.json".to_string());
    let mut service = KernelService::builder().config_path(config_path).build()?;

    let loaded = service.add_semantic_functions("demos/plugins")?;
    println!("Loaded {} plugin(s)", loaded);
    for plugin in service.kernel().plugins() {
        for (name, function) in plugin.functions() {
            println!("  {}.{}: {}", plugin.name(), name, function.description());
        }
    }

    service.add_native_function(Arc::new(WordCountTool), None)?;

    let poem = service
        .invoke_plugin_function(
            "WriterPlugin",
            "ShortPoem",
            KernelArguments::from([("input".to_string(), json!("a lighthouse in winter"))]),
        )
        .await?;
    println!("\n--- Poem ---\n{}", poem);

    let count = service
        .invoke_plugin_function(
            CUSTOM_FUNCTIONS_PLUGIN,
            "word_count",
            KernelArguments::from([("text".to_string(), json!(poem))]),
        )
        .await?;
    println!("\nThe poem has {} words.", count);

    let summary = service
        .invoke_plugin_function(
            "Summarize",
            "Summarize",
            KernelArguments::from([
                ("input".to_string(), json!(poem)),
                ("sentences".to_string(), json!(1)),
            ]),
        )
        .await?;
    println!("\n--- Summary ---\n{}", summary);

    Ok(())
}
