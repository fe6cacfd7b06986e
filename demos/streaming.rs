//! Streaming with automatic function calling.
//!
//! Registers the built-in `time` and `math` plugins, then streams an answer
//! that needs both. Function calls run transparently inside the stream.
//!
//! Run with: cargo run --example streaming

use futures::stream::StreamExt;
use promptkernel::prelude::*;
use std::io::Write;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder().with_max_level(Level::WARN).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = std::env::var("CHAT_MODELS_CONFIG")
        .unwrap_or_else(|_| "demos/chat_models.example.json".to_string());
    let service = KernelService::builder()
        .config_path(config_path)
        .with_core_plugins()
        .build()?;

    let messages = vec![LlmMessage::user(
        "What is today's date? Then multiply the current year by 12 and tell me the result.",
    )];

    let mut stream = service.invoke_prompt_stream(&messages, InvokeOptions::default());
    while let Some(result) = stream.next().await {
        match result {
            Ok(fragment) => {
                print!("{}", fragment);
                std::io::stdout().flush()?;
            }
            Err(e) => eprintln!("\nError: {}", e),
        }
    }

    println!("\n\nDone!");
    Ok(())
}
