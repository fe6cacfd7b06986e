//! Simple chat: send a short conversation to the configured default model.
//!
//! Reads the model configuration from `CHAT_MODELS_CONFIG`, falling back to
//! `demos/chat_models.example.json`. API keys left empty in the file are
//! taken from `<PROVIDER>_API_KEY` (a `.env` file works too).
//!
//! Run with: cargo run --example simple_chat

use promptkernel::prelude::*;

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
    let service = KernelService::builder().config_path(config_path).build()?;

    println!("Using {} / {}\n", service.provider(), service.model());

    let messages = vec![
        LlmMessage::user("What is the capital of France?"),
        LlmMessage::assistant("The capital of France is Paris."),
        LlmMessage::user("And roughly how many people live there?"),
    ];

    let options = InvokeOptions::new().with_system_prompt("You are a concise geography tutor.");
    let answer = service.invoke_prompt(&messages, options).await?;

    println!("{}", answer);
    Ok(())
}
