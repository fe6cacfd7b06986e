use crate::error::Result;
use crate::llm::gateway::{CompletionConfig, LlmGateway, StreamChunk};
use crate::llm::models::{LlmMessage, LlmToolCall};
use crate::llm::tools::LlmTool;
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of tool-call rounds before the model must answer in text.
pub const DEFAULT_MAX_AUTO_INVOKE_ATTEMPTS: usize = 5;

pub type TextStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Main interface for LLM interactions
///
/// Binds a gateway to one model and drives automatic function calling: when
/// the model asks for tools, the broker runs them, feeds the results back and
/// asks again, up to `max_auto_invoke_attempts` rounds.
pub struct LlmBroker {
    model: String,
    gateway: Arc<dyn LlmGateway>,
    max_auto_invoke_attempts: usize,
}

impl LlmBroker {
    /// Create a new LLM broker
    pub fn new(model: impl Into<String>, gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            model: model.into(),
            gateway,
            max_auto_invoke_attempts: DEFAULT_MAX_AUTO_INVOKE_ATTEMPTS,
        }
    }

    pub fn with_max_auto_invoke_attempts(mut self, attempts: usize) -> Self {
        self.max_auto_invoke_attempts = attempts;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate text response from LLM
    pub async fn generate(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[Arc<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> Result<String> {
        self.generate_round(messages.to_vec(), tools, config, 0, String::new())
            .await
    }

    fn generate_round<'a>(
        &'a self,
        mut messages: Vec<LlmMessage>,
        tools: Option<&'a [Arc<dyn LlmTool>]>,
        config: &'a CompletionConfig,
        round: usize,
        mut transcript: String,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let offered = self.tools_for_round(tools, round);
            let response = self.gateway.complete(&self.model, &messages, offered, config).await?;

            // Text from every round is part of the answer.
            if let Some(content) = &response.content {
                transcript.push_str(content);
            }

            if response.tool_calls.is_empty() {
                return Ok(transcript);
            }

            let Some(tools) = offered else {
                warn!("LLM requested tool calls but no tools provided");
                return Ok(transcript);
            };

            info!("Tool calls requested: {}", response.tool_calls.len());

            messages.push(LlmMessage::assistant_tool_calls(
                response.content,
                response.tool_calls.clone(),
            ));
            for tool_call in &response.tool_calls {
                messages.push(run_tool_call(tools, tool_call)?);
            }

            self.generate_round(messages, Some(tools), config, round + 1, transcript)
                .await
        })
    }

    /// Generate streaming text response from LLM
    ///
    /// Returns a stream that yields content chunks as they arrive. When tool calls
    /// are detected, the broker executes them and streams the LLM's follow-up
    /// response into the same stream.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::stream::StreamExt;
    ///
    /// let broker = LlmBroker::new("gpt-4o", gateway);
    /// let messages = vec![LlmMessage::user("Tell me a story")];
    ///
    /// let mut stream = broker.generate_stream(messages, None, CompletionConfig::default());
    /// while let Some(result) = stream.next().await {
    ///     match result {
    ///         Ok(chunk) => print!("{}", chunk),
    ///         Err(e) => eprintln!("Error: {}", e),
    ///     }
    /// }
    /// ```
    pub fn generate_stream(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Arc<dyn LlmTool>>>,
        config: CompletionConfig,
    ) -> TextStream<'_> {
        self.stream_round(messages, tools, config, 0)
    }

    fn stream_round(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<Arc<dyn LlmTool>>>,
        config: CompletionConfig,
        round: usize,
    ) -> TextStream<'_> {
        Box::pin(async_stream::stream! {
            let mut accumulated_content = String::new();
            let mut accumulated_tool_calls = Vec::new();

            {
                let offered = self.tools_for_round(tools.as_deref(), round);
                let mut stream = self.gateway.complete_stream(&self.model, &messages, offered, &config);

                while let Some(chunk_result) = stream.next().await {
                    match chunk_result {
                        Ok(StreamChunk::Content(content)) => {
                            accumulated_content.push_str(&content);
                            yield Ok(content);
                        }
                        Ok(StreamChunk::ToolCalls(tool_calls)) => {
                            accumulated_tool_calls.extend(tool_calls);
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if accumulated_tool_calls.is_empty() {
                return;
            }

            let Some(tool_set) = tools.as_deref().filter(|_| round < self.max_auto_invoke_attempts) else {
                warn!("LLM requested tool calls but no tools provided");
                return;
            };

            info!("Processing {} tool call(s) in stream", accumulated_tool_calls.len());

            let mut new_messages = messages.clone();
            new_messages.push(LlmMessage::assistant_tool_calls(
                Some(accumulated_content),
                accumulated_tool_calls.clone(),
            ));

            for tool_call in &accumulated_tool_calls {
                match run_tool_call(tool_set, tool_call) {
                    Ok(message) => new_messages.push(message),
                    Err(e) => {
                        warn!("Tool execution failed: {}", e);
                        yield Err(e);
                        return;
                    }
                }
            }

            let mut follow_up = self.stream_round(new_messages, tools.clone(), config.clone(), round + 1);
            while let Some(result) = follow_up.next().await {
                yield result;
            }
        })
    }

    /// Tools stay on offer until the attempt limit, then the model must answer in text.
    fn tools_for_round<'t>(
        &self,
        tools: Option<&'t [Arc<dyn LlmTool>]>,
        round: usize,
    ) -> Option<&'t [Arc<dyn LlmTool>]> {
        if round < self.max_auto_invoke_attempts {
            tools
        } else {
            debug!(round, "Auto invoke attempts exhausted, requesting text answer");
            None
        }
    }
}

/// Execute one requested tool call and build the tool message carrying its result.
fn run_tool_call(tools: &[Arc<dyn LlmTool>], tool_call: &LlmToolCall) -> Result<LlmMessage> {
    match tools.iter().find(|t| t.matches(&tool_call.name)) {
        Some(tool) => {
            info!("Executing tool: {}", tool_call.name);
            let output = tool.run(&tool_call.arguments)?;
            Ok(LlmMessage::tool_result(serde_json::to_string(&output)?, tool_call))
        }
        None => {
            warn!("Tool not found: {}", tool_call.name);
            let error = serde_json::json!({
                "error": format!("Function {} is not available", tool_call.name)
            });
            Ok(LlmMessage::tool_result(error.to_string(), tool_call))
        }
    }
}
