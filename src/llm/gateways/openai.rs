//! OpenAI-compatible gateway for chat completions.
//!
//! Covers OpenAI itself, the vendors that speak the same protocol (DeepSeek,
//! SiliconFlow, Qwen) and Azure OpenAI deployments, which differ only in URL
//! layout and auth header.

use crate::error::{KernelError, Result};
use crate::llm::gateway::{ChunkStream, CompletionConfig, LlmGateway, StreamChunk};
use crate::llm::gateways::openai_messages_adapter::{
    adapt_messages_to_openai, adapt_tools_to_openai, convert_tool_calls, parse_arguments,
};
use crate::llm::gateways::sse::data_payloads;
use crate::llm::models::{LlmGatewayResponse, LlmMessage, LlmToolCall};
use crate::llm::tools::LlmTool;
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const AZURE_DEFAULT_API_VERSION: &str = "2024-06-01";

/// URL layout and authentication scheme of the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `{base_url}/chat/completions` with bearer auth.
    OpenAI,
    /// `{base_url}/openai/deployments/{model}/chat/completions` with an `api-key` header.
    Azure { api_version: String },
}

/// Configuration for connecting to an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Option<std::time::Duration>,
    pub flavor: ApiFlavor,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: std::env::var("OPENAI_API_ENDPOINT")
                .unwrap_or_else(|_| OPENAI_DEFAULT_BASE_URL.to_string()),
            timeout: None,
            flavor: ApiFlavor::OpenAI,
        }
    }
}

/// Gateway for OpenAI-compatible chat completion services.
pub struct OpenAIGateway {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIGateway {
    /// Create a new OpenAI gateway with custom configuration.
    pub fn with_config(config: OpenAIConfig) -> Result<Self> {
        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder.build()?;

        Ok(Self { client, config })
    }

    /// Create gateway with custom API key and base URL.
    pub fn with_api_key_and_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Self::with_config(OpenAIConfig {
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout: None,
            flavor: ApiFlavor::OpenAI,
        })
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn completions_url(&self, model: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match &self.config.flavor {
            ApiFlavor::OpenAI => format!("{}/chat/completions", base),
            ApiFlavor::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, model, api_version
            ),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.flavor {
            ApiFlavor::OpenAI => {
                request.header("Authorization", format!("Bearer {}", self.config.api_key))
            }
            ApiFlavor::Azure { .. } => request.header("api-key", &self.config.api_key),
        }
    }

    fn build_body(
        &self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Arc<dyn LlmTool>]>,
        config: &CompletionConfig,
        stream: bool,
    ) -> Result<Value> {
        let mut body = json!({
            "model": model,
            "messages": adapt_messages_to_openai(messages)?,
        });

        if stream {
            body["stream"] = json!(true);
        }
        if let Some(temperature) = config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(top_p) = config.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(presence_penalty) = config.presence_penalty {
            body["presence_penalty"] = json!(presence_penalty);
        }
        if let Some(frequency_penalty) = config.frequency_penalty {
            body["frequency_penalty"] = json!(frequency_penalty);
        }
        if let Some(ref stop) = config.stop {
            body["stop"] = json!(stop);
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = adapt_tools_to_openai(tools)?;
            body["tool_choice"] = json!("auto");
        }

        Ok(body)
    }

    async fn post(&self, model: &str, body: &Value) -> Result<reqwest::Response> {
        let request = self
            .client
            .post(self.completions_url(model))
            .header("Content-Type", "application/json")
            .json(body);

        let response = self.authorize(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KernelError::GatewayError(format!(
                "OpenAI API error: {} - {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmGateway for OpenAIGateway {
    async fn complete(
        &self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Arc<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse> {
        info!("Delegating to OpenAI for completion");
        debug!("Model: {}, Message count: {}", model, messages.len());

        let body = self.build_body(model, messages, tools, config, false)?;
        let response_body: Value = self.post(model, &body).await?.json().await?;

        let message = &response_body["choices"][0]["message"];
        let content = message["content"].as_str().map(String::from);

        let tool_calls = if let Some(calls) = message["tool_calls"].as_array() {
            convert_tool_calls(calls)
        } else {
            vec![]
        };

        Ok(LlmGatewayResponse {
            content,
            tool_calls,
        })
    }

    fn complete_stream<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [LlmMessage],
        tools: Option<&'a [Arc<dyn LlmTool>]>,
        config: &'a CompletionConfig,
    ) -> ChunkStream<'a> {
        Box::pin(async_stream::stream! {
            info!("Starting OpenAI streaming completion");
            debug!("Model: {}, Message count: {}", model, messages.len());

            let body = match self.build_body(model, messages, tools, config, true) {
                Ok(body) => body,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let response = match self.post(model, &body).await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut events = data_payloads(response.bytes_stream());
            let mut tool_calls = ToolCallAccumulators::default();

            while let Some(data_result) = events.next().await {
                let data = match data_result {
                    Ok(data) => data,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                match parse_stream_event(&data, &mut tool_calls) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            // Servers that end the stream without a finish reason still owe us their tool calls
            let pending = tool_calls.drain();
            if !pending.is_empty() {
                yield Ok(StreamChunk::ToolCalls(pending));
            }
        })
    }
}

/// Accumulator for one streaming tool call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Tool-call fragments keyed by their stream index.
#[derive(Debug, Default)]
struct ToolCallAccumulators {
    calls: BTreeMap<usize, ToolCallAccumulator>,
}

impl ToolCallAccumulators {
    fn absorb(&mut self, deltas: &[Value]) {
        for tc in deltas {
            let Some(index) = tc["index"].as_u64() else {
                continue;
            };
            let acc = self.calls.entry(index as usize).or_default();

            // First chunk has id and function name
            if let Some(id) = tc["id"].as_str() {
                acc.id = Some(id.to_string());
            }
            if let Some(name) = tc["function"]["name"].as_str() {
                acc.name = Some(name.to_string());
            }

            // All chunks may have argument fragments
            if let Some(args) = tc["function"]["arguments"].as_str() {
                acc.arguments.push_str(args);
            }
        }
    }

    /// Build complete tool calls in index order and reset.
    fn drain(&mut self) -> Vec<LlmToolCall> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter_map(|acc| {
                Some(LlmToolCall {
                    id: acc.id,
                    name: acc.name?,
                    arguments: parse_arguments(&acc.arguments),
                })
            })
            .collect()
    }
}

/// Turn one SSE payload into stream chunks.
fn parse_stream_event(data: &str, tool_calls: &mut ToolCallAccumulators) -> Result<Vec<StreamChunk>> {
    let mut chunks = Vec::new();

    if data == "[DONE]" {
        let complete = tool_calls.drain();
        if !complete.is_empty() {
            chunks.push(StreamChunk::ToolCalls(complete));
        }
        return Ok(chunks);
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to parse streaming chunk: {}", e);
            return Ok(chunks);
        }
    };

    if let Some(error) = json.get("error") {
        return Err(KernelError::GatewayError(format!("OpenAI stream error: {}", error)));
    }

    let Some(choice) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(chunks);
    };

    let delta = &choice["delta"];
    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            chunks.push(StreamChunk::Content(content.to_string()));
        }
    }

    if let Some(deltas) = delta["tool_calls"].as_array() {
        tool_calls.absorb(deltas);
    }

    if choice["finish_reason"].as_str() == Some("tool_calls") {
        let complete = tool_calls.drain();
        if !complete.is_empty() {
            chunks.push(StreamChunk::ToolCalls(complete));
        }
    }

    Ok(chunks)
}
