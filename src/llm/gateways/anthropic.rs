//! Anthropic Messages API gateway.

use crate::error::{KernelError, Result};
use crate::llm::gateway::{ChunkStream, CompletionConfig, LlmGateway, StreamChunk};
use crate::llm::gateways::openai_messages_adapter::parse_arguments;
use crate::llm::gateways::sse::data_payloads;
use crate::llm::models::{LlmGatewayResponse, LlmMessage, LlmToolCall, MessageRole};
use crate::llm::tools::LlmTool;
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
    /// Block types this client does not handle, such as `thinking`.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: WireRole,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct ToolDefinitionWire {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinitionWire>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    content: Vec<ContentBlock>,
}

/// Configuration for the Anthropic gateway.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Option<std::time::Duration>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            base_url: ANTHROPIC_DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

/// Gateway for Claude models through the Anthropic Messages API.
///
/// System messages travel in the request's `system` field and tool results
/// are sent back as `tool_result` blocks inside a user turn.
pub struct AnthropicGateway {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicGateway {
    pub fn with_config(config: AnthropicConfig) -> Result<Self> {
        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        Ok(Self {
            client: client_builder.build()?,
            config,
        })
    }

    pub fn with_api_key_and_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        Self::with_config(AnthropicConfig {
            api_key: api_key.into(),
            base_url: if base_url.is_empty() {
                ANTHROPIC_DEFAULT_BASE_URL.to_string()
            } else {
                base_url
            },
            timeout: None,
        })
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    fn build_request(
        &self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Arc<dyn LlmTool>]>,
        config: &CompletionConfig,
        stream: bool,
    ) -> Result<ChatRequest> {
        let (system, messages) = adapt_messages_to_anthropic(messages)?;

        let tools = tools.filter(|t| !t.is_empty()).map(|tools| {
            tools
                .iter()
                .map(|tool| {
                    let function = tool.descriptor().function;
                    ToolDefinitionWire {
                        name: function.name,
                        description: function.description,
                        input_schema: function.parameters,
                    }
                })
                .collect()
        });

        Ok(ChatRequest {
            model: model.to_string(),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            temperature: config.temperature,
            top_p: config.top_p,
            stop_sequences: config.stop.clone(),
            tools,
            stream,
        })
    }

    async fn post(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KernelError::GatewayError(format!(
                "Anthropic API error: {} - {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

/// Split out system text and fold the conversation into Anthropic turns.
///
/// Consecutive tool results are grouped into a single user turn.
fn adapt_messages_to_anthropic(
    messages: &[LlmMessage],
) -> Result<(Option<String>, Vec<WireMessage>)> {
    let mut system_parts = Vec::new();
    let mut wire: Vec<WireMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => {
                if let Some(ref content) = msg.content {
                    system_parts.push(content.clone());
                }
            }
            MessageRole::User => wire.push(WireMessage {
                role: WireRole::User,
                content: vec![ContentBlock::Text {
                    text: msg.content.clone().unwrap_or_default(),
                }],
            }),
            MessageRole::Assistant => {
                let mut blocks = Vec::new();
                if let Some(ref content) = msg.content {
                    if !content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: content.clone(),
                        });
                    }
                }
                for call in msg.tool_calls.iter().flatten() {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone().unwrap_or_default(),
                        name: call.name.clone(),
                        input: serde_json::to_value(&call.arguments)?,
                    });
                }
                wire.push(WireMessage {
                    role: WireRole::Assistant,
                    content: blocks,
                });
            }
            MessageRole::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: msg
                        .tool_calls
                        .as_ref()
                        .and_then(|tcs| tcs.first())
                        .and_then(|tc| tc.id.clone())
                        .unwrap_or_default(),
                    content: msg.content.clone().unwrap_or_default(),
                };

                let previous_is_results = wire.last().is_some_and(|m| {
                    m.role == WireRole::User
                        && m.content
                            .iter()
                            .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
                });

                match wire.last_mut() {
                    Some(last) if previous_is_results => last.content.push(block),
                    _ => wire.push(WireMessage {
                        role: WireRole::User,
                        content: vec![block],
                    }),
                }
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    Ok((system, wire))
}

fn to_tool_call(id: String, name: String, input: Value) -> LlmToolCall {
    let arguments = match input {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    LlmToolCall {
        id: Some(id),
        name,
        arguments,
    }
}

#[async_trait]
impl LlmGateway for AnthropicGateway {
    async fn complete(
        &self,
        model: &str,
        messages: &[LlmMessage],
        tools: Option<&[Arc<dyn LlmTool>]>,
        config: &CompletionConfig,
    ) -> Result<LlmGatewayResponse> {
        info!("Delegating to Anthropic for completion");
        debug!("Model: {}, Message count: {}", model, messages.len());

        let request = self.build_request(model, messages, tools, config, false)?;
        let response: ChatResponse = self.post(&request).await?.json().await?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(to_tool_call(id, name, input))
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
            }
        }

        Ok(LlmGatewayResponse {
            content: if text.is_empty() { None } else { Some(text) },
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
            info!("Starting Anthropic streaming completion");
            debug!("Model: {}, Message count: {}", model, messages.len());

            let request = match self.build_request(model, messages, tools, config, true) {
                Ok(request) => request,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let response = match self.post(&request).await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut events = data_payloads(response.bytes_stream());
            let mut tool_uses = ToolUseAccumulators::default();

            while let Some(data_result) = events.next().await {
                let data = match data_result {
                    Ok(data) => data,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                match parse_stream_event(&data, &mut tool_uses) {
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

            let pending = tool_uses.drain();
            if !pending.is_empty() {
                yield Ok(StreamChunk::ToolCalls(pending));
            }
        })
    }
}

#[derive(Debug, Default)]
struct ToolUseAccumulator {
    id: String,
    name: String,
    partial_json: String,
}

/// Streamed `tool_use` blocks keyed by content block index.
#[derive(Debug, Default)]
struct ToolUseAccumulators {
    blocks: BTreeMap<u64, ToolUseAccumulator>,
}

impl ToolUseAccumulators {
    fn drain(&mut self) -> Vec<LlmToolCall> {
        std::mem::take(&mut self.blocks)
            .into_values()
            .map(|acc| LlmToolCall {
                id: Some(acc.id),
                name: acc.name,
                arguments: parse_arguments(&acc.partial_json),
            })
            .collect()
    }
}

fn parse_stream_event(data: &str, tool_uses: &mut ToolUseAccumulators) -> Result<Vec<StreamChunk>> {
    let mut chunks = Vec::new();

    let event: Value = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse streaming event: {}", e);
            return Ok(chunks);
        }
    };

    match event["type"].as_str() {
        Some("content_block_start") => {
            let block = &event["content_block"];
            if block["type"].as_str() == Some("tool_use") {
                let index = event["index"].as_u64().unwrap_or_default();
                tool_uses.blocks.insert(
                    index,
                    ToolUseAccumulator {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        partial_json: String::new(),
                    },
                );
            }
        }
        Some("content_block_delta") => {
            let delta = &event["delta"];
            match delta["type"].as_str() {
                Some("text_delta") => {
                    if let Some(text) = delta["text"].as_str().filter(|t| !t.is_empty()) {
                        chunks.push(StreamChunk::Content(text.to_string()));
                    }
                }
                Some("input_json_delta") => {
                    let index = event["index"].as_u64().unwrap_or_default();
                    if let (Some(acc), Some(fragment)) = (
                        tool_uses.blocks.get_mut(&index),
                        delta["partial_json"].as_str(),
                    ) {
                        acc.partial_json.push_str(fragment);
                    }
                }
                _ => {}
            }
        }
        Some("message_stop") => {
            let complete = tool_uses.drain();
            if !complete.is_empty() {
                chunks.push(StreamChunk::ToolCalls(complete));
            }
        }
        Some("error") => {
            return Err(KernelError::GatewayError(format!(
                "Anthropic stream error: {}",
                event["error"]
            )));
        }
        _ => {}
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway(url: String) -> AnthropicGateway {
        AnthropicGateway::with_api_key_and_base_url("test-key", url).unwrap()
    }

    fn call(id: &str, name: &str) -> LlmToolCall {
        LlmToolCall {
            id: Some(id.to_string()),
            name: name.to_string(),
            arguments: HashMap::from([("a".to_string(), json!(1))]),
        }
    }

    #[test]
    fn test_empty_base_url_falls_back_to_default() {
        let gateway = AnthropicGateway::with_api_key_and_base_url("k", "").unwrap();
        assert_eq!(gateway.config().base_url, ANTHROPIC_DEFAULT_BASE_URL);
    }

    #[test]
    fn test_system_messages_move_to_system_field() {
        let (system, wire) = adapt_messages_to_anthropic(&[
            LlmMessage::system("Be brief"),
            LlmMessage::user("Hi"),
        ])
        .unwrap();

        assert_eq!(system.as_deref(), Some("Be brief"));
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, WireRole::User);
    }

    #[test]
    fn test_tool_results_grouped_into_one_user_turn() {
        let first = call("toolu_1", "math-add");
        let second = call("toolu_2", "math-multiply");
        let (_, wire) = adapt_messages_to_anthropic(&[
            LlmMessage::user("Compute"),
            LlmMessage::assistant_tool_calls(None, vec![first.clone(), second.clone()]),
            LlmMessage::tool_result("2", &first),
            LlmMessage::tool_result("6", &second),
        ])
        .unwrap();

        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1].role, WireRole::Assistant);
        assert_eq!(wire[1].content.len(), 2);
        assert_eq!(wire[2].role, WireRole::User);
        assert_eq!(
            wire[2].content,
            vec![
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_1".to_string(),
                    content: "2".to_string()
                },
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_2".to_string(),
                    content: "6".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_request_defaults_max_tokens() {
        let gateway = gateway("http://localhost".to_string());
        let request = gateway
            .build_request("claude-3-5-sonnet", &[LlmMessage::user("Hi")], None, &CompletionConfig::default(), false)
            .unwrap();

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("stream").is_none());
        assert!(body.get("temperature").is_none());
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_complete_text_and_tool_use() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", "2023-06-01")
            .with_status(200)
            .with_body(
                r#"{"content":[{"type":"text","text":"Let me add."},{"type":"tool_use","id":"toolu_1","name":"math-add","input":{"a":1,"b":2}}],"stop_reason":"tool_use"}"#,
            )
            .create_async()
            .await;

        let gateway = gateway(server.url());
        let response = gateway
            .complete("claude-3-5-sonnet", &[LlmMessage::user("1+2")], None, &CompletionConfig::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content.as_deref(), Some("Let me add."));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id.as_deref(), Some("toolu_1"));
        assert_eq!(response.tool_calls[0].arguments.get("b"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_complete_skips_unknown_blocks() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body(
                r#"{"content":[{"type":"thinking","thinking":"hmm","signature":"abc"},{"type":"text","text":"Three."}],"stop_reason":"end_turn"}"#,
            )
            .create_async()
            .await;

        let gateway = gateway(server.url());
        let response = gateway
            .complete("claude-3-5-sonnet", &[LlmMessage::user("1+2")], None, &CompletionConfig::default())
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("Three."));
        assert!(response.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_complete_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(529)
            .with_body(r#"{"type":"error","error":{"type":"overloaded_error"}}"#)
            .create_async()
            .await;

        let gateway = gateway(server.url());
        let result = gateway
            .complete("claude-3-5-sonnet", &[LlmMessage::user("Hi")], None, &CompletionConfig::default())
            .await;

        match result {
            Err(KernelError::GatewayError(msg)) => assert!(msg.contains("529")),
            other => panic!("Expected GatewayError, got {:?}", other.map(|r| r.content)),
        }
    }

    #[tokio::test]
    async fn test_complete_stream_text_and_tool_use() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Adding\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"math-add\",\"input\":{}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"a\\\": 1,\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\" \\\"b\\\": 2}\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let mock = server
            .mock("POST", "/messages")
            .match_body(mockito::Matcher::PartialJsonString(r#"{"stream":true}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let gateway = gateway(server.url());
        let messages = vec![LlmMessage::user("1+2")];
        let config = CompletionConfig::default();

        let chunks: Vec<StreamChunk> = gateway
            .complete_stream("claude-3-5-sonnet", &messages, None, &config)
            .map(|c| c.unwrap())
            .collect()
            .await;

        mock.assert_async().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], StreamChunk::Content("Adding".to_string()));
        match &chunks[1] {
            StreamChunk::ToolCalls(calls) => {
                assert_eq!(calls[0].name, "math-add");
                assert_eq!(calls[0].arguments.get("a"), Some(&json!(1)));
                assert_eq!(calls[0].arguments.get("b"), Some(&json!(2)));
            }
            other => panic!("Expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_error_event() {
        let mut accumulators = ToolUseAccumulators::default();
        let result = parse_stream_event(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            &mut accumulators,
        );
        assert!(matches!(result, Err(KernelError::GatewayError(_))));
    }
}
