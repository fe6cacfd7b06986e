use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role in LLM conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool call from LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: HashMap<String, serde_json::Value>,
}

/// Message in LLM conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    #[serde(default = "default_role")]
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<LlmToolCall>>,
}

fn default_role() -> MessageRole {
    MessageRole::User
}

/// Response from LLM gateway
#[derive(Debug, Clone, Default)]
pub struct LlmGatewayResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<LlmToolCall>,
}

impl LlmMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Assistant turn that requested the given tool calls
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<LlmToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.filter(|c| !c.is_empty()),
            tool_calls: Some(tool_calls),
        }
    }

    /// Result of a single tool call, linked back to the call it answers
    pub fn tool_result(content: impl Into<String>, tool_call: &LlmToolCall) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: Some(vec![tool_call.clone()]),
        }
    }
}

/// Build the message list forwarded for a chat turn.
///
/// The system prompt, when present, comes first. Only user and assistant
/// messages from the conversation are kept, in caller order.
pub fn build_history(system_prompt: Option<&str>, conversation: &[LlmMessage]) -> Vec<LlmMessage> {
    let mut history = Vec::with_capacity(conversation.len() + 1);

    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        history.push(LlmMessage::system(prompt));
    }

    for message in conversation {
        match message.role {
            MessageRole::User | MessageRole::Assistant => history.push(LlmMessage {
                role: message.role,
                content: message.content.clone(),
                tool_calls: None,
            }),
            other => {
                tracing::debug!(role = ?other, "Dropping conversation message with unsupported role");
            }
        }
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(serde_json::to_string(&MessageRole::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&MessageRole::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&MessageRole::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn test_user_message() {
        let msg = LlmMessage::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, Some("Hello".to_string()));
        assert!(msg.tool_calls.is_none());
    }

    #[test]
    fn test_assistant_tool_calls_drops_empty_content() {
        let call = LlmToolCall {
            id: Some("call_1".to_string()),
            name: "math-add".to_string(),
            arguments: HashMap::new(),
        };
        let msg = LlmMessage::assistant_tool_calls(Some(String::new()), vec![call]);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_tool_result_links_call() {
        let call = LlmToolCall {
            id: Some("call_9".to_string()),
            name: "time-now".to_string(),
            arguments: HashMap::new(),
        };
        let msg = LlmMessage::tool_result("42", &call);
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_calls.unwrap()[0].id, Some("call_9".to_string()));
    }

    #[test]
    fn test_llm_message_deserialization() {
        let json = r#"{"role":"assistant","content":"response"}"#;
        let msg: LlmMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.content, Some("response".to_string()));
    }

    #[test]
    fn test_llm_message_default_role() {
        let json = r#"{"content":"test"}"#;
        let msg: LlmMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, MessageRole::User);
    }

    #[test]
    fn test_build_history_prepends_system_prompt() {
        let conversation = vec![
            LlmMessage::user("I want to learn Rust"),
            LlmMessage::assistant("Where would you like to start?"),
            LlmMessage::user("Ownership"),
        ];

        let history = build_history(Some("You are a tutor"), &conversation);

        assert_eq!(history.len(), 4);
        assert_eq!(history[0], LlmMessage::system("You are a tutor"));
        assert_eq!(&history[1..], &conversation[..]);
    }

    #[test]
    fn test_build_history_drops_other_roles() {
        let conversation = vec![
            LlmMessage::system("ignored"),
            LlmMessage::user("hi"),
            LlmMessage {
                role: MessageRole::Tool,
                content: Some("{}".to_string()),
                tool_calls: None,
            },
        ];

        let history = build_history(None, &conversation);

        assert_eq!(history, vec![LlmMessage::user("hi")]);
    }

    #[test]
    fn test_build_history_ignores_empty_system_prompt() {
        let history = build_history(Some(""), &[LlmMessage::user("hi")]);
        assert_eq!(history.len(), 1);
    }
}
