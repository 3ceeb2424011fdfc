//! LLM provider abstraction.

use async_trait::async_trait;
use proto::{LlmError, Role, ToolCall, ToolDefinition, ToolResult};

/// Represents a message in a chat history
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Semantic role of this message.
    pub role: Role,
    /// Human-readable text content.
    pub content: String,
    /// Tool call id when this is a tool result.
    pub tool_call_id: Option<String>,
    /// Tool name when this is a tool result.
    pub tool_name: Option<String>,
    /// Whether a tool result describes a failure.
    pub is_error: bool,
    /// Tool calls requested by assistant messages.
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            is_error: false,
            tool_calls: None,
        }
    }

    /// Creates a system-role message with the given content.
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Creates a user-role message with the given content.
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Creates an assistant-role message with the given content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Creates an assistant message that requested tool calls.
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::plain(Role::Assistant, content);
        if !tool_calls.is_empty() {
            msg.tool_calls = Some(tool_calls);
        }
        msg
    }

    /// Creates a tool-result message from a tool outcome.
    pub fn tool_result(result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: result.output.clone(),
            tool_call_id: Some(result.call_id.clone()),
            tool_name: Some(result.tool_name.clone()),
            is_error: result.is_error,
            tool_calls: None,
        }
    }
}

/// Request to the LLM
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Full chat history including system/user/assistant/tool messages.
    pub messages: Vec<ChatMessage>,
    /// Available tools schema.
    pub tools: Vec<ToolDefinition>,
    /// Target model id.
    pub model: String,
}

/// Token usage reported by the LLM for a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Number of tokens in the prompt / input.
    pub prompt_tokens: u32,
    /// Number of tokens in the generated output.
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Accumulates another usage record into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
    }
}

/// One assistant reply: optional text plus zero or more tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    /// Concatenated text blocks.
    pub text: String,
    /// Requested tool invocations, in emission order.
    pub tool_calls: Vec<ToolCall>,
    /// Usage for this call.
    pub usage: TokenUsage,
}

impl ChatResponse {
    /// Text-only reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Reply requesting tool calls.
    pub fn with_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            usage: TokenUsage::default(),
        }
    }
}

/// LLM provider trait
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends a chat request to the provider.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_message_keeps_correlation_and_error_flag() {
        let result = ToolResult::error("c9", "file.write", "blocked");
        let msg = ChatMessage::tool_result(&result);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("c9"));
        assert_eq!(msg.tool_name.as_deref(), Some("file.write"));
        assert!(msg.is_error);
    }

    #[test]
    fn assistant_without_calls_has_no_tool_calls_field() {
        let msg = ChatMessage::assistant_with_calls("done", Vec::new());
        assert!(msg.tool_calls.is_none());
        let msg = ChatMessage::assistant_with_calls(
            "",
            vec![ToolCall::new("browser.close", serde_json::json!({}))],
        );
        assert_eq!(msg.tool_calls.map(|c| c.len()), Some(1));
    }

    #[test]
    fn token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(&TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 3,
        });
        total.add(&TokenUsage {
            prompt_tokens: 5,
            completion_tokens: 2,
        });
        assert_eq!(total.prompt_tokens, 15);
        assert_eq!(total.completion_tokens, 5);
    }
}
