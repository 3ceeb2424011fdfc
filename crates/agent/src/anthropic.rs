//! Anthropic Messages API provider implementation.

use async_trait::async_trait;
use proto::{LlmError, Role, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::llm::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, TokenUsage};

const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MAX_TOKENS: u32 = 8192;
/// Tool names on the wire must match `[a-zA-Z0-9_-]{1,64}`.
const WIRE_NAME_SEPARATOR: &str = "__";

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Block kinds this client does not use (e.g. thinking).
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

// ── Response types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// ── Provider ───────────────────────────────────────────────────────────────────

/// Anthropic Messages API LLM provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Creates a provider targeting the default Anthropic API endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a provider targeting a custom base URL (useful for proxies/tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, LlmError> {
        // Extract system messages into top-level system field (Anthropic requirement).
        let system_parts: Vec<String> = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .collect();
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n"))
        };

        let anthropic_req = AnthropicRequest {
            model: req.model.clone(),
            max_tokens: MAX_TOKENS,
            system,
            messages: convert_messages(&req.messages),
            tools: req.tools.iter().map(convert_tool).collect(),
        };

        let url = format!("{}/v1/messages", self.base_url);
        debug!(
            model = %req.model,
            messages = %anthropic_req.messages.len(),
            tools = %anthropic_req.tools.len(),
            "Sending request to Anthropic"
        );

        let mut req_builder = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("content-type", "application/json");

        if proto::is_anthropic_oauth_token(&self.api_key) {
            req_builder = req_builder.bearer_auth(&self.api_key);
        } else {
            req_builder = req_builder.header("x-api-key", &self.api_key);
        }

        let response = req_builder
            .json(&anthropic_req)
            .send()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let status = response.status();
        debug!(status = %status.as_u16(), "Anthropic response received");
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimit);
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if !status.is_success() {
            let preview: String = body.chars().take(500).collect();
            return Err(LlmError::Api(format!("HTTP {status}: {preview}")));
        }

        let anthropic_resp: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::InvalidResponse(format!(
                "Deserialization error: {e}; body: {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;

        Ok(into_chat_response(anthropic_resp))
    }
}

fn into_chat_response(resp: AnthropicResponse) -> ChatResponse {
    debug!(stop_reason = ?resp.stop_reason, blocks = resp.content.len(), "Parsed Anthropic reply");
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in resp.content {
        match block {
            ContentBlock::Text { text: part } => text.push_str(&part),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name: from_wire_name(&name),
                arguments: input,
            }),
            ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
        }
    }
    ChatResponse {
        text,
        tool_calls,
        usage: TokenUsage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
        },
    }
}

// ── Conversion helpers ─────────────────────────────────────────────────────────

/// Converts internal chat messages into Anthropic format.
///
/// System messages are skipped (handled via top-level `system` field).
/// Anthropic forbids consecutive same-role messages, so consecutive tool
/// results, and a user turn following tool results, are merged into one
/// user message. Empty assistant replies are dropped.
fn convert_messages(messages: &[ChatMessage]) -> Vec<AnthropicMessage> {
    let mut result: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {}
            Role::User => {
                let block = ContentBlock::Text {
                    text: msg.content.clone(),
                };
                if push_into_user_blocks(&mut result, block).is_err() {
                    result.push(AnthropicMessage {
                        role: "user",
                        content: AnthropicContent::Text(msg.content.clone()),
                    });
                }
            }
            Role::Assistant => match &msg.tool_calls {
                Some(tool_calls) => {
                    let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    blocks.extend(tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                        id: tc.id.clone(),
                        name: to_wire_name(&tc.name),
                        input: tc.arguments.clone(),
                    }));
                    result.push(AnthropicMessage {
                        role: "assistant",
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                None if msg.content.trim().is_empty() => {}
                None => result.push(AnthropicMessage {
                    role: "assistant",
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
            },
            Role::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: msg
                        .tool_call_id
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    content: msg.content.clone(),
                    is_error: msg.is_error,
                };
                if let Err(block) = push_into_user_blocks(&mut result, block) {
                    result.push(AnthropicMessage {
                        role: "user",
                        content: AnthropicContent::Blocks(vec![block]),
                    });
                }
            }
        }
    }

    result
}

/// Appends to the last message when it is a user message holding blocks,
/// handing the block back otherwise.
fn push_into_user_blocks(
    result: &mut [AnthropicMessage],
    block: ContentBlock,
) -> Result<(), ContentBlock> {
    match result.last_mut() {
        Some(AnthropicMessage {
            role: "user",
            content: AnthropicContent::Blocks(blocks),
        }) => {
            blocks.push(block);
            Ok(())
        }
        _ => Err(block),
    }
}

fn convert_tool(t: &ToolDefinition) -> AnthropicTool {
    AnthropicTool {
        name: to_wire_name(&t.name),
        description: t.description.clone(),
        input_schema: t.parameters.clone(),
    }
}

fn to_wire_name(name: &str) -> String {
    name.replace('.', WIRE_NAME_SEPARATOR)
}

fn from_wire_name(name: &str) -> String {
    name.replace(WIRE_NAME_SEPARATOR, ".")
}

// ── Tests ──────────────────────────────────────────────────────────────────────
