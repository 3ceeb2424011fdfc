use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tool invocation requested by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id linking this call to exactly one [`ToolResult`].
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// JSON argument object.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Creates a tool call with a fresh correlation id.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }

    /// Returns a string argument by key, if present.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Tool declaration exposed to the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description used for tool selection.
    pub description: String,
    /// JSON schema of accepted arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Creates a tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Outcome of exactly one [`ToolCall`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Correlation id of the originating call.
    pub call_id: String,
    /// Name of the tool that produced this result.
    pub tool_name: String,
    /// Text or JSON-encoded payload.
    pub output: String,
    /// Whether the payload describes a failure.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful result.
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output: output.into(),
            is_error: false,
        }
    }

    /// Creates an error result.
    pub fn error(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output: error.into(),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_new_generates_unique_ids() {
        let a = ToolCall::new("browser.navigate", serde_json::json!({"url":"https://example.com"}));
        let b = ToolCall::new("browser.navigate", serde_json::json!({}));
        assert_ne!(a.id, b.id);
        assert_eq!(a.str_arg("url"), Some("https://example.com"));
        assert_eq!(b.str_arg("url"), None);
    }

    #[test]
    fn tool_result_constructors_set_error_flag() {
        let ok = ToolResult::success("c1", "browser.close", "closed");
        assert!(!ok.is_error);
        assert_eq!(ok.call_id, "c1");

        let err = ToolResult::error("c2", "file.write", "blocked");
        assert!(err.is_error);
        assert_eq!(err.output, "blocked");
    }
}
