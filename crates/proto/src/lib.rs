//! Shared protocol types for the conversation loop, agent stream, and tools.
//!
//! This crate defines the serializable turn/tool/event structures and the
//! strongly-typed error enums shared across the workspace.

pub mod error;
pub mod event;
pub mod message;
pub mod policy;
pub mod tool;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of agent stream wire types.
pub use event::{AgentEvent, InboundMessage, SessionResult, StopReason};
/// Re-export of conversation/turn identity types.
pub use message::{Role, SessionId, Turn};
/// Re-export of the policy gate decision type.
pub use policy::PolicyDecision;
/// Re-export of tool call definition and result types.
pub use tool::{ToolCall, ToolDefinition, ToolResult};

/// Returns `true` when the key looks like an Anthropic OAuth access token
/// (`sk-ant-oat*`) rather than a permanent API key (`sk-ant-api*`).
///
/// When this returns `true`, callers should use `Authorization: Bearer`
/// instead of `x-api-key` for Anthropic API requests.
pub fn is_anthropic_oauth_token(key: &str) -> bool {
    key.starts_with("sk-ant-oat")
}
