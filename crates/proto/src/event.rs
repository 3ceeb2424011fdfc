use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// Message sent from the conversation loop into the agent stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A new human turn.
    UserTurn {
        /// Turn text.
        content: String,
    },
    /// Results for every call of the previous assistant message, in call order.
    ToolResults {
        /// One result per correlation id.
        results: Vec<ToolResult>,
    },
}

impl InboundMessage {
    /// Creates a user turn message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::UserTurn {
            content: content.into(),
        }
    }
}

/// Event emitted by the agent stream, consumed in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Assistant message: optional text plus zero or more tool invocations.
    Assistant {
        /// Text surfaced to the human (may be empty).
        text: String,
        /// Invocations the controller must gate and dispatch.
        tool_calls: Vec<ToolCall>,
    },
    /// Tool results echoed back as a user-side message.
    ToolResults {
        /// Results in the order they were submitted.
        results: Vec<ToolResult>,
    },
    /// The agent finished its turn; control returns to the human.
    TurnComplete(SessionResult),
}

impl AgentEvent {
    /// Creates a text-only assistant event.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Why the agent handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a final reply.
    Completed,
    /// The per-turn round limit was reached.
    MaxTurns,
}

/// Summary attached to a turn-complete event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    /// LLM round trips used for this human turn.
    pub rounds: usize,
    /// Accumulated prompt tokens for this human turn.
    pub input_tokens: u32,
    /// Accumulated completion tokens for this human turn.
    pub output_tokens: u32,
    /// Whether the turn ended abnormally.
    pub is_error: bool,
    /// Stop reason.
    pub reason: StopReason,
}

impl SessionResult {
    /// A normally completed turn.
    pub fn completed(rounds: usize) -> Self {
        Self {
            rounds,
            input_tokens: 0,
            output_tokens: 0,
            is_error: false,
            reason: StopReason::Completed,
        }
    }

    /// A turn cut short by the round limit.
    pub fn max_turns(rounds: usize) -> Self {
        Self {
            rounds,
            input_tokens: 0,
            output_tokens: 0,
            is_error: true,
            reason: StopReason::MaxTurns,
        }
    }
}
