//! Policy gate decision shared by the conversation loop and its renderers.

use serde::{Deserialize, Serialize};

/// Outcome of checking a tool call against the action policy.
///
/// Computed statelessly per invocation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The call may be dispatched to the tool backend.
    Allow,
    /// The call must not run; `reason` is returned to the agent.
    Block {
        /// Actionable explanation, including the allowed location.
        reason: String,
    },
}

impl PolicyDecision {
    /// Creates a blocking decision.
    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`PolicyDecision::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}
