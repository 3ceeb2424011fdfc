use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a new random session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the raw session identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message authored by the human operator.
    User,
    /// Message authored by the agent.
    Assistant,
    /// System-level instruction message.
    System,
    /// Tool execution result message.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" | "agent" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            other => Err(crate::error::ProtoError::InvalidRole(other.to_string())),
        }
    }
}

/// One message exchanged between the human and the agent.
///
/// Turns are immutable once emitted; the ordered list of turns is the whole
/// persisted state of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Position of this turn in the session transcript.
    pub seq: usize,
    /// Either [`Role::User`] or [`Role::Assistant`].
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Creation timestamp in UTC.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Creates a user turn at the given transcript position.
    pub fn user(seq: usize, content: impl Into<String>) -> Self {
        Self::new(seq, Role::User, content)
    }

    /// Creates an agent turn at the given transcript position.
    pub fn agent(seq: usize, content: impl Into<String>) -> Self {
        Self::new(seq, Role::Assistant, content)
    }

    fn new(seq: usize, role: Role, content: impl Into<String>) -> Self {
        Self {
            seq,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
