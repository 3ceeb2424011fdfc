//! Agent stream, LLM adapter, policy gate, and conversation loop.

pub mod anthropic;
pub mod conversation;
pub mod llm;
pub mod policy;
pub mod stream;
pub mod tool_registry;

/// Anthropic Messages API provider.
pub use anthropic::AnthropicProvider;
/// Conversation loop controller and its I/O seams.
pub use conversation::{ConversationLoop, HumanInput, SessionOutcome, SessionState, TranscriptSink};
/// Chat request/response models and provider interfaces.
pub use llm::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, TokenUsage};
/// Script write confinement.
pub use policy::PolicyGate;
/// Agent stream task.
pub use stream::{AgentStream, DEFAULT_MAX_TURNS, StreamConfig};
/// Runtime tool registry.
pub use tool_registry::ToolRegistry;
