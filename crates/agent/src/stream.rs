//! Agent stream: a spawned task that turns inbound turns into agent events.
//!
//! The task owns the LLM chat history. Each LLM reply becomes one
//! [`AgentEvent::Assistant`]; a reply without tool calls is followed by
//! [`AgentEvent::TurnComplete`]. Tool results sent back in are echoed as
//! [`AgentEvent::ToolResults`] before the next LLM call.

use std::sync::Arc;

use proto::{
    AgentEvent, InboundMessage, LlmError, SessionResult, StopReason, ToolDefinition, ToolResult,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TokenUsage};

/// Default bound on LLM round trips per human turn.
pub const DEFAULT_MAX_TURNS: usize = 100;

const CHANNEL_CAPACITY: usize = 32;
const MAX_TOOL_RESULT_CHARS: usize = 16_000;
/// Roughly 150K tokens (1 token ≈ 4 chars), leaving room for the response.
const MAX_CONTEXT_CHARS: usize = 600_000;

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are agent-browse, an assistant that controls a local Chrome browser on the user's behalf.

Use the browser.* tools to navigate, act on, observe, extract from and screenshot web pages. Use browser.observe to discover selectors before clicking or typing when you are unsure of the page structure.
Your working directory is the agent workspace. Write any JavaScript or TypeScript files into the custom_scripts directory; writes of .js and .ts files anywhere else are rejected.

Guidelines: Keep replies concise and conversational. Avoid dumping large JSON. Only take screenshots when explicitly requested or on errors. For multi-step browser tasks, prefer the browser.batch tool to execute all steps in a single call."#;

/// Agent stream settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub model: String,
    pub max_turns: usize,
    pub system_prompt: String,
}

impl StreamConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_turns: DEFAULT_MAX_TURNS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Handles to a running agent stream.
pub struct AgentStream {
    /// Turns and tool results flowing into the agent.
    pub inbound: mpsc::Sender<InboundMessage>,
    /// Events in emission order. An `Err` is terminal.
    pub events: mpsc::Receiver<Result<AgentEvent, LlmError>>,
    /// The worker task; it ends when `inbound` is dropped.
    pub task: JoinHandle<()>,
}

impl AgentStream {
    /// Spawns the stream worker on the current runtime.
    pub fn spawn(
        llm: Arc<dyn LlmProvider>,
        tools: Vec<ToolDefinition>,
        config: StreamConfig,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker = StreamWorker {
            llm,
            tools,
            config,
            history: Vec::new(),
            pending: Vec::new(),
            rounds: 0,
            usage: TokenUsage::default(),
            events: events_tx,
        };
        let task = tokio::spawn(worker.run(inbound_rx));
        Self {
            inbound: inbound_tx,
            events: events_rx,
            task,
        }
    }
}

struct StreamWorker {
    llm: Arc<dyn LlmProvider>,
    tools: Vec<ToolDefinition>,
    config: StreamConfig,
    history: Vec<ChatMessage>,
    /// Calls of the last assistant message still waiting for results.
    pending: Vec<(String, String)>,
    rounds: usize,
    usage: TokenUsage,
    events: mpsc::Sender<Result<AgentEvent, LlmError>>,
}

impl StreamWorker {
    async fn run(mut self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            let call_llm = match message {
                InboundMessage::UserTurn { content } => {
                    self.resolve_pending(Vec::new());
                    self.history.push(ChatMessage::user(content));
                    self.rounds = 0;
                    self.usage = TokenUsage::default();
                    true
                }
                InboundMessage::ToolResults { results } => {
                    if self.pending.is_empty() {
                        warn!(count = results.len(), "Tool results with no pending calls ignored");
                        false
                    } else {
                        let ordered = self.resolve_pending(results);
                        if !self.emit(Ok(AgentEvent::ToolResults { results: ordered })).await {
                            break;
                        }
                        true
                    }
                }
            };
            if call_llm && !self.step().await {
                break;
            }
        }
        debug!("Agent stream finished");
    }

    /// Pairs `results` with pending calls in call order, appending them to
    /// the history. Calls without a result get a synthetic error.
    fn resolve_pending(&mut self, mut results: Vec<ToolResult>) -> Vec<ToolResult> {
        let mut ordered = Vec::with_capacity(self.pending.len());
        for (call_id, tool_name) in std::mem::take(&mut self.pending) {
            let result = match results.iter().position(|r| r.call_id == call_id) {
                Some(idx) => results.swap_remove(idx),
                None => {
                    warn!(call_id = %call_id, tool = %tool_name, "No result for tool call");
                    ToolResult::error(&call_id, &tool_name, "Tool call was not executed")
                }
            };
            let mut message = ChatMessage::tool_result(&result);
            message.content = truncate_tool_result(&message.content, MAX_TOOL_RESULT_CHARS);
            self.history.push(message);
            ordered.push(result);
        }
        for stray in results {
            warn!(call_id = %stray.call_id, "Dropping result for unknown tool call");
        }
        ordered
    }

    /// One LLM round trip. Returns `false` once the stream must stop.
    async fn step(&mut self) -> bool {
        if self.rounds >= self.config.max_turns {
            warn!(
                "Max tool rounds ({}) reached; returning control to the user",
                self.config.max_turns
            );
            let result = self.session_result(StopReason::MaxTurns);
            return self.emit(Ok(AgentEvent::TurnComplete(result))).await;
        }
        self.rounds += 1;

        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(ChatMessage::system(&self.config.system_prompt));
        messages.extend(self.history.iter().cloned());
        truncate_messages_to_fit(&mut messages);

        let request = ChatRequest {
            messages,
            tools: self.tools.clone(),
            model: self.config.model.clone(),
        };
        let t0 = std::time::Instant::now();
        debug!(round = self.rounds, "LLM call");
        let response = match self.llm.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "LLM call failed; closing agent stream");
                self.emit(Err(e)).await;
                return false;
            }
        };
        debug!(elapsed_ms = %t0.elapsed().as_millis(), round = self.rounds, "LLM response received");

        self.usage.add(&response.usage);
        self.pending = response
            .tool_calls
            .iter()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();
        self.history.push(ChatMessage::assistant_with_calls(
            response.text.clone(),
            response.tool_calls.clone(),
        ));

        let done = response.tool_calls.is_empty();
        let event = AgentEvent::Assistant {
            text: response.text,
            tool_calls: response.tool_calls,
        };
        if !self.emit(Ok(event)).await {
            return false;
        }
        if done {
            info!(rounds = self.rounds, "Agent turn complete");
            let result = self.session_result(StopReason::Completed);
            return self.emit(Ok(AgentEvent::TurnComplete(result))).await;
        }
        true
    }

    fn session_result(&self, reason: StopReason) -> SessionResult {
        let mut result = match reason {
            StopReason::Completed => SessionResult::completed(self.rounds),
            StopReason::MaxTurns => SessionResult::max_turns(self.rounds),
        };
        result.input_tokens = self.usage.prompt_tokens;
        result.output_tokens = self.usage.completion_tokens;
        result
    }

    async fn emit(&self, event: Result<AgentEvent, LlmError>) -> bool {
        if self.events.send(event).await.is_err() {
            debug!("Event receiver dropped");
            return false;
        }
        true
    }
}

/// Truncates a tool result to at most `max_chars` characters.
/// If the result is longer, it appends a note with how many characters were cut.
fn truncate_tool_result(output: &str, max_chars: usize) -> String {
    let total_chars = output.chars().count();
    if total_chars <= max_chars {
        return output.to_string();
    }

    let kept = output.chars().take(max_chars).collect::<String>();
    let cut = total_chars - max_chars;
    format!("{kept}\n...[output truncated: {cut} chars omitted]")
}

fn estimate_message_chars(msg: &ChatMessage) -> usize {
    let mut chars = msg.content.len();
    if let Some(calls) = &msg.tool_calls {
        for tc in calls {
            chars += tc.name.len();
            chars += tc.arguments.to_string().len();
        }
    }
    chars
}

/// Drops the oldest messages after the system prompt until the context
/// fits [`MAX_CONTEXT_CHARS`]. Cuts only at user-text boundaries so that no
/// tool result is separated from the call that produced it.
fn truncate_messages_to_fit(messages: &mut Vec<ChatMessage>) {
    let total: usize = messages.iter().map(estimate_message_chars).sum();
    if total <= MAX_CONTEXT_CHARS {
        return;
    }

    let mut dropped_chars = 0;
    let mut cut = None;
    for (idx, msg) in messages.iter().enumerate().skip(1) {
        if idx > 1 && msg.role == proto::Role::User && total - dropped_chars <= MAX_CONTEXT_CHARS {
            cut = Some(idx);
            break;
        }
        dropped_chars += estimate_message_chars(msg);
    }

    // Fall back to the most recent user turn when even that is too large.
    let cut = cut.or_else(|| {
        messages
            .iter()
            .rposition(|m| m.role == proto::Role::User)
            .filter(|&idx| idx > 1)
    });
    if let Some(cut) = cut {
        warn!(
            "Conversation context too large ({total} chars > {MAX_CONTEXT_CHARS}); \
             dropping {} oldest messages to fit",
            cut - 1
        );
        messages.drain(1..cut);
    }
}
