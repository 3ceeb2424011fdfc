//! Conversation loop controller.
//!
//! Alternates between two waits and never holds both at once: waiting for
//! the human (between agent turns) and waiting for the agent stream (while
//! a turn is in flight). Every tool call passes the [`PolicyGate`] before it
//! reaches the [`ToolRegistry`].

use std::collections::HashSet;
use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use proto::{
    AgentEvent, Error, InboundMessage, LlmError, PolicyDecision, SessionError, SessionResult,
    ToolCall, ToolResult, Turn,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::policy::PolicyGate;
use crate::tool_registry::ToolRegistry;

/// Source of human input lines.
#[async_trait]
pub trait HumanInput: Send {
    /// Next line, or `None` at end of input.
    async fn read_line(&mut self) -> std::io::Result<Option<String>>;
}

/// Presentation hooks for the transcript. Purely cosmetic.
pub trait TranscriptSink: Send {
    fn prompt(&mut self);
    fn user_turn(&mut self, turn: &Turn);
    fn agent_text(&mut self, turn: &Turn);
    fn tool_call(&mut self, call: &ToolCall);
    fn tool_result(&mut self, result: &ToolResult);
    fn policy_block(&mut self, call: &ToolCall, reason: &str);
    fn turn_complete(&mut self, result: &SessionResult);
    fn goodbye(&mut self);
}

/// Process-wide session flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub conversation_active: bool,
    pub awaiting_user_input: bool,
}

impl SessionState {
    fn start(has_initial_prompt: bool) -> Self {
        Self {
            conversation_active: true,
            awaiting_user_input: !has_initial_prompt,
        }
    }
}

/// How a session that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The human typed `exit`/`quit` or input ended.
    UserExit,
    /// The agent stream closed on its own.
    StreamEnded,
}

pub struct ConversationLoop {
    state: SessionState,
    turns: Vec<Turn>,
    inbound: Option<mpsc::Sender<InboundMessage>>,
    events: mpsc::Receiver<Result<AgentEvent, LlmError>>,
    gate: PolicyGate,
    registry: Arc<ToolRegistry>,
    /// Call ids already reported as blocked; their echoed results are not shown again.
    blocked: HashSet<String>,
}

impl ConversationLoop {
    pub fn new(
        inbound: mpsc::Sender<InboundMessage>,
        events: mpsc::Receiver<Result<AgentEvent, LlmError>>,
        gate: PolicyGate,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            state: SessionState::start(false),
            turns: Vec::new(),
            inbound: Some(inbound),
            events,
            gate,
            registry,
            blocked: HashSet::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transcript so far, in emission order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Runs the session until exit, stream end, or stream failure.
    ///
    /// A non-empty `initial_prompt` is submitted as the first turn without
    /// prompting the human.
    pub async fn run(
        &mut self,
        initial_prompt: Option<String>,
        input: &mut dyn HumanInput,
        sink: &mut dyn TranscriptSink,
    ) -> Result<SessionOutcome, Error> {
        let initial_prompt = initial_prompt.filter(|p| !p.trim().is_empty());
        self.state = SessionState::start(initial_prompt.is_some());
        if let Some(prompt) = initial_prompt {
            self.submit_human_input(&prompt, sink).await?;
        }

        while self.state.conversation_active {
            if self.state.awaiting_user_input {
                sink.prompt();
                match input.read_line().await {
                    Ok(Some(line)) => self.submit_human_input(&line, sink).await?,
                    Ok(None) => self.finish(sink),
                    Err(e) if e.kind() == ErrorKind::InvalidData => {
                        warn!(error = %e, "Unreadable input line ignored");
                    }
                    Err(e) => return Err(SessionError::Input(e).into()),
                }
                continue;
            }

            let Some(event) = self.events.recv().await else {
                info!("Agent stream ended");
                self.state.conversation_active = false;
                self.inbound = None;
                return Ok(SessionOutcome::StreamEnded);
            };
            self.handle_event(event?, sink).await?;
        }
        Ok(SessionOutcome::UserExit)
    }

    /// Applies one line of human input.
    ///
    /// `exit` and `quit` end the session without emitting a turn; blank
    /// input leaves the controller waiting for the human. Anything else is
    /// sent exactly as typed.
    pub async fn submit_human_input(
        &mut self,
        text: &str,
        sink: &mut dyn TranscriptSink,
    ) -> Result<(), Error> {
        let command = text.trim();
        if is_exit_command(command) {
            self.finish(sink);
            return Ok(());
        }
        if command.is_empty() {
            return Ok(());
        }

        let turn = Turn::user(self.turns.len(), text);
        sink.user_turn(&turn);
        self.turns.push(turn);
        self.state.awaiting_user_input = false;
        self.send(InboundMessage::user(text)).await
    }

    async fn handle_event(
        &mut self,
        event: AgentEvent,
        sink: &mut dyn TranscriptSink,
    ) -> Result<(), Error> {
        match event {
            AgentEvent::Assistant { text, tool_calls } => {
                if !text.trim().is_empty() {
                    let turn = Turn::agent(self.turns.len(), text);
                    sink.agent_text(&turn);
                    self.turns.push(turn);
                }
                if !tool_calls.is_empty() {
                    let results = self.dispatch(&tool_calls, sink).await;
                    self.send(InboundMessage::ToolResults { results }).await?;
                }
            }
            AgentEvent::ToolResults { results } => {
                for result in &results {
                    if self.blocked.remove(&result.call_id) {
                        continue;
                    }
                    sink.tool_result(result);
                }
            }
            AgentEvent::TurnComplete(result) => {
                debug!(
                    rounds = result.rounds,
                    input_tokens = result.input_tokens,
                    output_tokens = result.output_tokens,
                    "Turn complete"
                );
                sink.turn_complete(&result);
                self.state.awaiting_user_input = true;
            }
        }
        Ok(())
    }

    /// Gates and executes `calls` one at a time, returning one result per
    /// call in call order.
    async fn dispatch(
        &mut self,
        calls: &[ToolCall],
        sink: &mut dyn TranscriptSink,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            sink.tool_call(call);
            let result = match self.gate.check(&call.name, &call.arguments) {
                PolicyDecision::Allow => {
                    self.registry
                        .execute(&call.id, &call.name, call.arguments.clone())
                        .await
                }
                PolicyDecision::Block { reason } => {
                    warn!(tool = %call.name, call_id = %call.id, "Tool call blocked: {reason}");
                    sink.policy_block(call, &reason);
                    self.blocked.insert(call.id.clone());
                    ToolResult::error(&call.id, &call.name, reason)
                }
            };
            results.push(result);
        }
        results
    }

    async fn send(&self, message: InboundMessage) -> Result<(), Error> {
        let Some(inbound) = &self.inbound else {
            return Err(SessionError::StreamClosed.into());
        };
        inbound
            .send(message)
            .await
            .map_err(|_| SessionError::StreamClosed.into())
    }

    fn finish(&mut self, sink: &mut dyn TranscriptSink) {
        info!("Conversation ended by user");
        self.state.conversation_active = false;
        self.state.awaiting_user_input = false;
        self.inbound = None;
        sink.goodbye();
    }
}

fn is_exit_command(text: &str) -> bool {
    text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit")
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use proto::Role;
    use serde_json::{Value, json};
    use tools::Tool;

    use super::*;

    struct ScriptedInput(VecDeque<String>);

    impl ScriptedInput {
        fn new(lines: &[&str]) -> Self {
            Self(lines.iter().map(|l| l.to_string()).collect())
        }
    }

    #[async_trait]
    impl HumanInput for ScriptedInput {
        async fn read_line(&mut self) -> std::io::Result<Option<String>> {
            Ok(self.0.pop_front())
        }
    }

    /// Yields one undecodable line before the scripted ones.
    struct GarbledFirst(ScriptedInput, bool);

    #[async_trait]
    impl HumanInput for GarbledFirst {
        async fn read_line(&mut self) -> std::io::Result<Option<String>> {
            if !std::mem::replace(&mut self.1, true) {
                return Err(std::io::Error::new(
                    ErrorKind::InvalidData,
                    "stream did not contain valid UTF-8",
                ));
            }
            self.0.read_line().await
        }
    }

    #[derive(Default)]
    struct Recorder {
        log: Vec<String>,
    }

    impl TranscriptSink for Recorder {
        fn prompt(&mut self) {
            self.log.push("prompt".to_string());
        }
        fn user_turn(&mut self, turn: &Turn) {
            self.log.push(format!("user:{}", turn.content));
        }
        fn agent_text(&mut self, turn: &Turn) {
            self.log.push(format!("agent:{}", turn.content));
        }
        fn tool_call(&mut self, call: &ToolCall) {
            self.log.push(format!("call:{}", call.name));
        }
        fn tool_result(&mut self, result: &ToolResult) {
            self.log.push(format!("result:{}:{}", result.call_id, result.is_error));
        }
        fn policy_block(&mut self, call: &ToolCall, _reason: &str) {
            self.log.push(format!("blocked:{}", call.id));
        }
        fn turn_complete(&mut self, _result: &SessionResult) {
            self.log.push("done".to_string());
        }
        fn goodbye(&mut self) {
            self.log.push("bye".to_string());
        }
    }

    struct CountingWrite {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for CountingWrite {
        fn name(&self) -> &str {
            "file.write"
        }
        fn description(&self) -> &str {
            "records writes"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
            let path = args["file_path"].as_str().unwrap_or_default().to_string();
            self.calls.lock().push(path);
            ToolResult::success(call_id, "file.write", "written")
        }
    }

    type Script = Vec<Vec<Result<AgentEvent, LlmError>>>;

    /// Answers each inbound message with the next batch of events and
    /// closes the stream once the script runs out.
    fn fake_agent(script: Script) -> (ConversationParts, Arc<Mutex<Vec<InboundMessage>>>) {
        let (in_tx, mut in_rx) = mpsc::channel::<InboundMessage>(8);
        let (ev_tx, ev_rx) = mpsc::channel(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_task = seen.clone();
        tokio::spawn(async move {
            let mut script = VecDeque::from(script);
            while let Some(message) = in_rx.recv().await {
                seen_task.lock().push(message);
                let Some(batch) = script.pop_front() else {
                    break;
                };
                for event in batch {
                    if ev_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });
        ((in_tx, ev_rx), seen)
    }

    type ConversationParts = (
        mpsc::Sender<InboundMessage>,
        mpsc::Receiver<Result<AgentEvent, LlmError>>,
    );

    fn controller(parts: ConversationParts, registry: ToolRegistry) -> ConversationLoop {
        let gate = PolicyGate::new("/work", "/work/custom_scripts");
        ConversationLoop::new(parts.0, parts.1, gate, Arc::new(registry))
    }

    fn done() -> Result<AgentEvent, LlmError> {
        Ok(AgentEvent::TurnComplete(SessionResult::completed(1)))
    }

    fn write_call(id: &str, path: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "file.write".to_string(),
            arguments: json!({"file_path": path, "content": "1"}),
        }
    }

    #[tokio::test]
    async fn initial_prompt_is_first_turn_without_prompting() {
        let (parts, seen) = fake_agent(vec![vec![Ok(AgentEvent::text("Opened")), done()]]);
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["quit"]);
        let mut sink = Recorder::default();

        let outcome = session
            .run(Some("go to example.com".to_string()), &mut input, &mut sink)
            .await
            .expect("session");

        assert_eq!(outcome, SessionOutcome::UserExit);
        assert_eq!(sink.log[0], "user:go to example.com");
        assert_eq!(
            sink.log,
            vec!["user:go to example.com", "agent:Opened", "done", "prompt", "bye"]
        );
        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "go to example.com");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(seen.lock()[0], InboundMessage::user("go to example.com"));
    }

    #[tokio::test]
    async fn quit_emits_no_turn_and_deactivates() {
        let (parts, seen) = fake_agent(Vec::new());
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["  QuIt "]);
        let mut sink = Recorder::default();

        let outcome = session.run(None, &mut input, &mut sink).await.expect("session");

        assert_eq!(outcome, SessionOutcome::UserExit);
        assert!(session.turns().is_empty());
        assert!(!session.state().conversation_active);
        assert!(seen.lock().is_empty());
        assert_eq!(sink.log, vec!["prompt", "bye"]);
    }

    #[tokio::test]
    async fn blank_lines_reprompt_and_eof_exits() {
        let (parts, _seen) = fake_agent(Vec::new());
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["", "   "]);
        let mut sink = Recorder::default();

        let outcome = session.run(None, &mut input, &mut sink).await.expect("session");

        assert_eq!(outcome, SessionOutcome::UserExit);
        assert!(session.turns().is_empty());
        assert_eq!(sink.log, vec!["prompt", "prompt", "prompt", "bye"]);
    }

    #[tokio::test]
    async fn blocked_write_never_reaches_backend() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(CountingWrite {
            calls: writes.clone(),
        });

        let calls = vec![
            write_call("bad", "/work/evil.js"),
            write_call("good", "/work/custom_scripts/ok.js"),
            write_call("plain", "notes.txt"),
        ];
        let (parts, seen) = fake_agent(vec![
            vec![Ok(AgentEvent::Assistant {
                text: String::new(),
                tool_calls: calls,
            })],
            vec![Ok(AgentEvent::text("Saved")), done()],
        ]);
        let mut session = controller(parts, registry);
        let mut input = ScriptedInput::new(&["write scripts", "exit"]);
        let mut sink = Recorder::default();

        session.run(None, &mut input, &mut sink).await.expect("session");

        assert_eq!(
            *writes.lock(),
            vec!["/work/custom_scripts/ok.js".to_string(), "notes.txt".to_string()]
        );
        assert!(sink.log.contains(&"blocked:bad".to_string()));

        let seen = seen.lock();
        let InboundMessage::ToolResults { results } = &seen[1] else {
            panic!("expected tool results");
        };
        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["bad", "good", "plain"]);
        assert!(results[0].is_error);
        assert!(results[0].output.contains("/work/custom_scripts/evil.js"));
        assert!(!results[1].is_error);
        assert!(!results[2].is_error);
    }

    #[tokio::test]
    async fn blocked_call_is_reported_once() {
        let (parts, _seen) = fake_agent(vec![
            vec![Ok(AgentEvent::Assistant {
                text: String::new(),
                tool_calls: vec![write_call("bad", "/work/evil.js")],
            })],
            vec![
                Ok(AgentEvent::ToolResults {
                    results: vec![ToolResult::error("bad", "file.write", "blocked")],
                }),
                done(),
            ],
        ]);
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["write it", "quit"]);
        let mut sink = Recorder::default();

        session.run(None, &mut input, &mut sink).await.expect("session");

        let mentions: Vec<_> = sink.log.iter().filter(|l| l.contains("bad")).collect();
        assert_eq!(mentions, vec!["blocked:bad"]);
    }

    #[tokio::test]
    async fn unknown_tool_still_gets_a_result() {
        let call = ToolCall {
            id: "x1".to_string(),
            name: "browser.teleport".to_string(),
            arguments: json!({}),
        };
        let (parts, seen) = fake_agent(vec![
            vec![Ok(AgentEvent::Assistant {
                text: "Trying".to_string(),
                tool_calls: vec![call],
            })],
            vec![done()],
        ]);
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["go", "quit"]);
        let mut sink = Recorder::default();

        session.run(None, &mut input, &mut sink).await.expect("session");

        let seen = seen.lock();
        let InboundMessage::ToolResults { results } = &seen[1] else {
            panic!("expected tool results");
        };
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].call_id, "x1");
        assert!(results[0].is_error);
    }

    #[tokio::test]
    async fn echoed_results_are_rendered() {
        let echoed = ToolResult::error("c9", "browser.act", "no such element");
        let (parts, _seen) = fake_agent(vec![vec![
            Ok(AgentEvent::ToolResults {
                results: vec![echoed],
            }),
            done(),
        ]]);
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["click it", "quit"]);
        let mut sink = Recorder::default();

        session.run(None, &mut input, &mut sink).await.expect("session");
        assert!(sink.log.contains(&"result:c9:true".to_string()));
    }

    #[tokio::test]
    async fn typed_text_is_sent_verbatim() {
        let (parts, seen) = fake_agent(vec![vec![done()]]);
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["  find  two spaces ", "quit"]);
        let mut sink = Recorder::default();

        session.run(None, &mut input, &mut sink).await.expect("session");

        assert_eq!(session.turns()[0].content, "  find  two spaces ");
        assert_eq!(seen.lock()[0], InboundMessage::user("  find  two spaces "));
    }

    #[tokio::test]
    async fn undecodable_line_reprompts() {
        let (parts, seen) = fake_agent(Vec::new());
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = GarbledFirst(ScriptedInput::new(&["quit"]), false);
        let mut sink = Recorder::default();

        let outcome = session.run(None, &mut input, &mut sink).await.expect("session");

        assert_eq!(outcome, SessionOutcome::UserExit);
        assert!(seen.lock().is_empty());
        assert_eq!(sink.log, vec!["prompt", "prompt", "bye"]);
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let (parts, _seen) = fake_agent(vec![vec![Err(LlmError::Api("boom".to_string()))]]);
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["hi"]);
        let mut sink = Recorder::default();

        let err = session
            .run(None, &mut input, &mut sink)
            .await
            .expect_err("stream failure");
        assert!(matches!(err, Error::Llm(LlmError::Api(_))));
    }

    #[tokio::test]
    async fn stream_end_finishes_session() {
        let (parts, _seen) = fake_agent(Vec::new());
        let mut session = controller(parts, ToolRegistry::new());
        let mut input = ScriptedInput::new(&["hello"]);
        let mut sink = Recorder::default();

        let outcome = session.run(None, &mut input, &mut sink).await.expect("session");
        assert_eq!(outcome, SessionOutcome::StreamEnded);
        assert!(!session.state().conversation_active);
        assert_eq!(session.turns().len(), 1);
    }
}
