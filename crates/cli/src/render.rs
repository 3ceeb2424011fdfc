//! Console transcript rendering.

use std::io::Write;

use agent::TranscriptSink;
use crossterm::style::Stylize;
use proto::{SessionResult, StopReason, ToolCall, ToolResult, Turn};

/// Longest tool result shown in the transcript.
const MAX_RESULT_CHARS: usize = 600;
const MAX_ARG_CHARS: usize = 80;
/// Argument shown next to a tool name, first match wins.
const SALIENT_ARGS: &[&str] = &["url", "action", "instruction", "query", "steps", "file_path"];

/// Writes the transcript to a terminal.
pub struct ConsoleRenderer<W: Write + Send> {
    out: W,
    /// The human typed the last line after our prompt, so it is already on screen.
    echoed: bool,
}

impl ConsoleRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, echoed: false }
    }

    /// A one-line status note outside the conversation.
    pub fn status(&mut self, message: &str) {
        let _ = writeln!(self.out, "{}", message.dark_grey());
        let _ = self.out.flush();
    }

    /// A fatal error, printed once before exit.
    pub fn fatal(&mut self, message: &str) {
        let _ = writeln!(self.out, "{} {message}", "Error:".red().bold());
        let _ = self.out.flush();
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> TranscriptSink for ConsoleRenderer<W> {
    fn prompt(&mut self) {
        let _ = write!(self.out, "{} ", "You:".cyan().bold());
        let _ = self.out.flush();
        self.echoed = true;
    }

    fn user_turn(&mut self, turn: &Turn) {
        if !std::mem::take(&mut self.echoed) {
            let _ = writeln!(self.out, "{} {}", "You:".cyan().bold(), turn.content);
        }
    }

    fn agent_text(&mut self, turn: &Turn) {
        let _ = writeln!(self.out, "{} {}", "Agent:".magenta().bold(), turn.content);
        let _ = self.out.flush();
    }

    fn tool_call(&mut self, call: &ToolCall) {
        let line = match salient_arg(call) {
            Some(arg) => format!("  → {} {arg}", call.name),
            None => format!("  → {}", call.name),
        };
        let _ = writeln!(self.out, "{}", line.blue());
        let _ = self.out.flush();
    }

    fn tool_result(&mut self, result: &ToolResult) {
        let body = truncate_display(&result.output, MAX_RESULT_CHARS);
        if result.is_error {
            let _ = writeln!(self.out, "  {} {}", "✗".red().bold(), body.red());
        } else {
            let _ = writeln!(self.out, "  {} {}", "✓".green().bold(), body.dim());
        }
    }

    fn policy_block(&mut self, call: &ToolCall, reason: &str) {
        let _ = writeln!(
            self.out,
            "  {} {} {}",
            "✗".red().bold(),
            format!("{} blocked:", call.name).red().bold(),
            reason.red()
        );
    }

    fn turn_complete(&mut self, result: &SessionResult) {
        if result.reason == StopReason::MaxTurns {
            let _ = writeln!(
                self.out,
                "{}",
                format!("Stopped after {} rounds; over to you.", result.rounds).yellow()
            );
        }
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }

    fn goodbye(&mut self) {
        let _ = writeln!(self.out, "{}", "Goodbye!".dark_grey());
        let _ = self.out.flush();
    }
}

/// The first salient string argument of `call`, on one line.
fn salient_arg(call: &ToolCall) -> Option<String> {
    SALIENT_ARGS.iter().find_map(|key| {
        let value = call.str_arg(key)?;
        let flat = value.split_whitespace().collect::<Vec<_>>().join(" ");
        Some(truncate_display(&flat, MAX_ARG_CHARS))
    })
}

/// Cuts `text` to `max` characters, marking the cut with `…`.
fn truncate_display(text: &str, max: usize) -> String {
    let text = text.trim_end();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rendered(run: impl FnOnce(&mut ConsoleRenderer<Vec<u8>>)) -> String {
        let mut renderer = ConsoleRenderer::new(Vec::new());
        run(&mut renderer);
        String::from_utf8(renderer.into_inner()).expect("utf8")
    }

    #[test]
    fn long_results_are_capped() {
        let long = "a".repeat(2000);
        let out = rendered(|r| r.tool_result(&ToolResult::success("c1", "browser.extract", long)));
        assert!(out.contains(&format!("{}…", "a".repeat(600))));
        assert!(!out.contains(&"a".repeat(601)));
    }

    #[test]
    fn errors_and_blocks_are_marked() {
        let call = ToolCall {
            id: "c2".to_string(),
            name: "file.write".to_string(),
            arguments: json!({"file_path": "x.js"}),
        };
        let out = rendered(|r| {
            r.tool_result(&ToolResult::error("c1", "browser.act", "element not found"));
            r.policy_block(&call, "use custom_scripts/x.js");
        });
        assert_eq!(out.matches('✗').count(), 2);
        assert!(out.contains("element not found"));
        assert!(out.contains("file.write blocked:"));
        assert!(out.contains("use custom_scripts/x.js"));
    }

    #[test]
    fn tool_call_shows_salient_argument() {
        let call = ToolCall {
            id: "c3".to_string(),
            name: "browser.batch".to_string(),
            arguments: json!({"steps": "click #a\nthen scroll down"}),
        };
        let out = rendered(|r| r.tool_call(&call));
        assert!(out.contains("browser.batch click #a then scroll down"));
    }

    #[test]
    fn typed_input_is_not_echoed_twice() {
        let out = rendered(|r| {
            r.prompt();
            r.user_turn(&Turn::user(0, "hello"));
            r.user_turn(&Turn::user(1, "from args"));
        });
        assert_eq!(out.matches("You:").count(), 2);
        assert!(!out.contains("hello"));
        assert!(out.contains("from args"));
    }

    #[test]
    fn max_turns_note_names_rounds() {
        let out = rendered(|r| r.turn_complete(&SessionResult::max_turns(100)));
        assert!(out.contains("Stopped after 100 rounds"));
    }

    #[test]
    fn truncate_display_respects_char_boundaries() {
        assert_eq!(truncate_display("héllo wörld", 5), "héllo…");
        assert_eq!(truncate_display("short\n", 10), "short");
    }
}
