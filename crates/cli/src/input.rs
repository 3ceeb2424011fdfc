//! Line-oriented human input.

use agent::HumanInput;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

/// Reads human turns line by line.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, so a
/// stray byte from the terminal never ends the session.
pub struct LineInput<R> {
    reader: R,
    buf: Vec<u8>,
}

impl LineInput<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> HumanInput for LineInput<R> {
    async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agent::{ConversationLoop, PolicyGate, SessionOutcome, ToolRegistry};
    use tokio::sync::mpsc;

    use super::*;
    use crate::render::ConsoleRenderer;

    #[tokio::test]
    async fn yields_lines_then_eof() {
        let mut input = LineInput::new(BufReader::new(&b"go to example.com\r\nquit\n"[..]));
        assert_eq!(
            input.read_line().await.expect("line").as_deref(),
            Some("go to example.com")
        );
        assert_eq!(input.read_line().await.expect("line").as_deref(), Some("quit"));
        assert_eq!(input.read_line().await.expect("eof"), None);
    }

    #[tokio::test]
    async fn last_line_without_newline_is_kept() {
        let mut input = LineInput::new(BufReader::new(&b"exit"[..]));
        assert_eq!(input.read_line().await.expect("line").as_deref(), Some("exit"));
        assert_eq!(input.read_line().await.expect("eof"), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let mut input = LineInput::new(BufReader::new(&b"caf\xe9\nquit\n"[..]));
        assert_eq!(
            input.read_line().await.expect("line").as_deref(),
            Some("caf\u{FFFD}")
        );
        assert_eq!(input.read_line().await.expect("line").as_deref(), Some("quit"));
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_session() {
        let (in_tx, mut in_rx) = mpsc::channel(4);
        let (ev_tx, ev_rx) = mpsc::channel(4);
        tokio::spawn(async move {
            while in_rx.recv().await.is_some() {
                let done = proto::AgentEvent::TurnComplete(proto::SessionResult::completed(1));
                if ev_tx.send(Ok(done)).await.is_err() {
                    break;
                }
            }
        });
        let gate = PolicyGate::new("/work", "/work/custom_scripts");
        let mut session = ConversationLoop::new(in_tx, ev_rx, gate, Arc::new(ToolRegistry::new()));
        let mut input = LineInput::new(BufReader::new(&b"caf\xe9\nquit\n"[..]));
        let mut sink = ConsoleRenderer::new(Vec::new());

        let outcome = session.run(None, &mut input, &mut sink).await.expect("session");

        assert_eq!(outcome, SessionOutcome::UserExit);
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].content, "caf\u{FFFD}");
    }
}
