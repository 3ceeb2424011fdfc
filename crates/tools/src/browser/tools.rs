//! Browser tools exposed to the agent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proto::ToolResult;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::timeout;

use super::actions::{PageAction, http_url, split_steps};
use super::session::BrowserSession;
use crate::Tool;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const BATCH_TIMEOUT_SECS: u64 = 120;
const MAX_TIMEOUT_SECS: u64 = 300;

fn operation_timeout(requested: Option<u64>, default_secs: u64) -> Duration {
    Duration::from_secs(requested.unwrap_or(default_secs).clamp(1, MAX_TIMEOUT_SECS))
}

fn timeout_property() -> Value {
    json!({
        "type": "integer",
        "description": "Operation timeout in seconds (default: 30, max: 300)"
    })
}

fn parse_args<T: for<'de> Deserialize<'de>>(
    call_id: &str,
    tool: &str,
    args: Value,
) -> Result<T, ToolResult> {
    serde_json::from_value(args)
        .map_err(|e| ToolResult::error(call_id, tool, format!("Invalid arguments: {e}")))
}

/// Runs `work` under `limit`, encoding its JSON payload into a result.
async fn finish<F>(call_id: &str, tool: &str, limit: Duration, work: F) -> ToolResult
where
    F: Future<Output = Result<Value, String>>,
{
    match timeout(limit, work).await {
        Ok(Ok(payload)) => ToolResult::success(call_id, tool, payload.to_string()),
        Ok(Err(err)) => ToolResult::error(call_id, tool, err),
        Err(_) => ToolResult::error(
            call_id,
            tool,
            format!("Operation timed out after {}s", limit.as_secs()),
        ),
    }
}

/// `browser.navigate`
pub struct NavigateTool {
    session: Arc<BrowserSession>,
}

#[derive(Debug, Deserialize)]
struct NavigateArgs {
    url: String,
    timeout_secs: Option<u64>,
}

impl NavigateTool {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for NavigateTool {
    fn name(&self) -> &str {
        "browser.navigate"
    }

    fn description(&self) -> &str {
        "Navigate the browser to a URL and return the final URL and page title"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute http(s) URL to open" },
                "timeout_secs": timeout_property()
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: NavigateArgs = match parse_args(call_id, self.name(), args) {
            Ok(v) => v,
            Err(result) => return result,
        };
        let url = match http_url(&parsed.url) {
            Ok(u) => u,
            Err(e) => return ToolResult::error(call_id, self.name(), e),
        };
        let limit = operation_timeout(parsed.timeout_secs, DEFAULT_TIMEOUT_SECS);
        finish(call_id, self.name(), limit, self.session.navigate(url.as_str())).await
    }
}

/// `browser.act`
pub struct ActTool {
    session: Arc<BrowserSession>,
}

#[derive(Debug, Deserialize)]
struct ActArgs {
    action: String,
    timeout_secs: Option<u64>,
}

impl ActTool {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ActTool {
    fn name(&self) -> &str {
        "browser.act"
    }

    fn description(&self) -> &str {
        "Perform one action on the current page: `click <selector>`, `type <text> into <selector>`, \
         `press <key> [on <selector>]`, `scroll up|down`, `wait <seconds>`, `go to <url>`, or `back`"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "description": "Single action, e.g. `click button[type=submit]`" },
                "timeout_secs": timeout_property()
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: ActArgs = match parse_args(call_id, self.name(), args) {
            Ok(v) => v,
            Err(result) => return result,
        };
        let action = match PageAction::parse(&parsed.action) {
            Ok(action) => action,
            Err(e) => return ToolResult::error(call_id, self.name(), e),
        };
        let limit = operation_timeout(parsed.timeout_secs, DEFAULT_TIMEOUT_SECS);
        finish(call_id, self.name(), limit, self.session.perform(&action)).await
    }
}

/// `browser.extract`
pub struct ExtractTool {
    session: Arc<BrowserSession>,
}

#[derive(Debug, Deserialize)]
struct ExtractArgs {
    instruction: String,
    schema: Option<Value>,
    timeout_secs: Option<u64>,
}

impl ExtractTool {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ExtractTool {
    fn name(&self) -> &str {
        "browser.extract"
    }

    fn description(&self) -> &str {
        "Extract information from the current page: returns title, URL, headings, visible text and links"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "instruction": { "type": "string", "description": "What to extract from the page" },
                "schema": { "type": "object", "description": "Optional JSON schema describing the desired answer shape" },
                "timeout_secs": timeout_property()
            },
            "required": ["instruction"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: ExtractArgs = match parse_args(call_id, self.name(), args) {
            Ok(v) => v,
            Err(result) => return result,
        };
        let limit = operation_timeout(parsed.timeout_secs, DEFAULT_TIMEOUT_SECS);
        finish(
            call_id,
            self.name(),
            limit,
            self.session
                .extract(&parsed.instruction, parsed.schema.as_ref()),
        )
        .await
    }
}

/// `browser.observe`
pub struct ObserveTool {
    session: Arc<BrowserSession>,
}

#[derive(Debug, Deserialize)]
struct ObserveArgs {
    query: String,
    timeout_secs: Option<u64>,
}

impl ObserveTool {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ObserveTool {
    fn name(&self) -> &str {
        "browser.observe"
    }

    fn description(&self) -> &str {
        "List interactive elements on the current page (CSS selector, tag, text) relevant to a query"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What you are looking for, e.g. `search box`" },
                "timeout_secs": timeout_property()
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: ObserveArgs = match parse_args(call_id, self.name(), args) {
            Ok(v) => v,
            Err(result) => return result,
        };
        let limit = operation_timeout(parsed.timeout_secs, DEFAULT_TIMEOUT_SECS);
        finish(call_id, self.name(), limit, self.session.observe(&parsed.query)).await
    }
}

/// `browser.screenshot`
pub struct ScreenshotTool {
    session: Arc<BrowserSession>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScreenshotArgs {
    timeout_secs: Option<u64>,
}

impl ScreenshotTool {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ScreenshotTool {
    fn name(&self) -> &str {
        "browser.screenshot"
    }

    fn description(&self) -> &str {
        "Capture a full-page screenshot and save it as PNG; returns the file path"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "timeout_secs": timeout_property() },
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: ScreenshotArgs = if args.is_null() {
            ScreenshotArgs::default()
        } else {
            match parse_args(call_id, self.name(), args) {
                Ok(v) => v,
                Err(result) => return result,
            }
        };
        let limit = operation_timeout(parsed.timeout_secs, DEFAULT_TIMEOUT_SECS);
        finish(call_id, self.name(), limit, self.session.screenshot()).await
    }
}

/// `browser.batch`
pub struct BatchTool {
    session: Arc<BrowserSession>,
}

#[derive(Debug, Deserialize)]
struct BatchArgs {
    steps: String,
    timeout_secs: Option<u64>,
}

impl BatchTool {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }

    async fn run_steps(&self, steps: Vec<String>) -> (Vec<Value>, bool) {
        let mut report = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let outcome = match PageAction::parse(step) {
                Ok(action) => self.session.perform(&action).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(result) => report.push(json!({ "step": index + 1, "action": step, "ok": true, "result": result })),
                Err(error) => {
                    report.push(json!({ "step": index + 1, "action": step, "ok": false, "error": error }));
                    return (report, false);
                }
            }
        }
        (report, true)
    }
}

#[async_trait]
impl Tool for BatchTool {
    fn name(&self) -> &str {
        "browser.batch"
    }

    fn description(&self) -> &str {
        "Run several browser actions in one call. Separate steps with newlines, `;` or `then`; \
         each step uses the browser.act grammar. Stops at the first failing step"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": { "type": "string", "description": "e.g. `go to example.com then click a.more; wait 1`" },
                "timeout_secs": { "type": "integer", "description": "Timeout for the whole batch in seconds (default: 120, max: 300)" }
            },
            "required": ["steps"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: BatchArgs = match parse_args(call_id, self.name(), args) {
            Ok(v) => v,
            Err(result) => return result,
        };
        let steps = split_steps(&parsed.steps);
        if steps.is_empty() {
            return ToolResult::error(call_id, self.name(), "No steps given");
        }
        let total = steps.len();
        let limit = operation_timeout(parsed.timeout_secs, BATCH_TIMEOUT_SECS);

        match timeout(limit, self.run_steps(steps)).await {
            Ok((report, all_ok)) => {
                let payload = json!({
                    "completed": report.iter().filter(|r| r["ok"] == true).count(),
                    "total": total,
                    "steps": report,
                })
                .to_string();
                if all_ok {
                    ToolResult::success(call_id, self.name(), payload)
                } else {
                    ToolResult::error(call_id, self.name(), payload)
                }
            }
            Err(_) => ToolResult::error(
                call_id,
                self.name(),
                format!("Batch timed out after {}s", limit.as_secs()),
            ),
        }
    }
}

/// `browser.close`
pub struct CloseTool {
    session: Arc<BrowserSession>,
}

impl CloseTool {
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for CloseTool {
    fn name(&self) -> &str {
        "browser.close"
    }

    fn description(&self) -> &str {
        "Close the browser. It restarts automatically on the next browser tool call"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call_id: &str, _args: Value) -> ToolResult {
        let message = if self.session.close().await {
            "Browser closed"
        } else {
            "Browser was not running"
        };
        ToolResult::success(call_id, self.name(), message)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use proto::error::BrowserError;
    use tokio::process::Child;

    use super::*;
    use crate::browser::{BrowserLauncher, BrowserSupervisor, SupervisorOptions};

    struct NoBrowser;

    impl BrowserLauncher for NoBrowser {
        fn locate(&self) -> Result<PathBuf, BrowserError> {
            Err(BrowserError::ExecutableNotFound {
                install_hint: "Install Chromium".to_string(),
            })
        }

        fn spawn(&self, _: &Path, _: &[String]) -> Result<Child, BrowserError> {
            Err(BrowserError::Spawn("unused".to_string()))
        }
    }

    fn session() -> Arc<BrowserSession> {
        let supervisor = Arc::new(BrowserSupervisor::new(
            Arc::new(NoBrowser),
            SupervisorOptions::new(std::env::temp_dir().join("agent-browse-profile")),
        ));
        Arc::new(BrowserSession::new(
            supervisor,
            std::env::temp_dir(),
            std::env::temp_dir(),
        ))
    }

    #[test]
    fn tool_metadata_is_stable() {
        let s = session();
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(NavigateTool::new(s.clone())),
            Box::new(ActTool::new(s.clone())),
            Box::new(ExtractTool::new(s.clone())),
            Box::new(ObserveTool::new(s.clone())),
            Box::new(ScreenshotTool::new(s.clone())),
            Box::new(BatchTool::new(s.clone())),
            Box::new(CloseTool::new(s)),
        ];
        let names: Vec<_> = tools.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "browser.navigate",
                "browser.act",
                "browser.extract",
                "browser.observe",
                "browser.screenshot",
                "browser.batch",
                "browser.close"
            ]
        );
        for tool in &tools {
            assert_eq!(tool.parameters_schema()["type"], "object");
            assert!(!tool.description().is_empty());
        }
    }

    #[tokio::test]
    async fn navigate_rejects_non_http_url() {
        let tool = NavigateTool::new(session());
        let result = tool
            .execute("call-1", json!({"url":"file:///etc/passwd"}))
            .await;
        assert_eq!(result.call_id, "call-1");
        assert!(result.is_error);
        assert!(result.output.contains("Only http/https URLs"));
    }

    #[tokio::test]
    async fn navigate_rejects_invalid_url() {
        let tool = NavigateTool::new(session());
        let result = tool.execute("call-2", json!({"url":"not a url"})).await;
        assert!(result.is_error);
        assert!(result.output.contains("Invalid URL"));
    }

    #[tokio::test]
    async fn act_rejects_unknown_action_before_touching_browser() {
        let s = session();
        let tool = ActTool::new(s.clone());
        let result = tool.execute("call-3", json!({"action":"juggle"})).await;
        assert!(result.is_error);
        assert!(result.output.contains("Supported actions"));
        assert_eq!(
            s.supervisor().state(),
            crate::browser::BrowserState::Unstarted
        );
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported() {
        let s = session();
        let extract = ExtractTool::new(s.clone())
            .execute("call-4", json!({"instruction": 7}))
            .await;
        assert!(extract.is_error);
        assert!(extract.output.contains("Invalid arguments"));

        let shot = ScreenshotTool::new(s)
            .execute("call-5", json!({"full_page": true}))
            .await;
        assert!(shot.is_error);
        assert!(shot.output.contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn missing_browser_surfaces_install_hint_as_tool_error() {
        let tool = ObserveTool::new(session());
        let result = tool.execute("call-6", json!({"query":"search"})).await;
        assert!(result.is_error);
        assert!(result.output.contains("Install Chromium"));
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure() {
        let tool = BatchTool::new(session());
        let result = tool
            .execute("call-7", json!({"steps":"dance; click #a"}))
            .await;
        assert!(result.is_error);
        let report: Value = serde_json::from_str(&result.output).expect("json report");
        assert_eq!(report["total"], 2);
        assert_eq!(report["completed"], 0);
        assert_eq!(report["steps"].as_array().map(Vec::len), Some(1));
        assert_eq!(report["steps"][0]["ok"], false);
    }

    #[tokio::test]
    async fn batch_requires_steps() {
        let tool = BatchTool::new(session());
        let result = tool.execute("call-8", json!({"steps":" ; "})).await;
        assert!(result.is_error);
        assert_eq!(result.output, "No steps given");
    }

    #[tokio::test]
    async fn close_without_browser_is_not_an_error() {
        let tool = CloseTool::new(session());
        let result = tool.execute("call-9", json!({})).await;
        assert!(!result.is_error);
        assert_eq!(result.output, "Browser was not running");
    }

    #[test]
    fn operation_timeout_clamps_values() {
        assert_eq!(
            operation_timeout(None, DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
        assert_eq!(operation_timeout(Some(0), 30), Duration::from_secs(1));
        assert_eq!(
            operation_timeout(Some(MAX_TIMEOUT_SECS + 100), 30),
            Duration::from_secs(MAX_TIMEOUT_SECS)
        );
    }
}
