//! Tool trait and the tools available to the browsing agent.
//!
//! Also home to the pieces those tools stand on: the workspace directory
//! layout, the readiness polling helper, and the browser process
//! supervisor.

pub mod browser;
pub mod fs;
pub mod poll;
pub mod workspace;

pub use browser::{BrowserSession, BrowserState, BrowserSupervisor, ChromeLauncher, SupervisorOptions};
pub use fs::{EditFileTool, ReadFileTool, WriteFileTool};
pub use poll::{PollTimeout, Probe, poll_until_ready};
pub use workspace::WorkspaceLayout;

use std::sync::Arc;

use async_trait::async_trait;
use proto::ToolResult;

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name exposed to the LLM.
    fn name(&self) -> &str;
    /// Human-readable description for tool selection.
    fn description(&self) -> &str;
    /// JSON schema for accepted tool arguments.
    fn parameters_schema(&self) -> serde_json::Value;
    /// Executes the tool with the given call id and JSON args.
    async fn execute(&self, call_id: &str, args: serde_json::Value) -> ToolResult;
}

/// The full catalogue registered at session start.
pub fn default_tools(layout: &WorkspaceLayout, session: Arc<BrowserSession>) -> Vec<Arc<dyn Tool>> {
    let mut tools = browser::browser_tools(session);
    tools.push(Arc::new(ReadFileTool::new(layout.clone())));
    tools.push(Arc::new(WriteFileTool::new(layout.clone())));
    tools.push(Arc::new(EditFileTool::new(layout.clone())));
    tools
}
