//! Local browser automation over the Chrome DevTools Protocol.
//!
//! [`BrowserSupervisor`] owns the browser process, [`BrowserSession`] owns
//! the DevTools connection, and the tools in [`tools`] expose page
//! operations to the agent.

pub mod actions;
pub mod dom;
pub mod launcher;
pub mod screenshot;
pub mod session;
pub mod supervisor;
pub mod tools;

use std::sync::Arc;

pub use launcher::{BrowserLauncher, ChromeLauncher, install_hint, launch_args};
pub use session::BrowserSession;
pub use supervisor::{BrowserEndpoint, BrowserState, BrowserSupervisor, SupervisorOptions};
pub use tools::{
    ActTool, BatchTool, CloseTool, ExtractTool, NavigateTool, ObserveTool, ScreenshotTool,
};

use crate::Tool;

/// Every browser tool, sharing one session.
pub fn browser_tools(session: Arc<BrowserSession>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(NavigateTool::new(session.clone())),
        Arc::new(ActTool::new(session.clone())),
        Arc::new(ExtractTool::new(session.clone())),
        Arc::new(ObserveTool::new(session.clone())),
        Arc::new(ScreenshotTool::new(session.clone())),
        Arc::new(BatchTool::new(session.clone())),
        Arc::new(CloseTool::new(session)),
    ]
}
