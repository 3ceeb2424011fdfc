//! Tool registry used by the conversation loop to list and execute tools.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use proto::{ToolDefinition, ToolResult};
use tools::Tool;
use tracing::{debug, error};

/// Registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Creates a registry holding every tool in `tools`.
    pub fn with_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.register_arc(tool);
        }
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        debug!("Registering tool: {name}");
        self.tools.insert(name, tool);
    }

    /// Tool definitions for the LLM, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters_schema()))
            .collect()
    }

    /// Execute a tool call.
    ///
    /// Never fails: unknown tools and panicking tools become error results.
    pub async fn execute(&self, call_id: &str, name: &str, args: serde_json::Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(call_id, name, format!("Tool '{name}' not found"));
        };
        debug!("Executing tool: {name} (call_id: {call_id})");
        match AssertUnwindSafe(tool.execute(call_id, args))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(tool = name, call_id, "Tool panicked");
                ToolResult::error(call_id, name, format!("Tool '{name}' crashed"))
            }
        }
    }

    /// Returns the list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
