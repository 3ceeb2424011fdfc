//! File tools. Relative paths resolve against the working root.
//!
//! Write confinement is not enforced here; the conversation loop gates
//! `file.write` and `file.edit` before they reach these tools.

use std::path::Path;

use async_trait::async_trait;
use proto::ToolResult;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::Tool;
use crate::workspace::WorkspaceLayout;

const DEFAULT_READ_LIMIT: usize = 2_000;

fn invalid(call_id: &str, tool: &str, e: serde_json::Error) -> ToolResult {
    ToolResult::error(call_id, tool, format!("Invalid arguments: {e}"))
}

/// `file.read`
pub struct ReadFileTool {
    layout: WorkspaceLayout,
}

#[derive(Debug, Deserialize)]
struct ReadArgs {
    file_path: String,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl ReadFileTool {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "file.read"
    }

    fn description(&self) -> &str {
        "Read a text file. Output lines are numbered; use offset/limit for large files"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path to read, relative to the working directory or absolute" },
                "offset": { "type": "integer", "description": "First line to return (1-indexed, default: 1)" },
                "limit": { "type": "integer", "description": "Maximum number of lines (default: 2000)" }
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: ReadArgs = match serde_json::from_value(args) {
            Ok(v) => v,
            Err(e) => return invalid(call_id, self.name(), e),
        };
        let path = self.layout.resolve(&parsed.file_path);
        debug!(path = %path.display(), "Reading file");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                return ToolResult::error(
                    call_id,
                    self.name(),
                    format!("Failed to read '{}': {e}", path.display()),
                );
            }
        };

        let start = parsed.offset.unwrap_or(1).max(1);
        let limit = parsed.limit.unwrap_or(DEFAULT_READ_LIMIT);
        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .skip(start - 1)
            .take(limit)
            .map(|(i, line)| format!("{:>6}\t{line}", i + 1))
            .collect();

        if numbered.is_empty() {
            return ToolResult::success(call_id, self.name(), "(empty or beyond end of file)");
        }
        ToolResult::success(call_id, self.name(), numbered.join("\n"))
    }
}

/// `file.write`
pub struct WriteFileTool {
    layout: WorkspaceLayout,
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    file_path: String,
    content: String,
}

impl WriteFileTool {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "file.write"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file, creating parent directories. Script files (.js, .ts) must go in the custom_scripts directory"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Destination path" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["file_path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: WriteArgs = match serde_json::from_value(args) {
            Ok(v) => v,
            Err(e) => return invalid(call_id, self.name(), e),
        };
        let path = self.layout.resolve(&parsed.file_path);
        debug!(path = %path.display(), bytes = parsed.content.len(), "Writing file");

        match write_with_parents(&path, &parsed.content).await {
            Ok(()) => ToolResult::success(
                call_id,
                self.name(),
                format!("Wrote {} bytes to {}", parsed.content.len(), path.display()),
            ),
            Err(e) => ToolResult::error(
                call_id,
                self.name(),
                format!("Failed to write '{}': {e}", path.display()),
            ),
        }
    }
}

/// `file.edit`
pub struct EditFileTool {
    layout: WorkspaceLayout,
}

#[derive(Debug, Deserialize)]
struct EditArgs {
    file_path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

impl EditFileTool {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "file.edit"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file. old_string must be unique unless replace_all is true"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "File to edit" },
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" },
                "replace_all": { "type": "boolean", "description": "Replace every occurrence (default: false)" }
            },
            "required": ["file_path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call_id: &str, args: Value) -> ToolResult {
        let parsed: EditArgs = match serde_json::from_value(args) {
            Ok(v) => v,
            Err(e) => return invalid(call_id, self.name(), e),
        };
        if parsed.old_string.is_empty() {
            return ToolResult::error(call_id, self.name(), "old_string must not be empty");
        }
        let path = self.layout.resolve(&parsed.file_path);
        debug!(path = %path.display(), replace_all = parsed.replace_all, "Editing file");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                return ToolResult::error(
                    call_id,
                    self.name(),
                    format!("Failed to read '{}': {e}", path.display()),
                );
            }
        };

        let count = content.matches(parsed.old_string.as_str()).count();
        if count == 0 {
            return ToolResult::error(call_id, self.name(), "old_string not found in file");
        }
        if count > 1 && !parsed.replace_all {
            return ToolResult::error(
                call_id,
                self.name(),
                format!(
                    "old_string occurs {count} times; make it unique or set replace_all to true"
                ),
            );
        }

        let updated = if parsed.replace_all {
            content.replace(&parsed.old_string, &parsed.new_string)
        } else {
            content.replacen(&parsed.old_string, &parsed.new_string, 1)
        };
        if let Err(e) = tokio::fs::write(&path, updated).await {
            return ToolResult::error(
                call_id,
                self.name(),
                format!("Failed to write '{}': {e}", path.display()),
            );
        }
        let replaced = if parsed.replace_all { count } else { 1 };
        ToolResult::success(
            call_id,
            self.name(),
            format!("Replaced {replaced} occurrence(s) in {}", path.display()),
        )
    }
}

async fn write_with_parents(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}
