//! File read tool: read a file inside the workspace.

use agentloop_core::error::ToolError;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::{Tool, ToolCategory, ToolResult};
use async_trait::async_trait;

use crate::workspace::Workspace;

/// Files larger than this are truncated in the output.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

pub struct FileReadTool {
    workspace: Workspace,
}

impl FileReadTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::File
    }

    fn required_permission(&self) -> PermissionLevel {
        PermissionLevel::Assisted
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = self.workspace.resolve(self.name(), path)?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(mut content) => {
                let bytes = content.len();
                if bytes > MAX_OUTPUT_BYTES {
                    let mut cut = MAX_OUTPUT_BYTES;
                    while !content.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    content.truncate(cut);
                    content.push_str("\n[truncated]");
                }
                Ok(ToolResult::ok(content).with_data(serde_json::json!({ "bytes": bytes })))
            }
            Err(e) => Ok(ToolResult {
                success: false,
                output: format!("Failed to read file: {e}"),
                data: None,
            }),
        }
    }
}
