//! Workspace file writer. The only built-in tool with side effects.

use agentloop_core::error::ToolError;
use tokio::io::AsyncWriteExt;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::{Tool, ToolCategory, ToolResult};
use async_trait::async_trait;

use crate::workspace::Workspace;

pub struct FileWriteTool {
    workspace: Workspace,
}

impl FileWriteTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Save text to a workspace file, replacing it unless `append` is set"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::File
    }

    fn required_permission(&self) -> PermissionLevel {
        PermissionLevel::Autonomous
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the workspace"
                },
                "content": {
                    "type": "string"
                },
                "append": {
                    "type": "boolean",
                    "description": "Add to the end of an existing file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let (Some(path), Some(content)) = (arguments["path"].as_str(), arguments["content"].as_str())
        else {
            return Err(ToolError::InvalidArguments(
                "file_write needs string 'path' and 'content'".into(),
            ));
        };
        let append = arguments["append"].as_bool().unwrap_or(false);
        let target = self.workspace.resolve(self.name(), path)?;

        let failed = |reason: std::io::Error| ToolError::Permanent {
            tool_name: "file_write".into(),
            reason: format!("{path}: {reason}"),
        };

        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(failed)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&target)
            .await
            .map_err(failed)?;
        file.write_all(content.as_bytes()).await.map_err(failed)?;
        file.flush().await.map_err(failed)?;

        let verb = if append { "Appended" } else { "Wrote" };
        Ok(ToolResult::ok(format!("{verb} {} bytes to {path}", content.len())).with_data(
            serde_json::json!({ "path": path, "bytes": content.len(), "append": append }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn writer() -> (tempfile::TempDir, FileWriteTool) {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(Workspace::new(dir.path()));
        (dir, tool)
    }

    #[tokio::test]
    async fn overwrite_then_append() {
        let (dir, tool) = writer();
        tool.execute(json!({"path": "notes/editors.md", "content": "stale"}))
            .await
            .unwrap();
        tool.execute(json!({"path": "notes/editors.md", "content": "| Editor |\n"}))
            .await
            .unwrap();
        let result = tool
            .execute(json!({"path": "notes/editors.md", "content": "| Helix |\n", "append": true}))
            .await
            .unwrap();

        assert_eq!(result.output, "Appended 10 bytes to notes/editors.md");
        assert_eq!(result.data.unwrap()["bytes"], 10);
        let saved = std::fs::read_to_string(dir.path().join("notes/editors.md")).unwrap();
        assert_eq!(saved, "| Editor |\n| Helix |\n");
    }

    #[tokio::test]
    async fn paths_outside_the_workspace_are_refused() {
        let (dir, tool) = writer();
        let err = tool
            .execute(json!({"path": "../outside.txt", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation(_)));
        assert!(!dir.path().parent().unwrap().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn non_string_content_is_rejected() {
        let (_dir, tool) = writer();
        let err = tool
            .execute(json!({"path": "a.txt", "content": 42}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn io_errors_are_permanent() {
        let (dir, tool) = writer();
        std::fs::create_dir(dir.path().join("taken")).unwrap();
        let err = tool
            .execute(json!({"path": "taken", "content": "x"}))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("taken"));
    }

    #[test]
    fn gated_at_autonomous_and_never_idempotent() {
        let (_dir, tool) = writer();
        assert_eq!(tool.required_permission(), PermissionLevel::Autonomous);
        assert!(!tool.idempotent());
    }
}
