//! Think tool: lets the model reason out loud without side effects.

use agentloop_core::error::ToolError;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::{Tool, ToolCategory, ToolResult};
use async_trait::async_trait;

pub struct ThinkTool;

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Write down intermediate reasoning. Has no effect outside the conversation; use it to plan before acting."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Reasoning
    }

    fn required_permission(&self) -> PermissionLevel {
        PermissionLevel::Chatty
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "The reasoning to record"
                }
            },
            "required": ["thought"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let thought = arguments["thought"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'thought' argument".into()))?;

        Ok(ToolResult::ok("Thought recorded.")
            .with_data(serde_json::json!({ "chars": thought.chars().count() })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_thought() {
        let result = ThinkTool
            .execute(serde_json::json!({"thought": "compare prices first"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["chars"], 20);
    }

    #[tokio::test]
    async fn missing_thought_is_invalid() {
        let err = ThinkTool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn is_safe_to_repeat() {
        assert!(ThinkTool.idempotent());
        assert_eq!(ThinkTool.required_permission(), PermissionLevel::Chatty);
    }
}
