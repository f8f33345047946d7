//! Present a numbered list of choices to the user.

use agentloop_core::error::ToolError;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::{Tool, ToolCategory, ToolResult};
use async_trait::async_trait;

pub struct ShowOptionsTool;

#[async_trait]
impl Tool for ShowOptionsTool {
    fn name(&self) -> &str {
        "show_options"
    }

    fn description(&self) -> &str {
        "Show the user a short list of options to pick from."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Ui
    }

    fn required_permission(&self) -> PermissionLevel {
        PermissionLevel::Chatty
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Question shown above the options"
                },
                "options": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Between 2 and 10 choices"
                }
            },
            "required": ["prompt", "options"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let prompt = arguments["prompt"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'prompt' argument".into()))?;

        let options: Vec<&str> = arguments["options"]
            .as_array()
            .ok_or_else(|| ToolError::InvalidArguments("'options' must be an array".into()))?
            .iter()
            .map(|v| {
                v.as_str().ok_or_else(|| {
                    ToolError::InvalidArguments("every option must be a string".into())
                })
            })
            .collect::<Result<_, _>>()?;

        if !(2..=10).contains(&options.len()) {
            return Err(ToolError::InvalidArguments(format!(
                "expected 2 to 10 options, got {}",
                options.len()
            )));
        }

        let mut output = format!("{prompt}\n");
        for (i, option) in options.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, option));
        }

        Ok(ToolResult::ok(output.trim_end()).with_data(serde_json::json!({
            "prompt": prompt,
            "options": options,
        })))
    }
}
