//! Render a side-by-side comparison as a markdown table.

use agentloop_core::error::ToolError;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::{Tool, ToolCategory, ToolResult};
use async_trait::async_trait;

pub struct ComparisonTableTool;

#[async_trait]
impl Tool for ComparisonTableTool {
    fn name(&self) -> &str {
        "comparison_table"
    }

    fn description(&self) -> &str {
        "Show the user a comparison table. Each row must have one cell per column."
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
                "title": { "type": "string" },
                "columns": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "rows": {
                    "type": "array",
                    "items": { "type": "array" }
                }
            },
            "required": ["columns", "rows"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let columns: Vec<String> = arguments["columns"]
            .as_array()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidArguments("'columns' must be a non-empty array".into())
            })?
            .iter()
            .map(cell)
            .collect();

        let rows = arguments["rows"]
            .as_array()
            .ok_or_else(|| ToolError::InvalidArguments("'rows' must be an array".into()))?;

        let mut table = String::new();
        if let Some(title) = arguments["title"].as_str() {
            table.push_str(&format!("**{title}**\n\n"));
        }
        table.push_str(&format!("| {} |\n", columns.join(" | ")));
        table.push_str(&format!("|{}\n", "---|".repeat(columns.len())));

        for (i, row) in rows.iter().enumerate() {
            let cells = row.as_array().ok_or_else(|| {
                ToolError::InvalidArguments(format!("row {i} must be an array"))
            })?;
            if cells.len() != columns.len() {
                return Err(ToolError::InvalidArguments(format!(
                    "row {i} has {} cells, expected {}",
                    cells.len(),
                    columns.len()
                )));
            }
            let cells: Vec<String> = cells.iter().map(cell).collect();
            table.push_str(&format!("| {} |\n", cells.join(" | ")));
        }

        Ok(ToolResult::ok(table.trim_end()).with_data(serde_json::json!({
            "columns": columns.len(),
            "rows": rows.len(),
        })))
    }
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.replace('|', "\\|"),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_markdown() {
        let result = ComparisonTableTool
            .execute(serde_json::json!({
                "title": "Laptops",
                "columns": ["Model", "Price"],
                "rows": [["A", 999], ["B", 1299]]
            }))
            .await
            .unwrap();
        assert_eq!(
            result.output,
            "**Laptops**\n\n| Model | Price |\n|---|---|\n| A | 999 |\n| B | 1299 |"
        );
    }

    #[tokio::test]
    async fn ragged_row_rejected() {
        let err = ComparisonTableTool
            .execute(serde_json::json!({
                "columns": ["Model", "Price"],
                "rows": [["A"]]
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("row 0"));
    }

    #[tokio::test]
    async fn pipes_are_escaped() {
        let result = ComparisonTableTool
            .execute(serde_json::json!({"columns": ["a|b"], "rows": []}))
            .await
            .unwrap();
        assert!(result.output.starts_with("| a\\|b |"));
    }
}
