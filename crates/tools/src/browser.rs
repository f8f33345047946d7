//! Browser tool: simple web lookup returning deterministic offline results.
//!
//! The engine treats the browser as an external collaborator; this
//! implementation returns plausible canned results so sessions can be
//! replayed end-to-end without network access.

use agentloop_core::error::ToolError;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::{Tool, ToolCategory, ToolResult};
use async_trait::async_trait;
use serde::Serialize;

pub struct BrowserTool;

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Search the web. Returns a list of relevant results with titles, URLs, and snippets."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Web
    }

    fn required_permission(&self) -> PermissionLevel {
        PermissionLevel::Chatty
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 3, max 5)",
                    "default": 3
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let num_results = arguments["num_results"].as_u64().unwrap_or(3).clamp(1, 5) as usize;

        let results = lookup(query, num_results);
        let data = serde_json::to_value(&results)
            .map_err(|e| ToolError::Permanent {
                tool_name: "browser".into(),
                reason: e.to_string(),
            })?;
        let output = render(&results);

        Ok(ToolResult::ok(output).with_data(data))
    }
}

#[derive(Debug, Clone, Serialize)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

fn result(title: &str, url: &str, snippet: &str) -> SearchResult {
    SearchResult {
        title: title.into(),
        url: url.into(),
        snippet: snippet.into(),
    }
}

fn lookup(query: &str, count: usize) -> Vec<SearchResult> {
    let q = query.to_lowercase();

    let topics: [(&str, Vec<SearchResult>); 2] = [
        (
            "rust",
            vec![
                result(
                    "The Rust Programming Language",
                    "https://doc.rust-lang.org/book/",
                    "Rust is a systems programming language focused on safety, speed, and concurrency.",
                ),
                result(
                    "Rust by Example",
                    "https://doc.rust-lang.org/rust-by-example/",
                    "A collection of runnable examples that illustrate Rust concepts.",
                ),
                result(
                    "crates.io",
                    "https://crates.io/",
                    "The Rust community's package registry.",
                ),
            ],
        ),
        (
            "laptop",
            vec![
                result(
                    "Best laptops of the year",
                    "https://example.com/reviews/laptops",
                    "Hands-on reviews comparing battery life, weight, and price.",
                ),
                result(
                    "Laptop buying guide",
                    "https://example.com/guides/laptops",
                    "What to look for in a CPU, display, and keyboard.",
                ),
            ],
        ),
    ];

    for (keyword, results) in &topics {
        if q.contains(keyword) {
            return results.iter().take(count).cloned().collect();
        }
    }

    (0..count)
        .map(|i| SearchResult {
            title: format!("Result {} for: {}", i + 1, query),
            url: format!("https://example.com/search?q={}&p={}", query.replace(' ', "+"), i + 1),
            snippet: format!("Offline result for '{query}'."),
        })
        .collect()
}

fn render(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {} <{}>\n   {}", i + 1, r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_returns_results() {
        let result = BrowserTool
            .execute(serde_json::json!({"query": "rust programming"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("Rust"));
        assert_eq!(result.data.unwrap().as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn respects_num_results() {
        let result = BrowserTool
            .execute(serde_json::json!({"query": "anything", "num_results": 2}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn same_query_same_output() {
        let args = serde_json::json!({"query": "laptop"});
        let a = BrowserTool.execute(args.clone()).await.unwrap();
        let b = BrowserTool.execute(args).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn blank_query_is_invalid() {
        let err = BrowserTool
            .execute(serde_json::json!({"query": "   "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn not_idempotent() {
        assert!(!BrowserTool.idempotent());
        assert_eq!(BrowserTool.category(), ToolCategory::Web);
    }
}
