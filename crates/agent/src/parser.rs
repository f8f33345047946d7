//! Extracts narration and action requests from a raw model turn.
//!
//! A turn is free text with zero or more action blocks embedded in it:
//!
//! ```text
//! Let me look that up.
//! <tool_call>{"name": "browser", "arguments": {"query": "rust"}}</tool_call>
//! ```
//!
//! `<toolcall>` and `<tool-call>` are accepted as aliases, as is a fenced
//! block opened with ```` ```tool_call ````. Each malformed block yields its
//! own [`ParseError`]; the rest of the turn is still parsed.

use agentloop_core::action::{ActionRequest, ParseError};
use agentloop_core::tool::ToolRegistry;
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Opening marker of an action block. Group 1 is the tag name for the
/// XML-style forms; the fenced form has no group.
static BLOCK_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(tool_call|toolcall|tool-call)>|```tool_call[ \t]*")
        .expect("block opener pattern is valid")
});

const SNIPPET_CHARS: usize = 120;

/// The structured view of one model turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// Free text outside action blocks, trimmed.
    pub narration: String,
    /// Well-formed actions, in the order they appeared.
    pub actions: Vec<ActionRequest>,
    /// One entry per malformed block.
    pub errors: Vec<ParseError>,
}

impl ParsedResponse {
    /// Plain narration with no attempted actions: the model is done.
    pub fn is_final_answer(&self) -> bool {
        self.actions.is_empty() && self.errors.is_empty() && !self.narration.is_empty()
    }

    /// Nothing usable came back: no actions, and either no narration or
    /// only broken blocks.
    pub fn is_unparseable(&self) -> bool {
        self.actions.is_empty() && (self.narration.is_empty() || !self.errors.is_empty())
    }
}

/// Turns raw model text into a [`ParsedResponse`].
///
/// With a registry attached, argument values are coerced to the types each
/// tool's schema declares before the request is fingerprinted.
#[derive(Clone, Default)]
pub struct ResponseParser {
    registry: Option<Arc<ToolRegistry>>,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    pub fn parse(&self, raw: &str) -> ParsedResponse {
        let mut narration: Vec<&str> = Vec::new();
        let mut parsed = ParsedResponse::default();
        let mut cursor = 0;
        let mut prose_start = 0;
        let mut block_index = 0;

        while let Some(open) = BLOCK_OPEN_RE.captures(&raw[cursor..]) {
            let Some(whole) = open.get(0) else { break };
            let (start, end) = (cursor + whole.start(), cursor + whole.end());
            let close = match open.get(1) {
                Some(tag) => format!("</{}>", tag.as_str().to_ascii_lowercase()),
                None => "```".to_string(),
            };
            let after = &raw[end..];

            let Some(close_at) = find_ignore_ascii_case(after, &close) else {
                if !opens_payload(after) {
                    // The tag is only mentioned in prose.
                    cursor = end;
                    continue;
                }
                narration.push(&raw[prose_start..start]);
                parsed.errors.push(ParseError {
                    block_index,
                    reason: format!("unterminated block, expected {close}"),
                    snippet: snippet(&raw[start..]),
                });
                prose_start = raw.len();
                break;
            };

            let body = &after[..close_at];
            if !opens_payload(after) && BLOCK_OPEN_RE.is_match(body) {
                // The closer belongs to a later block; this opener is prose.
                cursor = end;
                continue;
            }
            narration.push(&raw[prose_start..start]);
            match self.parse_block(body) {
                Ok(request) => parsed.actions.push(request.with_source(body.trim())),
                Err(reason) => parsed.errors.push(ParseError {
                    block_index,
                    reason,
                    snippet: snippet(body),
                }),
            }
            block_index += 1;
            cursor = end + close_at + close.len();
            prose_start = cursor;
        }
        narration.push(&raw[prose_start..]);

        parsed.narration = narration
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            actions = parsed.actions.len(),
            errors = parsed.errors.len(),
            narration_chars = parsed.narration.len(),
            "Parsed model response"
        );
        parsed
    }

    fn parse_block(&self, body: &str) -> Result<ActionRequest, String> {
        let body = strip_json_fence(body.trim());
        if body.is_empty() {
            return Err("empty action block".into());
        }

        let value: Value =
            serde_json::from_str(body).map_err(|e| format!("invalid JSON: {e}"))?;
        let Value::Object(mut object) = value else {
            return Err("expected a JSON object".into());
        };

        let name = object
            .remove("name")
            .or_else(|| object.remove("tool"))
            .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing tool name".to_string())?;

        let arguments = match object.remove("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            // Some models double-encode arguments as a JSON string.
            Some(Value::String(encoded)) => match serde_json::from_str(&encoded) {
                Ok(Value::Object(map)) => map,
                _ => return Err("arguments string is not a JSON object".into()),
            },
            Some(_) => return Err("arguments must be an object".into()),
        };

        let schema = self
            .registry
            .as_ref()
            .and_then(|r| r.get(&name))
            .map(|tool| tool.parameters_schema());

        Ok(ActionRequest::new(
            name,
            normalize_arguments(arguments, schema.as_ref()),
        ))
    }
}

impl std::fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseParser")
            .field("schema_aware", &self.registry.is_some())
            .finish()
    }
}

/// Trim every string and coerce top-level values to their declared types.
pub fn normalize_arguments(arguments: Map<String, Value>, schema: Option<&Value>) -> Map<String, Value> {
    let properties = schema.and_then(|s| s.get("properties"));
    arguments
        .into_iter()
        .map(|(key, value)| {
            let key = key.trim().to_string();
            let value = trim_strings(value);
            let declared = properties
                .and_then(|p| p.get(&key))
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str);
            let value = match declared {
                Some(ty) => coerce(value, ty),
                None => value,
            };
            (key, value)
        })
        .collect()
}

fn trim_strings(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(trim_strings).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, trim_strings(v))).collect())
        }
        other => other,
    }
}

/// Best-effort conversion to a JSON-schema primitive type. Values that do
/// not convert cleanly are left alone for the tool to reject.
fn coerce(value: Value, ty: &str) -> Value {
    match (ty, value) {
        ("integer", Value::String(s)) => match s.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(s),
        },
        ("integer", Value::Number(n)) => match n.as_f64() {
            Some(f) if n.as_i64().is_none() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => Value::Number(n),
        },
        ("number", Value::String(s)) => match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::from(f),
            _ => Value::String(s),
        },
        ("boolean", Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" => Value::Bool(true),
            "false" | "no" => Value::Bool(false),
            _ => Value::String(s),
        },
        ("string", Value::Number(n)) => Value::String(n.to_string()),
        ("string", Value::Bool(b)) => Value::String(b.to_string()),
        (_, other) => other,
    }
}

fn strip_json_fence(body: &str) -> &str {
    let Some(inner) = body.strip_prefix("```") else {
        return body;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Whether text after an unclosed opener looks like a cut-off payload
/// rather than prose that happens to name the tag.
fn opens_payload(after: &str) -> bool {
    let after = after.trim_start();
    after.is_empty() || after.starts_with('{') || after.starts_with("```")
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets intact.
    haystack.to_ascii_lowercase().find(needle)
}

fn snippet(text: &str) -> String {
    let text = text.trim();
    let mut out: String = text.chars().take(SNIPPET_CHARS).collect();
    if out.len() < text.len() {
        out.push('…');
    }
    out
}
