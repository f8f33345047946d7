//! Action requests, fingerprints, and the records kept for each action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::ToolError;
use crate::permission::PermissionLevel;
use crate::tool::ToolResult;

/// A single tool invocation proposed by the model within one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Name of the tool to invoke
    pub tool_name: String,

    /// Normalized arguments
    pub arguments: serde_json::Map<String, serde_json::Value>,

    /// The block of model text this request was parsed from
    pub raw_source_text: String,
}

impl ActionRequest {
    pub fn new(
        tool_name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            raw_source_text: String::new(),
        }
    }

    pub fn with_source(mut self, raw: impl Into<String>) -> Self {
        self.raw_source_text = raw.into();
        self
    }

    /// Arguments as a JSON object value.
    pub fn arguments_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.arguments.clone())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.tool_name, &self.arguments)
    }
}

/// A normalized, order-independent key identifying an action.
///
/// SHA-256 over the tool name and the canonical JSON encoding of the
/// arguments (object keys sorted at every depth).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(tool_name: &str, arguments: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut canonical = String::new();
        write_canonical_object(arguments, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(tool_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical JSON: sorted object keys, no insignificant whitespace.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => write_canonical_object(map, out),
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single canonical serialization.
        other => out.push_str(&other.to_string()),
    }
}

fn write_canonical_object(map: &serde_json::Map<String, serde_json::Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&serde_json::Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key], out);
    }
    out.push('}');
}

/// Why an action was not executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// An identical, repeat-unsafe action already executed in this session.
    Identical { fingerprint: Fingerprint },
    /// An identical action is still pending.
    InFlight { fingerprint: Fingerprint },
    /// The active permission level does not expose the tool. `required` is
    /// the lowest level that would, if any does.
    PermissionDenied {
        active: PermissionLevel,
        required: Option<PermissionLevel>,
    },
    /// The session was cancelled before the action ran.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identical { .. } => f.write_str("identical action already executed"),
            Self::InFlight { .. } => f.write_str("identical action already in flight"),
            Self::PermissionDenied {
                active,
                required: Some(required),
            } => write!(f, "requires {required} permission, session is {active}"),
            Self::PermissionDenied {
                active,
                required: None,
            } => write!(f, "not available at any permission level, session is {active}"),
            Self::Cancelled => f.write_str("session cancelled"),
        }
    }
}

/// Classification of a failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    InvalidArguments,
    /// Transient failures that exhausted the retry budget.
    Transient,
    Timeout,
    Permanent,
}

/// A recorded action failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ActionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&ToolError> for ActionFailure {
    fn from(err: &ToolError) -> Self {
        let kind = match err {
            ToolError::InvalidArguments(_) => FailureKind::InvalidArguments,
            ToolError::Transient { .. } => FailureKind::Transient,
            ToolError::Timeout { .. } => FailureKind::Timeout,
            ToolError::Permanent { .. } | ToolError::SandboxViolation(_) => FailureKind::Permanent,
        };
        Self::new(kind, err.to_string())
    }
}

/// Lifecycle of an action within a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Executed { result: ToolResult },
    Skipped { reason: SkipReason },
    Failed { error: ActionFailure },
}

impl ActionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed { .. } => "executed",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// The audit record of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub request: ActionRequest,
    pub fingerprint: Fingerprint,
    pub status: ActionStatus,
    /// Tool invocations made (0 when never invoked).
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
    pub step_index: usize,
}

impl ActionRecord {
    /// A fresh record awaiting execution.
    pub fn pending(request: ActionRequest, step_index: usize, timestamp: DateTime<Utc>) -> Self {
        let fingerprint = request.fingerprint();
        Self {
            request,
            fingerprint,
            status: ActionStatus::Pending,
            attempts: 0,
            timestamp,
            step_index,
        }
    }

    /// A record that was never executed.
    pub fn skipped(
        request: ActionRequest,
        reason: SkipReason,
        step_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::pending(request, step_index, timestamp);
        record.status = ActionStatus::Skipped { reason };
        record
    }

    /// A record that failed before or during execution.
    pub fn failed(
        request: ActionRequest,
        error: ActionFailure,
        step_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::pending(request, step_index, timestamp);
        record.status = ActionStatus::Failed { error };
        record
    }

    pub fn tool_name(&self) -> &str {
        &self.request.tool_name
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ActionStatus::Pending)
    }

    pub fn is_executed(&self) -> bool {
        matches!(self.status, ActionStatus::Executed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, ActionStatus::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ActionStatus::Failed { .. })
    }

    /// Whether the tool collaborator was actually reached.
    pub fn was_attempted(&self) -> bool {
        self.attempts > 0
    }
}

/// A malformed structured block in a model turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("action block {block_index} could not be parsed: {reason}")]
pub struct ParseError {
    /// Zero-based position among the action blocks of the response.
    pub block_index: usize,
    pub reason: String,
    /// The offending block text, truncated.
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn fingerprint_is_key_order_independent() {
        let a: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"query": "rust", "limit": 3, "opts": {"b": 1, "a": 2}}"#)
                .unwrap();
        let b: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"opts": {"a": 2, "b": 1}, "limit": 3, "query": "rust"}"#)
                .unwrap();
        assert_eq!(Fingerprint::of("browser", &a), Fingerprint::of("browser", &b));
    }

    #[test]
    fn fingerprint_distinguishes_tool_and_values() {
        let a = args(json!({"query": "rust"}));
        let b = args(json!({"query": "Rust"}));
        assert_ne!(Fingerprint::of("browser", &a), Fingerprint::of("browser", &b));
        assert_ne!(Fingerprint::of("browser", &a), Fingerprint::of("think", &a));
    }

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let a = args(json!({"query": "rust"}));
        let fp = Fingerprint::of("browser", &a);
        assert_eq!(fp, Fingerprint::of("browser", &a));
        assert_eq!(fp.as_str().len(), 64);
        assert_eq!(fp.short().len(), 12);
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({"b": [{"y": 1, "x": 2}], "a": null});
        assert_eq!(canonical_json(&value), r#"{"a":null,"b":[{"x":2,"y":1}]}"#);
    }

    #[test]
    fn failure_kind_from_tool_error() {
        let f = ActionFailure::from(&ToolError::SandboxViolation("../etc".into()));
        assert_eq!(f.kind, FailureKind::Permanent);
        let f = ActionFailure::from(&ToolError::Timeout {
            tool_name: "browser".into(),
            timeout_ms: 5,
        });
        assert_eq!(f.kind, FailureKind::Timeout);
    }

    #[test]
    fn record_constructors_set_status() {
        let req = ActionRequest::new("browser", args(json!({"query": "rust"})));
        let now = Utc::now();
        let pending = ActionRecord::pending(req.clone(), 0, now);
        assert!(pending.is_pending());
        assert!(!pending.was_attempted());
        assert_eq!(pending.fingerprint, req.fingerprint());

        let skipped = ActionRecord::skipped(req.clone(), SkipReason::Cancelled, 0, now);
        assert!(skipped.is_skipped());
        assert_eq!(skipped.status.label(), "skipped");
    }

    #[test]
    fn status_serializes_with_tag() {
        let status = ActionStatus::Skipped {
            reason: SkipReason::PermissionDenied {
                active: PermissionLevel::Chatty,
                required: Some(PermissionLevel::Autonomous),
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"]["kind"], "permission_denied");
    }
}
