//! Audit logging: structured records of security-relevant decisions.
//!
//! Every permission denial, suppressed duplicate, tool execution, and
//! permission change is recorded here in addition to the step history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    /// Session (or other principal) the decision was made for
    pub actor: String,
    pub target: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A tool was invoked
    ToolExecution { tool_name: String },
    /// The permission gate refused a tool
    PermissionDenied { tool_name: String, level: String },
    /// A repeat of an executed or pending action was not run
    DuplicateSuppressed {
        tool_name: String,
        fingerprint: String,
    },
    /// The session's permission level was changed
    PermissionChanged { from: String, to: String },
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
    Skipped,
}

/// Trait for audit log sinks (where events are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Audit logger that keeps entries in memory and forwards them to sinks.
pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuditLogger({} entries, {} sinks)", self.count(), self.sinks.len())
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks: Vec::new(),
        }
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// A logger forwarding to `tracing`.
    pub fn tracing() -> Self {
        Self::with_sinks(vec![Box::new(TracingSink)])
    }

    // A panic while holding the lock leaves the Vec intact, so keep using it.
    fn lock(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        actor: &str,
        target: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            target: target.into(),
            outcome,
            details,
        };

        self.lock().push(entry.clone());

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    /// Entries recorded for one session.
    pub fn entries_for(&self, actor: &str) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| e.actor == actor)
            .cloned()
            .collect()
    }

    /// Get entries with the given outcome.
    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| &e.outcome == outcome)
            .cloned()
            .collect()
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            actor = %entry.actor,
            target = %entry.target,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn execution(logger: &AuditLogger, session: &str, tool: &str) {
        logger.log(
            AuditEvent::ToolExecution {
                tool_name: tool.into(),
            },
            session,
            tool,
            AuditOutcome::Success,
            None,
        );
    }

    fn denial(logger: &AuditLogger, session: &str, tool: &str) {
        logger.log(
            AuditEvent::PermissionDenied {
                tool_name: tool.into(),
                level: "chatty".into(),
            },
            session,
            tool,
            AuditOutcome::Denied,
            Some(format!("{tool} requires autonomous")),
        );
    }

    #[test]
    fn entries_keep_insertion_order() {
        let logger = AuditLogger::new();
        execution(&logger, "a", "browser");
        denial(&logger, "a", "file_write");
        execution(&logger, "a", "think");

        let targets: Vec<String> = logger.entries().into_iter().map(|e| e.target).collect();
        assert_eq!(targets, ["browser", "file_write", "think"]);
        assert_eq!(
            logger.entries()[1].details.as_deref(),
            Some("file_write requires autonomous")
        );
    }

    #[test]
    fn sessions_and_outcomes_filter_independently() {
        let logger = AuditLogger::new();
        denial(&logger, "a", "file_write");
        execution(&logger, "b", "browser");
        denial(&logger, "b", "shell");
        logger.log(
            AuditEvent::DuplicateSuppressed {
                tool_name: "browser".into(),
                fingerprint: "9f2c".into(),
            },
            "b",
            "browser",
            AuditOutcome::Skipped,
            None,
        );

        assert_eq!(logger.entries_for("a").len(), 1);
        assert_eq!(logger.entries_for("b").len(), 3);
        assert_eq!(logger.entries_by_outcome(&AuditOutcome::Denied).len(), 2);
        assert_eq!(logger.entries_by_outcome(&AuditOutcome::Failure).len(), 0);
    }

    #[test]
    fn permission_change_wire_shape() {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event: AuditEvent::PermissionChanged {
                from: "chatty".into(),
                to: "autonomous".into(),
            },
            actor: "a".into(),
            target: "session".into(),
            outcome: AuditOutcome::Success,
            details: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "permission_changed");
        assert_eq!(json["event"]["from"], "chatty");
        assert_eq!(json["outcome"], "success");
    }

    struct Collect(Arc<Mutex<Vec<AuditOutcome>>>);

    impl AuditSink for Collect {
        fn record(&self, entry: &AuditEntry) {
            self.0.lock().unwrap().push(entry.outcome.clone());
        }
    }

    #[test]
    fn sinks_see_entries_as_they_are_logged() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let logger = AuditLogger::with_sinks(vec![
            Box::new(Collect(seen.clone())),
            Box::new(TracingSink),
        ]);
        denial(&logger, "a", "file_write");
        execution(&logger, "a", "browser");

        assert_eq!(
            *seen.lock().unwrap(),
            [AuditOutcome::Denied, AuditOutcome::Success]
        );
        assert_eq!(format!("{logger:?}"), "AuditLogger(2 entries, 2 sinks)");
    }
}
