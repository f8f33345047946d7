//! Domain events published by the executor.
//!
//! Subscribers (a CLI progress printer, an audit sink, tests) observe the
//! loop without being wired into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::action::SkipReason;
use crate::permission::PermissionLevel;
use crate::session::SessionStatus;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A step was appended to a session's history
    StepRecorded {
        session_id: String,
        step_index: usize,
        permission_level: PermissionLevel,
        actions: usize,
        digest: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        session_id: String,
        tool_name: String,
        success: bool,
        attempts: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An action was not executed
    ActionSkipped {
        session_id: String,
        tool_name: String,
        reason: SkipReason,
        timestamp: DateTime<Utc>,
    },

    /// The permission gate refused an action
    ActionRejected {
        session_id: String,
        tool_name: String,
        level: PermissionLevel,
        timestamp: DateTime<Utc>,
    },

    /// The session reached a terminal state
    SessionTerminated {
        session_id: String,
        status: SessionStatus,
        steps: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
