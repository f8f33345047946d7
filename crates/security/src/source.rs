//! Where a session's permission level comes from.
//!
//! The executor reads the level at the start of every step and never
//! derives or changes it. The user changes it through a
//! [`PermissionHandle`]; the new level takes effect from the next step.

use agentloop_core::permission::PermissionLevel;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};

/// Yields the permission level currently in force.
pub trait PermissionSource: Send + Sync {
    fn current_level(&self) -> PermissionLevel;
}

/// A fixed level.
impl PermissionSource for PermissionLevel {
    fn current_level(&self) -> PermissionLevel {
        *self
    }
}

/// A shared, user-settable level.
#[derive(Debug, Clone)]
pub struct PermissionHandle {
    level: Arc<RwLock<PermissionLevel>>,
    audit: Option<Arc<AuditLogger>>,
}

impl PermissionHandle {
    pub fn new(level: PermissionLevel) -> Self {
        Self {
            level: Arc::new(RwLock::new(level)),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Switch levels, returning the previous one.
    pub fn set(&self, level: PermissionLevel) -> PermissionLevel {
        let previous = {
            let mut guard = self.level.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, level)
        };
        if previous != level {
            info!(from = %previous, to = %level, "Permission level changed");
            if let Some(audit) = &self.audit {
                audit.log(
                    AuditEvent::PermissionChanged {
                        from: previous.to_string(),
                        to: level.to_string(),
                    },
                    "user",
                    "session",
                    AuditOutcome::Success,
                    None,
                );
            }
        }
        previous
    }

    pub fn get(&self) -> PermissionLevel {
        *self.level.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PermissionSource for PermissionHandle {
    fn current_level(&self) -> PermissionLevel {
        self.get()
    }
}
