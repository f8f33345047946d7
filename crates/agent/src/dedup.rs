//! Suppresses repeats of actions the session has already performed.

use agentloop_core::action::{ActionRecord, ActionRequest, ActionStatus, Fingerprint};
use agentloop_core::session::Session;
use agentloop_core::tool::ToolRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What to do with a requested action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// An identical repeat-unsafe action already executed.
    SkipIdentical(Fingerprint),
    /// An identical action is still pending.
    SkipInFlight(Fingerprint),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Compares a request's fingerprint against the session's action history.
///
/// Tools the registry marks idempotent may repeat freely once executed;
/// everything else runs at most once per fingerprint per session.
pub struct ActionDeduplicator {
    registry: Arc<ToolRegistry>,
    checks: AtomicUsize,
}

impl ActionDeduplicator {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            checks: AtomicUsize::new(0),
        }
    }

    /// Decide `request` against the recorded steps of `session` plus the
    /// records already produced in the step being built.
    pub fn check(
        &self,
        session: &Session,
        in_progress: &[ActionRecord],
        request: &ActionRequest,
    ) -> Decision {
        self.checks.fetch_add(1, Ordering::Relaxed);

        let fingerprint = request.fingerprint();
        let history = || session.action_records().chain(in_progress.iter());
        let same = |r: &&ActionRecord| r.fingerprint == fingerprint;

        if history().filter(same).any(|r| r.is_pending()) {
            return Decision::SkipInFlight(fingerprint);
        }

        let executed_before = history()
            .filter(same)
            .any(|r| matches!(r.status, ActionStatus::Executed { .. }));
        if executed_before && !self.registry.is_idempotent(&request.tool_name) {
            return Decision::SkipIdentical(fingerprint);
        }

        Decision::Allow
    }

    /// How many times [`check`](Self::check) has been called.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ActionDeduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDeduplicator")
            .field("checks", &self.checks())
            .finish()
    }
}
