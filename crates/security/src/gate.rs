//! The permission gate.
//!
//! The single place that decides whether a permission level may invoke a
//! tool. Allowlists for every level are computed once from the registry at
//! construction and never change afterwards, so a gate can be shared by
//! any number of concurrent sessions.

use agentloop_core::action::ActionRequest;
use agentloop_core::error::RegistryError;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::{Allowlist, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};

/// Why the gate refused an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// No tool with this name is registered.
    UnknownTool,
    /// The tool exists but is not exposed at the active level. `required`
    /// is the lowest level that exposes it, if any.
    NotPermitted {
        active: PermissionLevel,
        required: Option<PermissionLevel>,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool => f.write_str("no such tool"),
            Self::NotPermitted {
                active,
                required: Some(required),
            } => write!(f, "requires {required} permission, session is {active}"),
            Self::NotPermitted {
                active,
                required: None,
            } => write!(f, "not available at any permission level, session is {active}"),
        }
    }
}

/// A refused action with its reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Index of the action in the batch given to [`PermissionGate::filter`].
    pub position: usize,
    pub request: ActionRequest,
    pub reason: RejectReason,
}

/// Result of filtering a batch of actions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOutcome {
    /// Permitted actions, in their original order.
    pub allowed: Vec<ActionRequest>,
    /// Refused actions, in their original order.
    pub rejected: Vec<Rejection>,
}

impl GateOutcome {
    /// Merge both halves back into batch order, pairing each action with
    /// its refusal, if any.
    pub fn into_ordered(self) -> Vec<(ActionRequest, Option<RejectReason>)> {
        let total = self.allowed.len() + self.rejected.len();
        let mut allowed = self.allowed.into_iter();
        let mut rejected = self.rejected.into_iter().peekable();
        let mut ordered = Vec::with_capacity(total);
        for position in 0..total {
            match rejected.next_if(|r| r.position == position) {
                Some(r) => ordered.push((r.request, Some(r.reason))),
                None => {
                    if let Some(request) = allowed.next() {
                        ordered.push((request, None));
                    }
                }
            }
        }
        ordered
    }
}

/// Maps a permission level to the actions it may perform.
pub struct PermissionGate {
    registry: Arc<ToolRegistry>,
    allowlists: BTreeMap<PermissionLevel, Allowlist>,
    audit: Option<Arc<AuditLogger>>,
}

impl PermissionGate {
    /// Build the allowlist of every level up front.
    ///
    /// Fails if the registry's profile grants a tool name that is not
    /// registered.
    pub fn new(registry: Arc<ToolRegistry>) -> Result<Self, RegistryError> {
        let mut allowlists = BTreeMap::new();
        for level in PermissionLevel::ALL {
            let allowlist = registry.build_allowlist(level)?;
            debug!(level = %level, tools = ?allowlist.names(), "Built allowlist");
            allowlists.insert(level, allowlist);
        }
        Ok(Self {
            registry,
            allowlists,
            audit: None,
        })
    }

    /// Record every denial in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The tools exposed at `level`.
    pub fn allowlist(&self, level: PermissionLevel) -> Option<&Allowlist> {
        self.allowlists.get(&level)
    }

    pub fn is_allowed(&self, level: PermissionLevel, tool_name: &str) -> bool {
        self.allowlists
            .get(&level)
            .is_some_and(|a| a.contains(tool_name))
    }

    /// Decide a single action.
    pub fn check(&self, level: PermissionLevel, tool_name: &str) -> Result<(), RejectReason> {
        if self.is_allowed(level, tool_name) {
            return Ok(());
        }
        if !self.registry.contains(tool_name) {
            return Err(RejectReason::UnknownTool);
        }
        let required = PermissionLevel::ALL
            .into_iter()
            .find(|l| self.is_allowed(*l, tool_name));
        Err(RejectReason::NotPermitted {
            active: level,
            required,
        })
    }

    /// Split `actions` into permitted and refused, preserving order within each.
    pub fn filter(&self, level: PermissionLevel, actions: Vec<ActionRequest>) -> GateOutcome {
        self.filter_inner(None, level, actions)
    }

    /// Like [`filter`](Self::filter), writing permission denials to the audit
    /// log under `actor`. Unknown tool names are not denials and are not
    /// audited.
    pub fn filter_audited(
        &self,
        actor: &str,
        level: PermissionLevel,
        actions: Vec<ActionRequest>,
    ) -> GateOutcome {
        self.filter_inner(Some(actor), level, actions)
    }

    fn filter_inner(
        &self,
        actor: Option<&str>,
        level: PermissionLevel,
        actions: Vec<ActionRequest>,
    ) -> GateOutcome {
        let mut outcome = GateOutcome::default();
        for (position, request) in actions.into_iter().enumerate() {
            let reason = match self.check(level, &request.tool_name) {
                Ok(()) => {
                    outcome.allowed.push(request);
                    continue;
                }
                Err(reason) => reason,
            };
            if let (Some(actor), Some(audit), RejectReason::NotPermitted { .. }) =
                (actor, &self.audit, &reason)
            {
                audit.log(
                    AuditEvent::PermissionDenied {
                        tool_name: request.tool_name.clone(),
                        level: level.to_string(),
                    },
                    actor,
                    &request.tool_name,
                    AuditOutcome::Denied,
                    Some(reason.to_string()),
                );
            }
            outcome.rejected.push(Rejection {
                position,
                request,
                reason,
            });
        }
        outcome
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate")
            .field("allowlists", &self.allowlists)
            .field("audited", &self.audit.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloop_core::error::ToolError;
    use agentloop_core::tool::{AllowlistProfile, Tool, ToolCategory, ToolResult};
    use async_trait::async_trait;

    struct Named(&'static str, PermissionLevel);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Reasoning
        }
        fn required_permission(&self) -> PermissionLevel {
            self.1
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok("ok"))
        }
    }

    fn gate() -> PermissionGate {
        let mut registry = ToolRegistry::new();
        for tool in [
            Named("think", PermissionLevel::Chatty),
            Named("browser", PermissionLevel::Chatty),
            Named("show_options", PermissionLevel::Chatty),
            Named("comparison_table", PermissionLevel::Chatty),
            Named("file_read", PermissionLevel::Assisted),
            Named("file_write", PermissionLevel::Autonomous),
        ] {
            registry.register(Arc::new(tool)).unwrap();
        }
        PermissionGate::new(Arc::new(registry)).unwrap()
    }

    fn req(name: &str) -> ActionRequest {
        ActionRequest::new(name, serde_json::Map::new())
    }

    #[test]
    fn chatty_is_restricted() {
        let gate = gate();
        assert!(gate.is_allowed(PermissionLevel::Chatty, "browser"));
        assert!(!gate.is_allowed(PermissionLevel::Chatty, "file_read"));
        assert!(!gate.is_allowed(PermissionLevel::Chatty, "file_write"));
        assert!(gate.is_allowed(PermissionLevel::Assisted, "file_read"));
        assert!(gate.is_allowed(PermissionLevel::Autonomous, "file_write"));
    }

    #[test]
    fn check_reports_lowest_exposing_level() {
        let gate = gate();
        assert_eq!(
            gate.check(PermissionLevel::Chatty, "file_write"),
            Err(RejectReason::NotPermitted {
                active: PermissionLevel::Chatty,
                required: Some(PermissionLevel::Autonomous),
            })
        );
        assert_eq!(
            gate.check(PermissionLevel::Chatty, "ghost"),
            Err(RejectReason::UnknownTool)
        );
    }

    #[test]
    fn ungranted_tool_has_no_required_level() {
        let mut registry = ToolRegistry::new()
            .with_profile(AllowlistProfile::new().grant(PermissionLevel::Chatty, ["think"]));
        registry
            .register(Arc::new(Named("think", PermissionLevel::Chatty)))
            .unwrap();
        registry
            .register(Arc::new(Named("browser", PermissionLevel::Chatty)))
            .unwrap();
        let gate = PermissionGate::new(Arc::new(registry)).unwrap();
        assert_eq!(
            gate.check(PermissionLevel::Autonomous, "browser"),
            Err(RejectReason::NotPermitted {
                active: PermissionLevel::Autonomous,
                required: None,
            })
        );
    }

    #[test]
    fn filter_preserves_order() {
        let gate = gate();
        let outcome = gate.filter(
            PermissionLevel::Chatty,
            vec![req("browser"), req("file_write"), req("think"), req("file_read")],
        );
        let allowed: Vec<_> = outcome.allowed.iter().map(|r| r.tool_name.as_str()).collect();
        let rejected: Vec<_> = outcome
            .rejected
            .iter()
            .map(|r| r.request.tool_name.as_str())
            .collect();
        assert_eq!(allowed, ["browser", "think"]);
        assert_eq!(rejected, ["file_write", "file_read"]);
    }

    #[test]
    fn denials_are_audited_but_unknown_names_are_not() {
        let audit = Arc::new(AuditLogger::new());
        let gate = gate().with_audit(audit.clone());
        let outcome = gate.filter_audited(
            "s1",
            PermissionLevel::Chatty,
            vec![req("browser"), req("ghost"), req("file_write")],
        );
        assert_eq!(outcome.rejected.len(), 2);

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, "file_write");
        assert_eq!(entries[0].outcome, AuditOutcome::Denied);
        assert_eq!(entries[0].actor, "s1");

        gate.filter(PermissionLevel::Chatty, vec![req("file_write")]);
        assert_eq!(audit.count(), 1);
    }

    #[test]
    fn ordered_outcome_restores_batch_order() {
        let gate = gate();
        let ordered = gate
            .filter(
                PermissionLevel::Chatty,
                vec![req("file_write"), req("browser"), req("ghost"), req("think")],
            )
            .into_ordered();
        let summary: Vec<(&str, bool)> = ordered
            .iter()
            .map(|(r, reason)| (r.tool_name.as_str(), reason.is_none()))
            .collect();
        assert_eq!(
            summary,
            [("file_write", false), ("browser", true), ("ghost", false), ("think", true)]
        );
        assert_eq!(ordered[2].1, Some(RejectReason::UnknownTool));
    }

    #[test]
    fn standard_ladder_accepts_registry_without_file_read() {
        let mut registry = ToolRegistry::new();
        for tool in [
            Named("think", PermissionLevel::Chatty),
            Named("browser", PermissionLevel::Chatty),
            Named("show_options", PermissionLevel::Chatty),
            Named("comparison_table", PermissionLevel::Chatty),
            Named("file_write", PermissionLevel::Autonomous),
        ] {
            registry.register(Arc::new(tool)).unwrap();
        }
        let gate = PermissionGate::new(Arc::new(registry)).unwrap();
        assert_eq!(gate.allowlist(PermissionLevel::Chatty).unwrap().len(), 4);
        assert_eq!(gate.allowlist(PermissionLevel::Assisted).unwrap().len(), 4);
        assert!(gate.is_allowed(PermissionLevel::Autonomous, "file_write"));
    }

    #[test]
    fn bad_profile_fails_construction() {
        let registry = ToolRegistry::new()
            .with_profile(AllowlistProfile::new().grant(PermissionLevel::Chatty, ["ghost"]));
        assert!(PermissionGate::new(Arc::new(registry)).is_err());
    }
}
