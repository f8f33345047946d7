//! Permission enforcement for agentloop: the permission gate, permission
//! sources, audit logging, and path validation for file tools.

pub mod audit;
pub mod gate;
pub mod path;
pub mod source;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use gate::{GateOutcome, PermissionGate, RejectReason, Rejection};
pub use path::{PathValidationError, resolve_in_workspace};
pub use source::{PermissionHandle, PermissionSource};
