//! # agentloop core
//!
//! Domain types, traits, and error definitions for the agentloop execution
//! engine. Everything the executor, the permission gate and the tools agree
//! on lives here; implementations live in their own crates.

pub mod action;
pub mod clock;
pub mod error;
pub mod event;
pub mod message;
pub mod permission;
pub mod provider;
pub mod session;
pub mod tool;

pub use action::{
    ActionFailure, ActionRecord, ActionRequest, ActionStatus, FailureKind, Fingerprint,
    ParseError, SkipReason,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, HistoryError, ProviderError, RegistryError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role, Transcript};
pub use permission::PermissionLevel;
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use session::{AbortReason, Budget, Session, SessionId, SessionStatus, Step};
pub use tool::{Allowlist, AllowlistProfile, Tool, ToolCategory, ToolRegistry, ToolResult};
