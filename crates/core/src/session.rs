//! Sessions and their append-only step history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::action::{ActionRecord, ParseError};
use crate::error::HistoryError;
use crate::permission::PermissionLevel;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Maximum loop iterations (recorded steps).
    pub max_steps: usize,
    /// Extra attempts per action after a transient tool failure.
    pub max_tool_retries: u32,
    /// Extra attempts per step after a transient transport failure.
    pub max_model_retries: u32,
    /// Consecutive unparseable responses tolerated before aborting.
    pub max_parse_retries: u32,
    /// Consecutive steps with nothing executed before the session is stalled.
    pub stall_threshold: u32,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_tool_retries: 2,
            max_model_retries: 1,
            max_parse_retries: 1,
            stall_threshold: 2,
        }
    }
}

/// Why a session stopped without a final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    BudgetExhausted { max_steps: usize },
    Stalled { consecutive_steps: u32 },
    ParseError { message: String },
    Transport { message: String },
    Cancelled,
    HistoryViolation { message: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExhausted { max_steps } => {
                write!(f, "step budget of {max_steps} exhausted")
            }
            Self::Stalled { consecutive_steps } => write!(
                f,
                "stalled: {consecutive_steps} consecutive steps executed nothing"
            ),
            Self::ParseError { message } => write!(f, "model output unparseable: {message}"),
            Self::Transport { message } => write!(f, "model transport unavailable: {message}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::HistoryViolation { message } => write!(f, "history violation: {message}"),
        }
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Aborted { reason: AbortReason },
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One full iteration of the executor loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Monotonic, 0-based.
    pub index: usize,
    /// The permission level active while this step ran.
    pub permission_level: PermissionLevel,
    /// The raw model turn.
    pub model_response_text: String,
    /// The free-text portion of the turn.
    pub narration: String,
    /// Actions in parsed order.
    pub actions: Vec<ActionRecord>,
    /// Malformed blocks found in the turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_errors: Vec<ParseError>,
    /// Whether the session ended with this step.
    pub terminated_session: bool,
    pub recorded_at: DateTime<Utc>,
}

impl Step {
    pub fn executed_count(&self) -> usize {
        self.actions.iter().filter(|a| a.is_executed()).count()
    }

    /// Whether any action in this step reached a tool.
    pub fn made_progress(&self) -> bool {
        self.actions.iter().any(|a| a.was_attempted())
    }
}

/// A conversation-long execution context.
///
/// `steps` is append-only: the only way in is [`Session::append_step`], and
/// the only way out is a shared slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    permission_level: PermissionLevel,
    steps: Vec<Step>,
    budget: Budget,
    status: SessionStatus,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(permission_level: PermissionLevel, budget: Budget) -> Self {
        Self {
            id: SessionId::new(),
            permission_level,
            steps: Vec::new(),
            budget,
            status: SessionStatus::Running,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn permission_level(&self) -> PermissionLevel {
        self.permission_level
    }

    /// Change the level for subsequent steps. Past steps keep the level
    /// they recorded.
    pub fn set_permission_level(&mut self, level: PermissionLevel) {
        self.permission_level = level;
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The index the next recorded step must carry.
    pub fn next_step_index(&self) -> usize {
        self.steps.len()
    }

    /// Append a step. The step's index must be exactly the next index.
    pub fn append_step(&mut self, step: Step) -> Result<(), HistoryError> {
        let expected = self.steps.len();
        if step.index < expected {
            return Err(HistoryError::ImmutableHistoryViolation {
                index: step.index,
                detail: "a step with this index is already recorded".into(),
            });
        }
        if step.index > expected {
            return Err(HistoryError::ImmutableHistoryViolation {
                index: step.index,
                detail: format!("steps must be appended in order, expected index {expected}"),
            });
        }
        self.steps.push(step);
        Ok(())
    }

    /// Every action record across the history, oldest first.
    pub fn action_records(&self) -> impl Iterator<Item = &ActionRecord> {
        self.steps.iter().flat_map(|s| s.actions.iter())
    }

    /// The most recent non-empty narration.
    pub fn last_narration(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .map(|s| s.narration.as_str())
            .find(|n| !n.trim().is_empty())
    }
}
