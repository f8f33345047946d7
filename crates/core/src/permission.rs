//! Permission levels: the ordered ladder of session modes.
//!
//! A higher level grants a superset of the tool access of every lower
//! level. The derive order of the variants *is* the ladder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The mode a session runs under.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Conversation plus read-only lookups and UI presentation.
    #[default]
    Chatty,
    /// Adds read access to the workspace.
    Assisted,
    /// Every registered tool.
    Autonomous,
}

impl PermissionLevel {
    /// All levels, lowest first.
    pub const ALL: [PermissionLevel; 3] = [Self::Chatty, Self::Assisted, Self::Autonomous];

    /// This level and every level below it, lowest first.
    pub fn at_or_below(self) -> impl Iterator<Item = PermissionLevel> {
        Self::ALL.into_iter().filter(move |l| *l <= self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chatty => "chatty",
            Self::Assisted => "assisted",
            Self::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no permission level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission level '{0}' (expected chatty, assisted or autonomous)")]
pub struct UnknownLevel(pub String);

impl FromStr for PermissionLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatty" => Ok(Self::Chatty),
            "assisted" => Ok(Self::Assisted),
            "autonomous" => Ok(Self::Autonomous),
            other => Err(UnknownLevel(other.to_string())),
        }
    }
}
