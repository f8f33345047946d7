//! Message and Transcript domain types.
//!
//! The transcript is the accumulated context sent to the model on every
//! step: system instructions, the user's request, every raw model turn, and
//! the observations the executor feeds back after running actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions (tool catalog, action syntax)
    System,
    /// Results of executed actions and executor feedback
    Tool,
}

/// A single message in a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// For tool messages, the tool the content refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_name: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool observation message.
    pub fn tool_result(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_name = Some(tool_name.into());
        msg
    }

    /// Create executor feedback (rejections, parse failures) addressed to the model.
    pub fn feedback(content: impl Into<String>) -> Self {
        Self::with_role(Role::Tool, content)
    }
}

/// The ordered context accumulated over a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    /// Ordered messages
    pub messages: Vec<Message>,
}

impl Transcript {
    /// Create a new empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript seeded with the user's request.
    pub fn with_user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
        }
    }

    /// Add a message to the transcript.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the leading system message, inserting one if absent.
    pub fn set_system(&mut self, content: impl Into<String>) {
        let system = Message::system(content);
        match self.messages.first() {
            Some(first) if first.role == Role::System => self.messages[0] = system,
            _ => self.messages.insert(0, system),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_name.is_none());
    }

    #[test]
    fn tool_result_carries_tool_name() {
        let msg = Message::tool_result("browser", "3 results");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_name.as_deref(), Some("browser"));
    }

    #[test]
    fn set_system_inserts_then_replaces() {
        let mut t = Transcript::with_user("hi");
        t.set_system("v1");
        assert_eq!(t.len(), 2);
        assert_eq!(t.messages[0].content, "v1");

        t.set_system("v2");
        assert_eq!(t.len(), 2);
        assert_eq!(t.messages[0].content, "v2");
        assert_eq!(t.messages[1].role, Role::User);
    }
}
