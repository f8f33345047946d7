//! The model collaborator.
//!
//! A provider receives the accumulated transcript and answers with the
//! model's raw text turn. How it gets there (HTTP, streaming, a recorded
//! script) is its own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{Message, Transcript};

/// One model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,

    /// The transcript so far, system message first
    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// A request carrying a snapshot of `transcript`.
    pub fn from_transcript(model: impl Into<String>, transcript: &Transcript) -> Self {
        Self {
            model: model.into(),
            messages: transcript.messages.clone(),
            temperature: default_temperature(),
            max_tokens: None,
            stop: Vec::new(),
        }
    }
}

/// How a tool is presented to the model in the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments
    pub parameters: serde_json::Value,
}

/// The model's answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Narration interleaved with action blocks
    pub content: String,

    /// Which model answered, if the backend says
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
}

impl ProviderResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: String::new(),
        }
    }
}

/// Called once per step; the executor never knows which backend answers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend name for logs (e.g. "scripted").
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn request_snapshots_transcript() {
        let mut transcript = Transcript::with_user("compare editors");
        transcript.set_system("tools: browser");
        let request = ProviderRequest::from_transcript("m", &transcript);
        transcript.push(Message::assistant("later"));

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "compare editors");
    }

    #[test]
    fn request_wire_defaults() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model": "m", "messages": []}"#).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.max_tokens.is_none());

        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("stop").is_none());
    }

    #[test]
    fn response_omits_unknown_model() {
        let json = serde_json::to_value(ProviderResponse::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"content": "hi"}));
    }
}
