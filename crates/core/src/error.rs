//! Error types for the agentloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all agentloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model transport errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Step history errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reaching the model collaborator.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a second attempt at the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::Timeout(_) | Self::Network(_) => true,
            Self::NotConfigured(_) => false,
        }
    }
}

/// Failures raised by a tool collaborator (or on its behalf by the executor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool failed transiently: {tool_name}: {reason}")]
    Transient { tool_name: String, reason: String },

    #[error("Tool failed permanently: {tool_name}: {reason}")]
    Permanent { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Sandbox violation: {0}")]
    SandboxViolation(String),
}

impl ToolError {
    /// Transient failures and timeouts consume the per-action retry budget;
    /// everything else fails the action immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Tool catalog contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate tool name: {0}")]
    DuplicateToolName(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Step history contract violations. Always fatal for the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("Immutable history violation at step {index}: {detail}")]
    ImmutableHistoryViolation { index: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::Permanent {
            tool_name: "file_write".into(),
            reason: "notes: is a directory".into(),
        });
        assert!(err.to_string().contains("file_write"));
        assert!(err.to_string().contains("is a directory"));
    }

    #[test]
    fn provider_transient_classification() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Timeout("60s".into()).is_transient());
        assert!(
            ProviderError::ApiError { status_code: 503, message: "busy".into() }.is_transient()
        );
        assert!(
            !ProviderError::ApiError { status_code: 400, message: "bad".into() }.is_transient()
        );
        assert!(
            ProviderError::ApiError { status_code: 429, message: "slow down".into() }.is_transient()
        );
        assert!(!ProviderError::NotConfigured("no model".into()).is_transient());
    }

    #[test]
    fn tool_retry_classification() {
        assert!(
            ToolError::Transient { tool_name: "browser".into(), reason: "503".into() }
                .is_retryable()
        );
        assert!(ToolError::Timeout { tool_name: "browser".into(), timeout_ms: 10 }.is_retryable());
        assert!(!ToolError::SandboxViolation("../x".into()).is_retryable());
        assert!(!ToolError::InvalidArguments("missing query".into()).is_retryable());
        assert!(
            !ToolError::Permanent { tool_name: "browser".into(), reason: "gone".into() }
                .is_retryable()
        );
    }

    #[test]
    fn history_error_mentions_index() {
        let err = HistoryError::ImmutableHistoryViolation {
            index: 3,
            detail: "step already recorded".into(),
        };
        assert!(err.to_string().contains("step 3"));
    }
}
