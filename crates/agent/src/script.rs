//! A model collaborator that replays canned responses.
//!
//! Used by the `replay` command and by tests: feeding the same script
//! through the executor with a fixed clock reproduces the same step history.

use agentloop_core::error::ProviderError;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::provider::{Provider, ProviderRequest, ProviderResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One canned model turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptedTurn {
    /// Raw response text.
    Text(String),
    /// A transport failure instead of a response.
    Error {
        error: String,
        #[serde(default = "default_transient")]
        transient: bool,
    },
}

fn default_transient() -> bool {
    true
}

impl From<&str> for ScriptedTurn {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A recorded session script: the user prompt and every model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub prompt: String,
    #[serde(default)]
    pub level: Option<PermissionLevel>,
    pub responses: Vec<ScriptedTurn>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse script: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Script {
    /// Load a JSON script from disk.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Returns scripted turns in sequence and keeps every request it received.
///
/// Once the script runs out every call fails with a non-transient error.
pub struct ScriptedProvider {
    turns: Vec<ScriptedTurn>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns,
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A script made only of text turns.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| ScriptedTurn::Text(t.into())).collect())
    }

    pub fn from_script(script: &Script) -> Self {
        Self::new(script.responses.clone())
    }

    /// How many times `complete` was called.
    pub fn calls(&self) -> usize {
        *lock(&self.call_count)
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        lock(&self.requests).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        lock(&self.requests).push(request);

        let mut count = lock(&self.call_count);
        let Some(turn) = self.turns.get(*count) else {
            return Err(ProviderError::NotConfigured(format!(
                "script exhausted after {} turns",
                self.turns.len()
            )));
        };
        *count += 1;
        debug!(turn = *count, "Replaying scripted turn");

        match turn {
            ScriptedTurn::Text(text) => Ok(ProviderResponse {
                model: "scripted".into(),
                ..ProviderResponse::text(text.clone())
            }),
            ScriptedTurn::Error {
                error,
                transient: true,
            } => Err(ProviderError::Network(error.clone())),
            ScriptedTurn::Error { error, .. } => Err(ProviderError::ApiError {
                status_code: 400,
                message: error.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("turns", &self.turns.len())
            .field("calls", &self.calls())
            .finish()
    }
}
