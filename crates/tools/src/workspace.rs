//! The directory file tools are confined to.

use agentloop_core::error::ToolError;
use agentloop_security::resolve_in_workspace;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    forbidden_paths: Vec<String>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            forbidden_paths: Vec::new(),
        }
    }

    pub fn with_forbidden_paths(mut self, forbidden_paths: Vec<String>) -> Self {
        self.forbidden_paths = forbidden_paths;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model-supplied path, mapping refusals to `SandboxViolation`.
    pub fn resolve(&self, tool_name: &str, requested: &str) -> Result<PathBuf, ToolError> {
        resolve_in_workspace(&self.root, requested, &self.forbidden_paths).map_err(|e| {
            warn!(tool = tool_name, path = requested, error = %e, "Path refused");
            ToolError::SandboxViolation(e.to_string())
        })
    }
}
