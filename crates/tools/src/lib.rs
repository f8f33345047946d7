//! Built-in tool implementations for agentloop.
//!
//! Tools give the agent the ability to act: reason out loud, look things
//! up, put choices and comparisons in front of the user, and read or write
//! files in its workspace.

pub mod browser;
pub mod comparison_table;
pub mod file_read;
pub mod file_write;
pub mod show_options;
pub mod think;
pub mod workspace;

use agentloop_core::error::RegistryError;
use agentloop_core::tool::{AllowlistProfile, ToolRegistry};
use std::sync::Arc;

pub use workspace::Workspace;

/// Create a registry holding every built-in tool, using the standard
/// permission ladder.
///
/// File tools are confined to `workspace`.
pub fn default_registry(workspace: Workspace) -> Result<ToolRegistry, RegistryError> {
    registry_with_profile(workspace, AllowlistProfile::standard())
}

/// Like [`default_registry`], with custom level grants.
pub fn registry_with_profile(
    workspace: Workspace,
    profile: AllowlistProfile,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new().with_profile(profile);
    registry.register(Arc::new(think::ThinkTool))?;
    registry.register(Arc::new(browser::BrowserTool))?;
    registry.register(Arc::new(show_options::ShowOptionsTool))?;
    registry.register(Arc::new(comparison_table::ComparisonTableTool))?;
    registry.register(Arc::new(file_read::FileReadTool::new(workspace.clone())))?;
    registry.register(Arc::new(file_write::FileWriteTool::new(workspace)))?;
    Ok(registry)
}
