pub mod config_cmd;
pub mod replay;
pub mod status;
pub mod tools;

use agentloop_config::AppConfig;
use agentloop_core::tool::ToolRegistry;
use agentloop_tools::Workspace;

/// Build the tool registry described by `config`: built-in tools, the
/// configured level grants, and any extra idempotent tools.
pub fn build_registry(config: &AppConfig) -> Result<ToolRegistry, Box<dyn std::error::Error>> {
    let workspace = Workspace::new(&config.tools.workspace_dir)
        .with_forbidden_paths(config.tools.forbidden_paths.clone());
    let mut registry =
        agentloop_tools::registry_with_profile(workspace, config.allowlist_profile()?)?;
    for name in &config.tools.idempotent {
        registry.mark_idempotent(name)?;
    }
    Ok(registry)
}
