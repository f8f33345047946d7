//! `agentloop tools`: show the allowlist of each permission level.

use agentloop_config::AppConfig;
use agentloop_core::permission::PermissionLevel;
use agentloop_core::tool::{ToolRegistry, WILDCARD};
use agentloop_security::PermissionGate;
use std::sync::Arc;

pub async fn run(level: Option<PermissionLevel>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = Arc::new(super::build_registry(&config)?);
    let gate = PermissionGate::new(registry.clone())?;

    let levels: Vec<PermissionLevel> = match level {
        Some(level) => vec![level],
        None => PermissionLevel::ALL.to_vec(),
    };

    if json {
        let report: serde_json::Map<String, serde_json::Value> = levels
            .iter()
            .map(|level| {
                let names = gate
                    .allowlist(*level)
                    .map(|a| a.names().into_iter().collect::<Vec<_>>())
                    .unwrap_or_default();
                (level.to_string(), serde_json::json!(names))
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for level in levels {
        println!("{}", render_level(&gate, &registry, level));
    }
    Ok(())
}

fn render_level(gate: &PermissionGate, registry: &ToolRegistry, level: PermissionLevel) -> String {
    let mut out = format!("{level}:");
    let Some(allowlist) = gate.allowlist(level).filter(|a| !a.is_empty()) else {
        out.push_str("\n  (no tools)");
        return out;
    };
    for tool in allowlist.tools() {
        let repeat = if registry.is_idempotent(tool.name()) {
            "idempotent"
        } else {
            "once"
        };
        out.push_str(&format!(
            "\n  {:<18} {:<10} {}",
            tool.name(),
            repeat,
            tool.description().lines().next().unwrap_or_default()
        ));
    }
    let granted = registry.profile().granted_names(level);
    if granted.contains(WILDCARD) {
        out.push_str("\n  (all tools permitted at this level)");
    }
    out
}
