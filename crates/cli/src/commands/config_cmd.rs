//! `agentloop config`: configuration management commands.

use agentloop_config::AppConfig;
use agentloop_core::permission::PermissionLevel;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    // Catch grants naming tools that do not exist.
    let registry = super::build_registry(&config)?;
    for level in PermissionLevel::ALL {
        registry.build_allowlist(level)?;
    }

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Model:       {}", config.model);
    println!("   Permission:  {}", config.permission.default_level);
    println!("   Max steps:   {}", config.executor.max_steps);
    println!("   Workspace:   {}", config.tools.workspace_dir.display());
    Ok(())
}

/// Settings that load fine but are probably not what the user meant.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.executor.stall_threshold as usize >= config.executor.max_steps {
        warnings.push(format!(
            "stall_threshold ({}) is not below max_steps ({}); stalls will never be detected",
            config.executor.stall_threshold, config.executor.max_steps
        ));
    }
    if config.executor.max_tool_retries > 5 {
        warnings.push(format!(
            "max_tool_retries = {} retries each failing action many times",
            config.executor.max_tool_retries
        ));
    }
    if config.executor.tool_timeout_secs == 0 || config.executor.model_timeout_secs == 0 {
        warnings.push("a zero timeout makes every call time out".into());
    }
    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}
