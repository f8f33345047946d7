//! `agentloop status`: show system status.

use agentloop_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = super::build_registry(&config)?;

    println!("agentloop status");
    println!("================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Workspace:     {}", config.tools.workspace_dir.display());
    println!("  Model:         {}", config.model);
    println!("  Temperature:   {}", config.temperature);
    println!("  Permission:    {}", config.permission.default_level);
    println!(
        "  Budget:        {} steps, {} tool retries, stall after {}",
        config.executor.max_steps, config.executor.max_tool_retries, config.executor.stall_threshold
    );
    println!(
        "  Timeouts:      model {}s, tool {}s",
        config.executor.model_timeout_secs, config.executor.tool_timeout_secs
    );
    println!("  Tools:         {}", registry.names().join(", "));

    if AppConfig::config_path().exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file, using defaults. Write one with:");
        println!("    agentloop config show > {}", AppConfig::config_path().display());
    }

    Ok(())
}
