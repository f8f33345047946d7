//! Configuration loading, validation, and management for agentloop.
//!
//! Loads configuration from `~/.agentloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use agentloop_core::permission::PermissionLevel;
use agentloop_core::session::Budget;
use agentloop_core::tool::{AllowlistProfile, WILDCARD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.agentloop/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model name forwarded in every provider request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Permission ladder settings
    #[serde(default)]
    pub permission: PermissionConfig,

    /// Loop limits and timeouts
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Which level a session starts at and what each level grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Level new sessions start at
    #[serde(default)]
    pub default_level: PermissionLevel,

    /// Level name → tool names first granted at that level. `"*"` grants
    /// every registered tool whose required level is satisfied.
    #[serde(default = "default_grants")]
    pub grants: BTreeMap<String, Vec<String>>,
}

fn default_grants() -> BTreeMap<String, Vec<String>> {
    let mut grants = BTreeMap::new();
    grants.insert(
        "chatty".into(),
        vec![
            "think".into(),
            "browser".into(),
            "show_options".into(),
            "comparison_table".into(),
        ],
    );
    grants.insert("assisted".into(), vec!["file_read".into()]);
    grants.insert("autonomous".into(), vec![WILDCARD.into()]);
    grants
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            default_level: PermissionLevel::default(),
            grants: default_grants(),
        }
    }
}

/// Executor loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_max_tool_retries")]
    pub max_tool_retries: u32,

    #[serde(default = "default_max_model_retries")]
    pub max_model_retries: u32,

    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: u32,

    /// Consecutive steps that execute nothing before the session is stalled
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: u32,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Base delay between tool retries, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_steps() -> usize {
    20
}
fn default_max_tool_retries() -> u32 {
    2
}
fn default_max_model_retries() -> u32 {
    1
}
fn default_max_parse_retries() -> u32 {
    1
}
fn default_stall_threshold() -> u32 {
    2
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_tool_retries: default_max_tool_retries(),
            max_model_retries: default_max_model_retries(),
            max_parse_retries: default_max_parse_retries(),
            stall_threshold: default_stall_threshold(),
            model_timeout_secs: default_model_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn budget(&self) -> Budget {
        Budget {
            max_steps: self.max_steps,
            max_tool_retries: self.max_tool_retries,
            max_model_retries: self.max_model_retries,
            max_parse_retries: self.max_parse_retries,
            stall_threshold: self.stall_threshold,
        }
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Built-in tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Extra tool names treated as safe to repeat
    #[serde(default)]
    pub idempotent: Vec<String>,

    /// Root directory for file tools
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Paths file tools may never touch
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
}

fn default_workspace_dir() -> PathBuf {
    AppConfig::config_dir().join("workspace")
}

fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/root".into(),
        "/proc".into(),
        "/sys".into(),
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
    ]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            idempotent: vec![],
            workspace_dir: default_workspace_dir(),
            forbidden_paths: default_forbidden_paths(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentloop/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `AGENTLOOP_PERMISSION`
    /// - `AGENTLOOP_MAX_STEPS`
    /// - `AGENTLOOP_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(level) = std::env::var("AGENTLOOP_PERMISSION") {
            self.permission.default_level = level
                .parse()
                .map_err(|e: agentloop_core::permission::UnknownLevel| {
                    ConfigError::ValidationError(format!("AGENTLOOP_PERMISSION: {e}"))
                })?;
        }

        if let Ok(steps) = std::env::var("AGENTLOOP_MAX_STEPS") {
            self.executor.max_steps = steps.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "AGENTLOOP_MAX_STEPS must be a positive integer, got '{steps}'"
                ))
            })?;
        }

        if let Ok(model) = std::env::var("AGENTLOOP_MODEL") {
            self.model = model;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentloop")
    }

    /// Get the default config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.executor.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "executor.max_steps must be at least 1".into(),
            ));
        }

        if self.executor.stall_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "executor.stall_threshold must be at least 1".into(),
            ));
        }

        self.allowlist_profile()?;
        Ok(())
    }

    /// The level → grants table as a core profile.
    pub fn allowlist_profile(&self) -> Result<AllowlistProfile, ConfigError> {
        let mut profile = AllowlistProfile::new();
        for (level, names) in &self.permission.grants {
            let level: PermissionLevel = level.parse().map_err(|e| {
                ConfigError::ValidationError(format!("permission.grants: {e}"))
            })?;
            profile = profile.grant(level, names.iter().cloned());
        }
        Ok(profile)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            permission: PermissionConfig::default(),
            executor: ExecutorConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.permission.default_level, PermissionLevel::Chatty);
        assert_eq!(config.executor.max_steps, 20);
        assert_eq!(config.executor.max_tool_retries, 2);
        assert_eq!(config.executor.stall_threshold, 2);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.permission.grants, config.permission.grants);
        assert_eq!(parsed.executor.max_steps, config.executor.max_steps);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_budget_rejected() {
        let mut config = AppConfig::default();
        config.executor.max_steps = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.executor.stall_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_grant_level_rejected() {
        let mut config = AppConfig::default();
        config
            .permission
            .grants
            .insert("superuser".into(), vec!["file_write".into()]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("superuser"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.executor.max_steps, 20);
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
model = "gpt-4o"

[permission]
default_level = "assisted"

[executor]
max_steps = 5
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.permission.default_level, PermissionLevel::Assisted);
        assert_eq!(config.executor.max_steps, 5);
        assert_eq!(config.executor.max_tool_retries, 2);
        assert!(config.permission.grants.contains_key("chatty"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = [unterminated").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn profile_matches_standard_ladder() {
        let profile = AppConfig::default().allowlist_profile().unwrap();
        let chatty = profile.granted_names(PermissionLevel::Chatty);
        assert!(chatty.contains("browser"));
        assert!(!chatty.contains("file_read"));
        let assisted = profile.granted_names(PermissionLevel::Assisted);
        assert!(assisted.contains("file_read"));
        assert!(profile.granted_names(PermissionLevel::Autonomous).contains(WILDCARD));
    }

    #[test]
    fn budget_and_durations() {
        let executor = ExecutorConfig::default();
        let budget = executor.budget();
        assert_eq!(budget, Budget::default());
        assert_eq!(executor.tool_timeout(), Duration::from_secs(30));
        assert_eq!(executor.retry_backoff(), Duration::from_millis(250));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[executor]"));
        assert!(toml_str.contains("max_steps = 20"));
    }
}
