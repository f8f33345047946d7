//! Tool trait and the name-keyed tool catalog.
//!
//! Tools are what give the agent the ability to act: reason out loud,
//! search the web, render options for the user, touch the workspace.
//! The registry resolves tools strictly by their stable name, so the
//! composition of a permission level's allowlist never depends on the
//! order in which tools were registered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{RegistryError, ToolError};
use crate::permission::PermissionLevel;
use crate::provider::ToolDefinition;

/// Grant entry that stands for every registered tool.
pub const WILDCARD: &str = "*";

/// The family a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Internal reasoning with no side effects.
    Reasoning,
    /// Lookups against the web.
    Web,
    /// Presentation to the user.
    Ui,
    /// Workspace file access.
    File,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reasoning => "reasoning",
            Self::Web => "web",
            Self::Ui => "ui",
            Self::File => "file",
        };
        f.write_str(s)
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content fed back to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful result with text output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The core Tool trait.
///
/// Each tool (think, browser, show_options, file_write, etc.) implements
/// this trait. Tools are immutable once registered and shared read-only
/// by every session.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique, stable name of this tool (e.g., "browser").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Which family this tool belongs to.
    fn category(&self) -> ToolCategory;

    /// The lowest permission level allowed to invoke this tool.
    ///
    /// Defaults to the top of the ladder: a tool must opt in to being
    /// available in restricted modes.
    fn required_permission(&self) -> PermissionLevel {
        PermissionLevel::Autonomous
    }

    /// Whether repeating an identical invocation is harmless.
    fn idempotent(&self) -> bool {
        false
    }

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for the system prompt.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tool names granted at each permission level.
///
/// A level's effective grants are the union of its own entries and those
/// of every level below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistProfile {
    grants: BTreeMap<PermissionLevel, Vec<String>>,
}

impl AllowlistProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `names` starting at `level`.
    pub fn grant<I, S>(mut self, level: PermissionLevel, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(level)
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Names granted at `level` or below, deduplicated.
    pub fn granted_names(&self, level: PermissionLevel) -> BTreeSet<&str> {
        level
            .at_or_below()
            .filter_map(|l| self.grants.get(&l))
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// The chatty/assisted/autonomous ladder shipped by default.
    pub fn standard() -> Self {
        Self::new()
            .grant(
                PermissionLevel::Chatty,
                ["think", "browser", "show_options", "comparison_table"],
            )
            .grant(PermissionLevel::Assisted, ["file_read"])
            .grant(PermissionLevel::Autonomous, [WILDCARD])
    }
}

/// The set of tools a permission level exposes, keyed by name.
#[derive(Clone, Default)]
pub struct Allowlist {
    level: PermissionLevel,
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Allowlist {
    pub fn level(&self) -> PermissionLevel {
        self.level
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions in name order, for the system prompt.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }
}

impl fmt::Debug for Allowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allowlist")
            .field("level", &self.level)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A registry of available tools.
///
/// Built once at startup, then shared behind an `Arc` and only read.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    idempotent: HashSet<String>,
    profile: AllowlistProfile,
    // Grants from an explicit profile must name registered tools.
    strict_grants: bool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            idempotent: HashSet::new(),
            profile: AllowlistProfile::standard(),
            strict_grants: false,
        }
    }

    /// Replace the level → tool-name grants used by [`build_allowlist`](Self::build_allowlist).
    ///
    /// Unlike the built-in ladder, every name in `profile` must be registered.
    pub fn with_profile(mut self, profile: AllowlistProfile) -> Self {
        self.profile = profile;
        self.strict_grants = true;
        self
    }

    pub fn profile(&self) -> &AllowlistProfile {
        &self.profile
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateToolName(name));
        }
        if tool.idempotent() {
            self.idempotent.insert(name.clone());
        }
        debug!(tool = %name, category = %tool.category(), "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Declare an already-registered tool safe to repeat.
    pub fn mark_idempotent(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.tools.contains_key(name) {
            return Err(RegistryError::UnknownTool(name.to_string()));
        }
        self.idempotent.insert(name.to_string());
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Get a tool by name without an error.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Whether identical repeats of `name` are harmless. Unknown tools are not.
    pub fn is_idempotent(&self, name: &str) -> bool {
        self.idempotent.contains(name)
    }

    /// All tools of one category, in name order.
    pub fn list_by_category(&self, category: ToolCategory) -> Vec<Arc<dyn Tool>> {
        self.tools
            .values()
            .filter(|t| t.category() == category)
            .cloned()
            .collect()
    }

    /// The tools exposed at `level`.
    ///
    /// Granted names are resolved through [`resolve`](Self::resolve). With a
    /// profile set by [`with_profile`](Self::with_profile) an unregistered name
    /// fails fast with `UnknownTool`; the built-in ladder skips tools this
    /// registry does not carry. A tool whose own required level is above
    /// `level` is never exposed, even if a grant names it.
    pub fn build_allowlist(&self, level: PermissionLevel) -> Result<Allowlist, RegistryError> {
        let granted = self.profile.granted_names(level);
        let mut tools = BTreeMap::new();

        if granted.contains(WILDCARD) {
            for (name, tool) in &self.tools {
                if tool.required_permission() <= level {
                    tools.insert(name.clone(), tool.clone());
                }
            }
        }

        for name in granted.iter().filter(|n| **n != WILDCARD) {
            let tool = match self.resolve(name) {
                Ok(tool) => tool,
                Err(e) if self.strict_grants => return Err(e),
                Err(_) => {
                    debug!(tool = %name, %level, "Standard grant names an unregistered tool");
                    continue;
                }
            };
            if tool.required_permission() <= level {
                tools.insert((*name).to_string(), tool);
            }
        }

        Ok(Allowlist { level, tools })
    }

    /// Get all tool definitions, in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names, in name order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A configurable stand-in tool for unit tests.
    struct StubTool {
        name: &'static str,
        category: ToolCategory,
        level: PermissionLevel,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn category(&self) -> ToolCategory {
            self.category
        }
        fn required_permission(&self) -> PermissionLevel {
            self.level
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(arguments["text"].as_str().unwrap_or("")))
        }
    }

    fn stub(name: &'static str, category: ToolCategory, level: PermissionLevel) -> Arc<dyn Tool> {
        Arc::new(StubTool { name, category, level })
    }

    fn scenario_tools() -> Vec<Arc<dyn Tool>> {
        vec![
            stub("think", ToolCategory::Reasoning, PermissionLevel::Chatty),
            stub("browser", ToolCategory::Web, PermissionLevel::Chatty),
            stub("show_options", ToolCategory::Ui, PermissionLevel::Chatty),
            stub("comparison_table", ToolCategory::Ui, PermissionLevel::Chatty),
            stub("file_write", ToolCategory::File, PermissionLevel::Autonomous),
        ]
    }

    fn registry_from(tools: Vec<Arc<dyn Tool>>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        registry
    }

    #[test]
    fn register_and_resolve() {
        let registry = registry_from(scenario_tools());
        assert!(registry.resolve("browser").is_ok());
        assert_eq!(
            registry.resolve("nonexistent").err(),
            Some(RegistryError::UnknownTool("nonexistent".into()))
        );
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(stub("think", ToolCategory::Reasoning, PermissionLevel::Chatty))
            .unwrap();
        let err = registry
            .register(stub("think", ToolCategory::Web, PermissionLevel::Chatty))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateToolName("think".into()));
        assert_eq!(registry.get("think").unwrap().category(), ToolCategory::Reasoning);
    }

    #[test]
    fn chatty_allowlist_excludes_file_write() {
        let registry = registry_from(scenario_tools());
        let allowlist = registry.build_allowlist(PermissionLevel::Chatty).unwrap();
        let expected: BTreeSet<String> = ["think", "browser", "show_options", "comparison_table"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(allowlist.names(), expected);
    }

    #[test]
    fn autonomous_allowlist_is_superset() {
        let registry = registry_from(scenario_tools());
        let chatty = registry.build_allowlist(PermissionLevel::Chatty).unwrap().names();
        let autonomous = registry.build_allowlist(PermissionLevel::Autonomous).unwrap().names();
        assert!(autonomous.is_superset(&chatty));
        assert!(autonomous.contains("file_write"));
    }

    #[test]
    fn allowlist_is_stable_under_registration_order() {
        let forward = registry_from(scenario_tools());
        let mut reversed_tools = scenario_tools();
        reversed_tools.reverse();
        let reversed = registry_from(reversed_tools);

        let mut rotated_tools = scenario_tools();
        rotated_tools.rotate_left(2);
        let rotated = registry_from(rotated_tools);

        for level in PermissionLevel::ALL {
            let a = forward.build_allowlist(level).unwrap().names();
            assert_eq!(a, reversed.build_allowlist(level).unwrap().names());
            assert_eq!(a, rotated.build_allowlist(level).unwrap().names());
        }
    }

    #[test]
    fn grant_naming_unregistered_tool_fails_fast() {
        let registry = registry_from(scenario_tools())
            .with_profile(AllowlistProfile::new().grant(PermissionLevel::Chatty, ["ghost"]));
        let err = registry.build_allowlist(PermissionLevel::Chatty).unwrap_err();
        assert_eq!(err, RegistryError::UnknownTool("ghost".into()));
    }

    #[test]
    fn grant_cannot_lift_required_permission() {
        let registry = registry_from(scenario_tools())
            .with_profile(AllowlistProfile::new().grant(PermissionLevel::Chatty, ["file_write"]));
        let allowlist = registry.build_allowlist(PermissionLevel::Chatty).unwrap();
        assert!(!allowlist.contains("file_write"));
    }

    #[test]
    fn list_by_category_filters() {
        let registry = registry_from(scenario_tools());
        let ui: Vec<String> = registry
            .list_by_category(ToolCategory::Ui)
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(ui, vec!["comparison_table", "show_options"]);
    }

    #[test]
    fn idempotency_table() {
        let mut registry = registry_from(scenario_tools());
        assert!(!registry.is_idempotent("think"));
        registry.mark_idempotent("think").unwrap();
        assert!(registry.is_idempotent("think"));
        assert!(registry.mark_idempotent("ghost").is_err());
        assert!(!registry.is_idempotent("ghost"));
    }

    #[test]
    fn standard_ladder_skips_tools_not_registered() {
        let registry = registry_from(scenario_tools());
        let assisted = registry.build_allowlist(PermissionLevel::Assisted).unwrap();
        assert!(!assisted.contains("file_read"));
        assert_eq!(assisted.len(), 4);
    }

    #[test]
    fn explicit_standard_profile_still_fails_fast() {
        let registry = registry_from(scenario_tools()).with_profile(AllowlistProfile::standard());
        let err = registry.build_allowlist(PermissionLevel::Assisted).unwrap_err();
        assert_eq!(err, RegistryError::UnknownTool("file_read".into()));
        assert!(registry.build_allowlist(PermissionLevel::Chatty).is_ok());
    }
}
