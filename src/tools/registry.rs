//! Tool registry and per-agent dispatch tables.
//!
//! The [`ToolRegistry`] holds every adapter available to a crew. Each agent
//! gets a [`ToolTable`] built from it at configuration time; the model's
//! requested tool name is resolved against that table into a [`ToolSlot`],
//! and only a slot can be invoked. Names outside the table are rejected.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::base_tool::{ToolAdapter, ToolError};
use super::file_read_tool::FileReadTool;
use super::scrape_website_tool::ScrapeWebsiteTool;
use crate::utilities::errors::{AgentError, AgentErrorKind, ConfigError, ConfigErrorKind};
use crate::utilities::string_utils::sanitize_tool_name;

/// All tool adapters known to a crew, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `read_file` and `scrape_website`.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FileReadTool::new()));
        registry.register(Arc::new(ScrapeWebsiteTool::from_env()));
        registry
    }

    /// Add an adapter. A later adapter with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn ToolAdapter>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            log::debug!("Replacing registered tool '{}'", tool.name());
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Build the dispatch table for an agent.
    ///
    /// `path` locates the agent's tool list in the configuration and is used
    /// to report unregistered names as `MissingField`.
    pub fn bind(&self, names: &[String], path: &str) -> Result<ToolTable, ConfigError> {
        let mut tools: Vec<Arc<dyn ToolAdapter>> = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let tool = self.get(name).ok_or_else(|| {
                ConfigError::new(
                    ConfigErrorKind::MissingField,
                    format!("{}[{}]", path, i),
                    format!(
                        "tool '{}' is not registered (available: {})",
                        name,
                        self.names().join(", ")
                    ),
                )
            })?;
            if tools.iter().any(|t| t.name() == tool.name()) {
                return Err(ConfigError::new(
                    ConfigErrorKind::DuplicateName,
                    format!("{}[{}]", path, i),
                    format!("tool '{}' is bound twice", name),
                ));
            }
            tools.push(tool);
        }
        Ok(ToolTable { tools })
    }
}

/// Handle to a tool bound to one agent. Only produced by [`ToolTable::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSlot(usize);

/// The ordered set of tools bound to one agent.
#[derive(Clone, Default)]
pub struct ToolTable {
    tools: Vec<Arc<dyn ToolAdapter>>,
}

impl fmt::Debug for ToolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tools.iter().map(|t| t.name())).finish()
    }
}

impl ToolTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// `- name: description` lines plus argument schemas, for the system prompt.
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("- {}: {}\n  Arguments: {}", t.name(), t.description(), t.args_schema()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Resolve a model-supplied tool name.
    ///
    /// Exact names win; otherwise names are compared after normalisation
    /// (`"Read File"` finds `read_file`).
    pub fn resolve(&self, requested: &str) -> Result<ToolSlot, AgentError> {
        let requested = requested.trim();
        if let Some(idx) = self.tools.iter().position(|t| t.name() == requested) {
            return Ok(ToolSlot(idx));
        }
        let wanted = sanitize_tool_name(requested);
        self.tools
            .iter()
            .position(|t| sanitize_tool_name(t.name()) == wanted)
            .map(ToolSlot)
            .ok_or_else(|| {
                AgentError::new(
                    AgentErrorKind::UnknownTool,
                    format!(
                        "tool '{}' is not bound to this agent (bound: [{}])",
                        requested,
                        self.names().join(", ")
                    ),
                )
            })
    }

    pub fn name_of(&self, slot: ToolSlot) -> &str {
        self.tools[slot.0].name()
    }

    /// The adapter behind a slot, for invocation off the calling thread.
    pub fn adapter(&self, slot: ToolSlot) -> Arc<dyn ToolAdapter> {
        Arc::clone(&self.tools[slot.0])
    }

    pub fn invoke(&self, slot: ToolSlot, args: &Value) -> Result<String, ToolError> {
        self.tools[slot.0].invoke(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTool;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(RecordingTool::new("read_file", "contents")));
        registry.register(Arc::new(RecordingTool::new("scrape_website", "page")));
        registry
    }

    #[test]
    fn test_bind_unknown_tool_is_missing_field() {
        let err = registry()
            .bind(&["read_file".into(), "search_jobs".into()], "agents.profiler.tools")
            .unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::MissingField);
        assert_eq!(err.path, "agents.profiler.tools[1]");
    }

    #[test]
    fn test_bind_duplicate() {
        let err = registry()
            .bind(&["read_file".into(), "read_file".into()], "agents.p.tools")
            .unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::DuplicateName);
    }

    #[test]
    fn test_resolve_and_invoke() {
        let table = registry().bind(&["scrape_website".into()], "p").unwrap();
        let slot = table.resolve("Scrape Website").unwrap();
        assert_eq!(table.name_of(slot), "scrape_website");
        assert_eq!(table.invoke(slot, &json!({})).unwrap(), "page");
    }

    #[test]
    fn test_resolve_rejects_unbound() {
        let table = registry().bind(&["scrape_website".into()], "p").unwrap();
        let err = table.resolve("read_file").unwrap_err();
        assert_eq!(err.kind, AgentErrorKind::UnknownTool);
    }

    #[test]
    fn test_builtin_registry_names() {
        let registry = ToolRegistry::with_builtin_tools();
        assert_eq!(registry.names(), vec!["read_file", "scrape_website"]);
    }
}
