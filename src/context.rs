//! Run context: initial inputs plus every completed task's output.
//!
//! The context only grows. Entries keep insertion order, so the initial
//! inputs come first and task outputs follow in completion order.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value stored in the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Text(String),
    Json(Value),
}

impl ContextValue {
    /// Text form used for prompt rendering and placeholder substitution.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            ContextValue::Text(s) => Cow::Borrowed(s),
            ContextValue::Json(Value::String(s)) => Cow::Borrowed(s),
            ContextValue::Json(v) => {
                Cow::Owned(serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()))
            }
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Where a context entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    Input,
    Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub key: String,
    pub value: ContextValue,
    pub source: ContextSource,
}

/// Ordered mapping from key (input name or task name) to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    entries: Vec<ContextEntry>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with initial inputs, in the given order.
    pub fn from_inputs<I, K, V>(inputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut ctx = Self::new();
        for (k, v) in inputs {
            ctx.push(k.into(), ContextValue::Text(v.into()), ContextSource::Input);
        }
        ctx
    }

    /// Record a completed task's output. Keys are never overwritten.
    pub(crate) fn record_task_output(&mut self, task: &str, value: ContextValue) {
        self.push(task.to_string(), value, ContextSource::Task);
    }

    fn push(&mut self, key: String, value: ContextValue, source: ContextSource) {
        if self.contains(&key) {
            log::warn!("Context key '{}' already recorded, keeping the first value", key);
            return;
        }
        self.entries.push(ContextEntry { key, value, source });
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Text of `key`, for template substitution.
    pub fn text(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).map(ContextValue::as_text)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Keys of task outputs, in completion order.
    pub fn task_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.source == ContextSource::Task)
            .map(|e| e.key.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render every entry as a `## key` section, for the agent prompt.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("## {}\n{}", e.key, e.value.as_text()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inputs_then_tasks_in_order() {
        let mut ctx = Context::from_inputs([("resume_text", "10 years of Go")]);
        ctx.record_task_output("profile_analysis_task", ContextValue::Text("senior backend".into()));
        ctx.record_task_output("market_research_task", ContextValue::Json(json!({"demand": "high"})));
        assert_eq!(
            ctx.keys(),
            vec!["resume_text", "profile_analysis_task", "market_research_task"]
        );
        assert_eq!(ctx.task_keys(), vec!["profile_analysis_task", "market_research_task"]);
    }

    #[test]
    fn test_never_overwrites() {
        let mut ctx = Context::from_inputs([("a", "first")]);
        ctx.record_task_output("a", ContextValue::Text("second".into()));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.text("a").unwrap(), "first");
    }

    #[test]
    fn test_render_sections() {
        let mut ctx = Context::from_inputs([("resume_text", "CV")]);
        ctx.record_task_output("t1", ContextValue::Json(json!({"k": 1})));
        let rendered = ctx.render();
        assert!(rendered.starts_with("## resume_text\nCV\n\n## t1\n"));
        assert!(rendered.contains("\"k\": 1"));
    }

    #[test]
    fn test_json_string_value_renders_plain() {
        let v = ContextValue::Json(json!("plain"));
        assert_eq!(v.as_text(), "plain");
    }
}
