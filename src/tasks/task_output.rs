//! Result of one task execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::output_format::OutputFormat;
use crate::context::ContextValue;
use crate::llms::base_llm::LlmMessage;

/// The result of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Task name.
    pub name: String,
    /// Resolved task description.
    pub description: String,
    /// Resolved expected output, as shown to the agent.
    pub expected_output: String,
    /// First ten words of the description.
    pub summary: String,
    /// The final answer text.
    pub raw: String,
    /// Structured answer, when the task asked for JSON and got it.
    pub json: Option<Value>,
    /// Role of the agent that produced the answer.
    pub agent: String,
    pub output_format: OutputFormat,
    /// Backend completions used by the reasoning loop.
    pub iterations: usize,
    pub tool_calls: usize,
    pub tool_errors: usize,
    /// The conversation with the model.
    #[serde(default)]
    pub messages: Vec<LlmMessage>,
}

impl TaskOutput {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        agent: impl Into<String>,
        raw: impl Into<String>,
        output_format: OutputFormat,
    ) -> Self {
        let description = description.into();
        Self {
            name: name.into(),
            summary: Self::generate_summary(&description),
            description,
            expected_output: String::new(),
            raw: raw.into(),
            json: None,
            agent: agent.into(),
            output_format,
            iterations: 0,
            tool_calls: 0,
            tool_errors: 0,
            messages: Vec::new(),
        }
    }

    fn generate_summary(description: &str) -> String {
        let excerpt: String = description
            .split_whitespace()
            .take(10)
            .collect::<Vec<&str>>()
            .join(" ");
        format!("{}...", excerpt)
    }

    /// The value recorded in the run context: JSON when present, else the text.
    pub fn context_value(&self) -> ContextValue {
        match &self.json {
            Some(json) => ContextValue::Json(json.clone()),
            None => ContextValue::Text(self.raw.clone()),
        }
    }
}

impl fmt::Display for TaskOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.json {
            Some(json) => write!(f, "{}", json),
            None => write!(f, "{}", self.raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_truncates_description() {
        let out = TaskOutput::new(
            "t",
            "one two three four five six seven eight nine ten eleven",
            "Profiler",
            "raw",
            OutputFormat::Raw,
        );
        assert_eq!(out.summary, "one two three four five six seven eight nine ten...");
    }

    #[test]
    fn test_context_value_prefers_json() {
        let mut out = TaskOutput::new("t", "d", "a", "{\"x\": 1}", OutputFormat::JSON);
        assert_eq!(out.context_value(), ContextValue::Text("{\"x\": 1}".into()));
        out.json = Some(json!({"x": 1}));
        assert_eq!(out.context_value(), ContextValue::Json(json!({"x": 1})));
        assert_eq!(out.to_string(), "{\"x\":1}");
    }
}
