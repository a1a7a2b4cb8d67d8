//! Per-agent language model configuration.
//!
//! An [`LLM`] is pure configuration (model identifier, temperature,
//! reasoning mode). The actual inference goes through an
//! [`LlmBackend`](crate::llms::base_llm::LlmBackend) shared by the crew.

use serde::{Deserialize, Serialize};

/// Default model for agents that do not name one.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Language model settings bound to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LLM {
    /// Model identifier. The OpenAI backend drops a leading `openai/`; any
    /// other value is sent as-is to the configured endpoint.
    pub model: String,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Whether the agent plans before entering its tool loop.
    #[serde(default)]
    pub reasoning: bool,
    /// Maximum planning calls when `reasoning` is set.
    #[serde(default)]
    pub max_reasoning_attempts: Option<u32>,
}

impl Default for LLM {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

impl LLM {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            reasoning: false,
            max_reasoning_attempts: None,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn reasoning(mut self, reasoning: bool) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn max_reasoning_attempts(mut self, attempts: u32) -> Self {
        self.max_reasoning_attempts = Some(attempts);
        self
    }
}

impl std::fmt::Display for LLM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LLM(model={})", self.model)
    }
}
