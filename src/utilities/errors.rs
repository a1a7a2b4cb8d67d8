//! Error types for crew configuration, templating, agents and runs.
//!
//! Tool and backend errors live next to their traits
//! (`tools::base_tool::ToolError`, `llms::base_llm::BackendError`).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Category of a configuration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The document does not have the expected shape.
    InvalidSchema,
    /// A required field, or a referenced agent/tool/task, is missing.
    MissingField,
    /// A task depends on a task that is not declared before it.
    DependencyOrderViolation,
    /// Two agents or two tasks share a name.
    DuplicateName,
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorKind::InvalidSchema => write!(f, "invalid schema"),
            ConfigErrorKind::MissingField => write!(f, "missing field"),
            ConfigErrorKind::DependencyOrderViolation => write!(f, "dependency order violation"),
            ConfigErrorKind::DuplicateName => write!(f, "duplicate name"),
        }
    }
}

/// Load-time failure. Fatal to crew construction.
#[derive(Debug, Clone, Error)]
#[error("{kind} at '{path}': {message}")]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    /// Dotted location of the offending entry, e.g. `tasks.market_research_task.agent`.
    pub path: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::InvalidSchema, path, message)
    }

    pub fn missing_field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::MissingField, path, message)
    }
}

// ---------------------------------------------------------------------------
// TemplateError
// ---------------------------------------------------------------------------

/// Category of a template resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateErrorKind {
    MissingContextKey,
}

/// A placeholder could not be resolved against the context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("template placeholder '{{{key}}}' has no value in the context")]
pub struct TemplateError {
    pub kind: TemplateErrorKind,
    pub key: String,
}

impl TemplateError {
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self {
            kind: TemplateErrorKind::MissingContextKey,
            key: key.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentError
// ---------------------------------------------------------------------------

/// Category of an agent execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    /// The model asked for a tool that is not bound to the agent.
    UnknownTool,
    /// The reasoning loop ran out of iterations without a final answer.
    IterationLimitExceeded,
    /// `max_execution_time` elapsed.
    Timeout,
    /// The final answer did not satisfy the expected output under a strict policy.
    OutputValidationFailed,
    /// The backend kept failing after retries, or failed permanently.
    BackendUnavailable,
    /// The run was cancelled while the agent was working.
    Cancelled,
    /// The task description could not be resolved against the context.
    Template,
}

impl fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentErrorKind::UnknownTool => "unknown tool",
            AgentErrorKind::IterationLimitExceeded => "iteration limit exceeded",
            AgentErrorKind::Timeout => "timeout",
            AgentErrorKind::OutputValidationFailed => "output validation failed",
            AgentErrorKind::BackendUnavailable => "backend unavailable",
            AgentErrorKind::Cancelled => "cancelled",
            AgentErrorKind::Template => "template error",
        };
        f.write_str(s)
    }
}

/// Failure of a single agent execution. Fatal to the owning task.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
    /// Set when `kind` is `Template`.
    #[source]
    pub template: Option<TemplateError>,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            template: None,
        }
    }
}

impl From<TemplateError> for AgentError {
    fn from(err: TemplateError) -> Self {
        Self {
            kind: AgentErrorKind::Template,
            message: err.to_string(),
            template: Some(err),
        }
    }
}

// ---------------------------------------------------------------------------
// RunError
// ---------------------------------------------------------------------------

/// Why a run stopped before producing its final output.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// A task failed; the pipeline halted at that task.
    #[error("task '{task}' failed: {source}")]
    Task {
        task: String,
        #[source]
        source: AgentError,
    },

    /// The cancellation token fired between tasks.
    #[error("run cancelled")]
    Cancelled,

    /// The run-level time budget elapsed between tasks.
    #[error("run exceeded its time budget after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// An initial input uses the same key as a task.
    #[error("initial input '{key}' shadows the output key of a task")]
    InputShadowsTask { key: String },
}

impl RunError {
    /// The agent error kind, when the run failed inside a task.
    pub fn agent_error_kind(&self) -> Option<AgentErrorKind> {
        match self {
            RunError::Task { source, .. } => Some(source.kind),
            _ => None,
        }
    }

    /// The unresolved placeholder, when a task prompt referenced a missing key.
    pub fn template_error(&self) -> Option<&TemplateError> {
        match self {
            RunError::Task { source, .. } => source.template.as_ref(),
            _ => None,
        }
    }
}
