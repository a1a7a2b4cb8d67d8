//! Base LLM backend interface.
//!
//! The crew consumes a language model only through [`LlmBackend`]: a list of
//! chat messages plus model settings in, completion text out.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One completion request: the prompt (as messages) plus model settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<LlmMessage>,
    pub model: String,
    pub temperature: Option<f64>,
    /// Sequences at which the model should stop generating.
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// Content of the last user message, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

/// Category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    RateLimited,
    Timeout,
    InvalidResponse,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::RateLimited => write!(f, "rate limited"),
            BackendErrorKind::Timeout => write!(f, "timeout"),
            BackendErrorKind::InvalidResponse => write!(f, "invalid response"),
        }
    }
}

/// Error returned by an LLM backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Rate limits and timeouts are worth retrying; malformed responses are not.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, BackendErrorKind::RateLimited | BackendErrorKind::Timeout)
    }
}

// ---------------------------------------------------------------------------
// LlmBackend trait
// ---------------------------------------------------------------------------

/// Language-model inference backend.
///
/// Implementations should handle authentication themselves and report
/// throttling, timeouts and malformed responses through [`BackendError`].
pub trait LlmBackend: Send + Sync + fmt::Debug {
    /// Produce a completion for `request`.
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;

    /// Short provider name for logs.
    fn provider(&self) -> &str {
        "custom"
    }
}
