//! Base tool definitions.
//!
//! A tool adapter is a stateless, synchronous function from structured
//! arguments to text. Failures are reported as [`ToolError`] and are fed back
//! to the model rather than aborting the agent.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Category of a tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    Timeout,
    InvalidInput,
    UpstreamFailure,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolErrorKind::Timeout => write!(f, "timeout"),
            ToolErrorKind::InvalidInput => write!(f, "invalid input"),
            ToolErrorKind::UpstreamFailure => write!(f, "upstream failure"),
        }
    }
}

/// Error raised by a tool invocation. Recoverable from the agent's view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidInput, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::UpstreamFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, message)
    }
}

// ---------------------------------------------------------------------------
// ToolAdapter trait
// ---------------------------------------------------------------------------

/// Uniform interface over external capabilities (file reading, scraping, ...).
///
/// Implementations keep no state between invocations and must be safe to
/// retry: the agent may invoke the same adapter again after a failure.
pub trait ToolAdapter: Send + Sync + fmt::Debug {
    /// The unique name the model uses to request this tool.
    fn name(&self) -> &str;

    /// Description used to tell the model how/when/why to use the tool.
    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments, shown to the model.
    fn args_schema(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    /// Run the tool.
    fn invoke(&self, args: &Value) -> Result<String, ToolError>;
}

/// Fetch a required string argument.
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_input(format!("missing required string argument '{}'", key)))
}

/// Key holding Action Input text that was not a JSON object.
pub const RAW_INPUT_KEY: &str = "input";

/// Fetch a tool's main string argument, falling back to the raw `input`
/// the model sent when it skipped the JSON object.
pub fn primary_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    required_str(args, key).or_else(|err| required_str(args, RAW_INPUT_KEY).map_err(|_| err))
}

/// Fetch an optional non-negative integer argument. Numeric strings are accepted.
pub fn optional_u64(args: &Value, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| ToolError::invalid_input(format!("'{}' must be a non-negative integer", key))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ToolError::invalid_input(format!("'{}' must be a non-negative integer", key))),
        Some(_) => Err(ToolError::invalid_input(format!("'{}' must be a non-negative integer", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let args = json!({"url": "https://example.com", "blank": "  "});
        assert_eq!(required_str(&args, "url").unwrap(), "https://example.com");
        assert_eq!(
            required_str(&args, "blank").unwrap_err().kind,
            ToolErrorKind::InvalidInput
        );
        assert!(required_str(&args, "missing").is_err());
    }

    #[test]
    fn test_optional_u64() {
        let args = json!({"a": 3, "b": "7", "c": -1, "d": null});
        assert_eq!(optional_u64(&args, "a").unwrap(), Some(3));
        assert_eq!(optional_u64(&args, "b").unwrap(), Some(7));
        assert!(optional_u64(&args, "c").is_err());
        assert_eq!(optional_u64(&args, "d").unwrap(), None);
        assert_eq!(optional_u64(&args, "zzz").unwrap(), None);
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::timeout("firecrawl took too long");
        assert_eq!(err.to_string(), "timeout: firecrawl took too long");
    }
}
