//! Output format of a task result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a task's final answer should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured JSON matching the task's schema.
    #[serde(rename = "json")]
    JSON,
    /// Markdown-formatted text.
    Markdown,
    /// Plain text.
    #[default]
    Raw,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::JSON => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Raw => write!(f, "raw"),
        }
    }
}
