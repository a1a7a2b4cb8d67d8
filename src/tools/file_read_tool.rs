//! `read_file` tool: reads a local text file, optionally a line range.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde_json::{json, Value};

use super::base_tool::{optional_u64, primary_str, ToolAdapter, ToolError};

/// Reads the content of a local file.
///
/// Arguments: `file_path` (required unless a default path was configured),
/// `start_line` (1-based, default 1), `line_count` (default: to end of file).
#[derive(Debug, Clone, Default)]
pub struct FileReadTool {
    default_path: Option<PathBuf>,
}

impl FileReadTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tool that reads `path` when the model does not name a file.
    pub fn with_default_path(path: impl Into<PathBuf>) -> Self {
        Self {
            default_path: Some(path.into()),
        }
    }

    fn target(&self, args: &Value) -> Result<PathBuf, ToolError> {
        match primary_str(args, "file_path") {
            Ok(path) => Ok(PathBuf::from(path.trim())),
            Err(err) => self.default_path.clone().ok_or(err),
        }
    }
}

impl ToolAdapter for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the content of a local text file, such as a resume or profile export. \
         Optionally reads `line_count` lines starting at `start_line`."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Path of the file to read"},
                "start_line": {"type": "integer", "description": "1-based first line to read"},
                "line_count": {"type": "integer", "description": "Number of lines to read"}
            },
            "required": ["file_path"]
        })
    }

    fn invoke(&self, args: &Value) -> Result<String, ToolError> {
        let path = self.target(args)?;
        let start_line = optional_u64(args, "start_line")?.unwrap_or(1);
        if start_line == 0 {
            return Err(ToolError::invalid_input("'start_line' is 1-based and must be at least 1"));
        }
        let line_count = optional_u64(args, "line_count")?;

        log::debug!("read_file: {} (start_line={}, line_count={:?})", path.display(), start_line, line_count);

        let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::invalid_input(format!("file not found: {}", path.display())),
            ErrorKind::PermissionDenied => {
                ToolError::invalid_input(format!("permission denied: {}", path.display()))
            }
            ErrorKind::InvalidData => {
                ToolError::invalid_input(format!("file is not valid UTF-8 text: {}", path.display()))
            }
            _ => ToolError::upstream(format!("failed to read {}: {}", path.display(), e)),
        })?;

        if start_line == 1 && line_count.is_none() {
            return Ok(content);
        }

        let lines = content
            .lines()
            .skip((start_line - 1) as usize)
            .take(line_count.map_or(usize::MAX, |n| n as usize))
            .collect::<Vec<_>>();
        Ok(lines.join("\n"))
    }
}
