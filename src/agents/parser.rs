//! Parsing of ReAct-style model responses.
//!
//! A response is either a tool request:
//!
//! ```text
//! Thought: I should look at the job board
//! Action: scrape_website
//! Action Input: {"url": "https://example.com/jobs"}
//! ```
//!
//! or a final answer:
//!
//! ```text
//! Thought: I now know the final answer
//! Final Answer: ...
//! ```

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::base_tool::RAW_INPUT_KEY;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The text prefix for a final answer.
pub const FINAL_ANSWER_ACTION: &str = "Final Answer:";

/// Prefix of the message that reports a tool result back to the model.
pub const OBSERVATION: &str = "Observation:";

const MISSING_ACTION_AFTER_THOUGHT_ERROR_MESSAGE: &str =
    "I just got this: I couldn't find an Action after the Thought.";

const MISSING_ACTION_INPUT_AFTER_ACTION_ERROR_MESSAGE: &str =
    "I just got this: I found an Action but couldn't find a valid Action Input right after it.";

static ACTION_INPUT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:\s*(.+?)\s*(?:\n|\r\n?)Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)")
        .expect("valid regex")
});
static ACTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Action\s*\d*\s*:").expect("valid regex"));
static ACTION_INPUT_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Action\s*\d*\s*Input\s*\d*\s*:").expect("valid regex"));

// ---------------------------------------------------------------------------
// AgentAction / AgentFinish
// ---------------------------------------------------------------------------

/// A tool request from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub thought: String,
    /// Tool name as written by the model.
    pub tool: String,
    /// Raw tool input text.
    pub tool_input: String,
    /// The full response text.
    pub text: String,
}

impl AgentAction {
    /// Tool arguments as a JSON object.
    ///
    /// A JSON object is used as-is; anything else (plain text, arrays,
    /// scalars) is wrapped as `{"input": ...}`.
    pub fn tool_args(&self) -> Value {
        let input = self.tool_input.trim();
        match serde_json::from_str::<Value>(input) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(other) if !input.is_empty() => wrap_input(other),
            _ if input.is_empty() => Value::Object(Map::new()),
            _ => wrap_input(Value::String(input.to_string())),
        }
    }
}

fn wrap_input(value: Value) -> Value {
    let mut map = Map::new();
    map.insert(RAW_INPUT_KEY.to_string(), value);
    Value::Object(map)
}

/// The model's final answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFinish {
    pub thought: String,
    pub output: String,
    pub text: String,
}

/// Result of parsing a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    Action(AgentAction),
    Finish(AgentFinish),
}

// ---------------------------------------------------------------------------
// OutputParserError
// ---------------------------------------------------------------------------

/// The response did not follow the expected format. The message is meant to
/// be shown back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParserError {
    pub error: String,
}

impl OutputParserError {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

impl fmt::Display for OutputParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputParserError: {}", self.error)
    }
}

impl std::error::Error for OutputParserError {}

// ---------------------------------------------------------------------------
// Parse function
// ---------------------------------------------------------------------------

/// Parse a model response into an [`AgentAction`] or [`AgentFinish`].
pub fn parse(text: &str) -> Result<ParseResult, OutputParserError> {
    let thought = extract_thought(text);

    if text.contains(FINAL_ANSWER_ACTION) {
        let final_answer = text
            .rsplit(FINAL_ANSWER_ACTION)
            .next()
            .unwrap_or("")
            .trim();
        return Ok(ParseResult::Finish(AgentFinish {
            thought,
            output: clean_trailing_backticks(final_answer),
            text: text.to_string(),
        }));
    }

    if let Some(caps) = ACTION_INPUT_RE.captures(text) {
        let action = caps.get(1).map_or("", |m| m.as_str());
        let action_input = caps.get(2).map_or("", |m| m.as_str());
        // A model that ignores the stop sequence may hallucinate its own observation.
        let action_input = match action_input.find(OBSERVATION) {
            Some(idx) => &action_input[..idx],
            None => action_input,
        };
        let tool_input = action_input.trim().trim_matches('"');

        return Ok(ParseResult::Action(AgentAction {
            thought,
            tool: clean_action(action),
            tool_input: safe_repair_json(tool_input),
            text: text.to_string(),
        }));
    }

    if !ACTION_RE.is_match(text) {
        return Err(OutputParserError::new(format!(
            "{}\nYou MUST use the following format:\n\
             Thought: [your thought]\n\
             Final Answer: [your final answer]",
            MISSING_ACTION_AFTER_THOUGHT_ERROR_MESSAGE
        )));
    }

    if !ACTION_INPUT_ONLY_RE.is_match(text) {
        return Err(OutputParserError::new(
            MISSING_ACTION_INPUT_AFTER_ACTION_ERROR_MESSAGE,
        ));
    }

    Err(OutputParserError::new(
        "Could not parse the output. Please use the correct format.",
    ))
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn extract_thought(text: &str) -> String {
    let thought_index = text.find("\nAction").or_else(|| text.find("\nFinal Answer"));
    match thought_index {
        Some(idx) => text[..idx].replace("```", "").trim().to_string(),
        None => String::new(),
    }
}

fn clean_action(text: &str) -> String {
    text.trim().trim_matches('*').trim().to_string()
}

/// Drop an unmatched trailing ``` from a final answer.
fn clean_trailing_backticks(text: &str) -> String {
    if text.ends_with("```") && text.matches("```").count() % 2 != 0 {
        return text[..text.len() - 3].trim_end().to_string();
    }
    text.to_string()
}

/// Replace triple quotes when that turns the input into valid JSON.
fn safe_repair_json(tool_input: &str) -> String {
    if tool_input.starts_with('[') && tool_input.ends_with(']') {
        return tool_input.to_string();
    }
    let cleaned = tool_input.replace("\"\"\"", "\"");
    if serde_json::from_str::<Value>(&cleaned).is_ok() {
        return cleaned;
    }
    tool_input.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_final_answer() {
        let text = "Thought: I know the answer\nFinal Answer: The market favours SREs.";
        match parse(text).unwrap() {
            ParseResult::Finish(finish) => {
                assert_eq!(finish.output, "The market favours SREs.");
                assert_eq!(finish.thought, "Thought: I know the answer");
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_action_with_json_input() {
        let text = "Thought: read the resume\nAction: read_file\nAction Input: {\"file_path\": \"cv.md\"}";
        match parse(text).unwrap() {
            ParseResult::Action(action) => {
                assert_eq!(action.tool, "read_file");
                assert_eq!(action.tool_args(), json!({"file_path": "cv.md"}));
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_input_is_wrapped() {
        let text = "Thought: search\nAction: **scrape_website**\nAction Input: salaries in Berlin";
        match parse(text).unwrap() {
            ParseResult::Action(action) => {
                assert_eq!(action.tool, "scrape_website");
                assert_eq!(action.tool_args(), json!({"input": "salaries in Berlin"}));
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_hallucinated_observation_is_cut() {
        let text = "Thought: x\nAction: read_file\nAction Input: {\"file_path\": \"a\"}\nObservation: made up";
        match parse(text).unwrap() {
            ParseResult::Action(action) => assert_eq!(action.tool_input, "{\"file_path\": \"a\"}"),
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_final_answer_strips_unmatched_fence() {
        let text = "Thought: done\nFinal Answer: plan\n```";
        match parse(text).unwrap() {
            ParseResult::Finish(finish) => assert_eq!(finish.output, "plan"),
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_action() {
        let err = parse("Thought: I need to do something").unwrap_err();
        assert!(err.error.contains("couldn't find an Action"));
    }

    #[test]
    fn test_parse_missing_action_input() {
        let err = parse("Thought: x\nAction: read_file").unwrap_err();
        assert!(err.error.contains("Action Input"));
    }

    #[test]
    fn test_empty_input_is_empty_object() {
        let action = AgentAction {
            thought: String::new(),
            tool: "t".into(),
            tool_input: "  ".into(),
            text: String::new(),
        };
        assert_eq!(action.tool_args(), json!({}));
    }
}
