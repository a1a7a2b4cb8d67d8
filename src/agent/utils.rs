//! Prompt assembly for agent task execution.
//!
//! Builds the system and user messages of the reasoning loop, injects the
//! current date, and renders the planning request used when reasoning is
//! enabled.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;

use crate::context::Context;
use crate::llms::base_llm::LlmMessage;
use crate::tools::base_tool::ToolError;
use crate::tools::registry::ToolTable;

/// Default `date_format` for date injection.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// System message: identity plus the ReAct response format.
pub fn system_prompt(role: &str, goal: &str, backstory: &str, tools: &ToolTable) -> String {
    let mut prompt = format!("You are {}. {}\nYour personal goal is: {}", role, backstory, goal);

    if tools.is_empty() {
        prompt.push_str(
            "\n\nTo give my best complete final answer to the task respond using the exact following format:\n\n\
             Thought: I now can give a great answer\n\
             Final Answer: Your final answer must be the great and the most complete as possible, \
             it must be outcome described.\n\n\
             I MUST use these formats, my job depends on it!",
        );
        return prompt;
    }

    let names = tools.names().join(", ");
    let _ = write!(
        prompt,
        "\n\nYou ONLY have access to the following tools, and should NEVER make up tools that are not listed here:\n\n\
         {}\n\n\
         IMPORTANT: Use the following format in your response:\n\n\
         ```\n\
         Thought: you should always think about what to do\n\
         Action: the action to take, only one name of [{}], just the name, exactly as it's written.\n\
         Action Input: the input to the action, just a simple JSON object, enclosed in curly braces, using \" to wrap keys and values.\n\
         Observation: the result of the action\n\
         ```\n\n\
         Once all necessary information is gathered, return the following format:\n\n\
         ```\n\
         Thought: I now know the final answer\n\
         Final Answer: the final answer to the original input question\n\
         ```",
        tools.describe(),
        names
    );
    prompt
}

/// Append the current date line to a task prompt.
pub fn inject_date(task_prompt: &str, today: NaiveDate, date_format: &str) -> String {
    format!("{}\n\nCurrent Date: {}", task_prompt, format_date(today, date_format))
}

/// Format `date`, falling back to ISO format for a malformed pattern.
pub fn format_date(date: NaiveDate, date_format: &str) -> String {
    let mut out = String::new();
    if is_valid_date_format(date_format) && write!(out, "{}", date.format(date_format)).is_ok() {
        return out;
    }
    log::warn!("Invalid date_format '{}', using {}", date_format, DEFAULT_DATE_FORMAT);
    date.format(DEFAULT_DATE_FORMAT).to_string()
}

/// Whether `date_format` is a strftime pattern chrono can render.
pub fn is_valid_date_format(date_format: &str) -> bool {
    !StrftimeItems::new(date_format).any(|item| matches!(item, Item::Error))
}

/// Append a reasoning plan to a task prompt.
pub fn append_plan(task_prompt: &str, plan: &str) -> String {
    format!("{}\n\nReasoning Plan:\n{}", task_prompt, plan.trim())
}

/// Wrap the task prompt with the rendered run context.
pub fn format_task_with_context(task_prompt: &str, context: &Context) -> String {
    if context.is_empty() {
        return task_prompt.to_string();
    }
    format!(
        "Task: {}\n\nThis is the context you're working with:\n{}",
        task_prompt,
        context.render()
    )
}

/// Messages asking the model for a plan before it starts working.
pub fn planning_messages(role: &str, goal: &str, backstory: &str, task_prompt: &str) -> Vec<LlmMessage> {
    vec![
        LlmMessage::system(format!(
            "You are {}, a professional with the following background: {}\n\n\
             Your primary goal is: {}\n\n\
             As {}, you are creating a strategic plan for a task that requires your expertise.",
            role, backstory, goal, role
        )),
        LlmMessage::user(format!(
            "Create a detailed, step-by-step plan for the following task before you begin working on it.\n\n\
             {}\n\n\
             List the steps you will take, the information you need and how you will know you are done. \
             Respond with the plan only.",
            task_prompt
        )),
    ]
}

/// Observation text for a failed tool call.
pub fn tool_error_observation(tool: &str, error: &ToolError) -> String {
    format!(
        "Tool '{}' failed ({:?}): {}. You may retry with different input or continue without it.",
        tool, error.kind, error.message
    )
}
