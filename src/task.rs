//! Task definition.
//!
//! A [`Task`] is pure data: description and expected-output templates, the
//! role key of the agent that runs it, and the names of the upstream tasks
//! whose outputs it needs. Resolution against a [`Context`] has no side
//! effects.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::tasks::output_format::OutputFormat;
use crate::utilities::errors::TemplateError;
use crate::utilities::string_utils::interpolate_only;

const MARKDOWN_INSTRUCTION: &str = "\
Your final answer MUST be formatted in Markdown syntax.\n\
Follow these guidelines:\n\
- Use # for headers\n\
- Use ** for bold text\n\
- Use * for italic text\n\
- Use - or * for bullet points\n\
- Use `code` for inline code\n\
- Use ```language for code blocks";

// ---------------------------------------------------------------------------
// OutputSpec
// ---------------------------------------------------------------------------

/// What a task's result should look like.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputSpec {
    /// Free-form description of the expected result.
    Text(String),
    /// A JSON value matching `schema`.
    Schema { description: String, schema: Value },
}

impl OutputSpec {
    pub fn text(description: impl Into<String>) -> Self {
        OutputSpec::Text(description.into())
    }

    pub fn schema(description: impl Into<String>, schema: Value) -> Self {
        OutputSpec::Schema {
            description: description.into(),
            schema,
        }
    }

    /// The human-readable part of the expected output.
    pub fn description(&self) -> &str {
        match self {
            OutputSpec::Text(text) => text,
            OutputSpec::Schema { description, .. } => description,
        }
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, OutputSpec::Schema { .. })
    }

    /// Text shown to the model after `Expected Output:`.
    pub fn render(&self) -> String {
        match self {
            OutputSpec::Text(text) => text.clone(),
            OutputSpec::Schema { description, schema } => {
                let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
                if description.is_empty() {
                    format!("A JSON value matching this schema:\n{}", schema)
                } else {
                    format!("{}\nRespond with a JSON value matching this schema:\n{}", description, schema)
                }
            }
        }
    }
}

const SCHEMA_SPEC_FIELDS: &[&str] = &["description", "schema"];

impl<'de> Deserialize<'de> for OutputSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(OutputSpec::Text(text)),
            Value::Object(mut fields) => {
                if let Some(unknown) = fields.keys().find(|k| !SCHEMA_SPEC_FIELDS.contains(&k.as_str())) {
                    return Err(D::Error::unknown_field(unknown, SCHEMA_SPEC_FIELDS));
                }
                let schema = fields.remove("schema").ok_or_else(|| D::Error::missing_field("schema"))?;
                if !schema.is_object() {
                    return Err(D::Error::custom("schema must be a mapping"));
                }
                let description = match fields.remove("description") {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(description)) => description,
                    Some(_) => return Err(D::Error::custom("description must be a string")),
                };
                Ok(OutputSpec::Schema { description, schema })
            }
            _ => Err(D::Error::custom(
                "expected a string, or a mapping with `schema` and an optional `description`",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work bound to one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Unique within a crew; also the task's key in the run context.
    pub name: String,
    /// Description template with `{placeholder}`s resolved from the context.
    pub description: String,
    pub expected_output: OutputSpec,
    /// Role key of the responsible agent.
    pub agent: String,
    /// Upstream tasks whose outputs must exist before this task runs.
    pub context: Vec<String>,
    /// Ask for a Markdown-formatted answer.
    pub markdown: bool,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: OutputSpec,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output,
            agent: agent.into(),
            context: Vec::new(),
            markdown: false,
        }
    }

    /// Add an upstream dependency.
    pub fn depends_on(mut self, task: impl Into<String>) -> Self {
        self.context.push(task.into());
        self
    }

    pub fn markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    /// Substitute context values into the description template.
    pub fn resolve_description(&self, context: &Context) -> Result<String, TemplateError> {
        interpolate_only(&self.description, |key| context.text(key))
    }

    /// The expected output with placeholders in its description resolved.
    pub fn resolve_expected_output(&self, context: &Context) -> Result<OutputSpec, TemplateError> {
        Ok(match &self.expected_output {
            OutputSpec::Text(text) => {
                OutputSpec::Text(interpolate_only(text, |key| context.text(key))?)
            }
            OutputSpec::Schema { description, schema } => OutputSpec::Schema {
                description: interpolate_only(description, |key| context.text(key))?,
                schema: schema.clone(),
            },
        })
    }

    /// The task section of the agent's prompt: description, expected
    /// output and, for markdown tasks, formatting instructions.
    pub fn prompt(&self, context: &Context) -> Result<String, TemplateError> {
        let mut slices = vec![
            self.resolve_description(context)?,
            format!("Expected Output: {}", self.resolve_expected_output(context)?.render()),
        ];
        if self.markdown {
            slices.push(MARKDOWN_INSTRUCTION.to_string());
        }
        Ok(slices.join("\n"))
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.expected_output.is_schema() {
            OutputFormat::JSON
        } else if self.markdown {
            OutputFormat::Markdown
        } else {
            OutputFormat::Raw
        }
    }

    /// MD5 of the unresolved `description|expected_output`.
    pub fn key(&self) -> String {
        let source = format!("{}|{}", self.description, self.expected_output.render());
        let mut hasher = Md5::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task(name={}, agent={})", self.name, self.agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextValue;
    use crate::utilities::errors::TemplateErrorKind;
    use serde_json::json;

    fn task() -> Task {
        Task::new(
            "market_research_task",
            "Research roles matching {profile_analysis_task}. Resume: {resume_text}",
            OutputSpec::text("A list of {count} roles"),
            "tech_recruitment_researcher",
        )
        .depends_on("profile_analysis_task")
    }

    fn context() -> Context {
        let mut ctx = Context::from_inputs([("resume_text", "Go, k8s"), ("count", "5")]);
        ctx.record_task_output("profile_analysis_task", ContextValue::Text("Senior SRE".into()));
        ctx
    }

    #[test]
    fn test_resolve_description() {
        let text = task().resolve_description(&context()).unwrap();
        assert_eq!(text, "Research roles matching Senior SRE. Resume: Go, k8s");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (t, ctx) = (task(), context());
        assert_eq!(t.resolve_description(&ctx).unwrap(), t.resolve_description(&ctx).unwrap());
    }

    #[test]
    fn test_missing_placeholder() {
        let ctx = Context::from_inputs([("resume_text", "x")]);
        let err = task().resolve_description(&ctx).unwrap_err();
        assert_eq!(err.kind, TemplateErrorKind::MissingContextKey);
        assert_eq!(err.key, "profile_analysis_task");
    }

    #[test]
    fn test_resolve_expected_output() {
        let spec = task().resolve_expected_output(&context()).unwrap();
        assert_eq!(spec, OutputSpec::text("A list of 5 roles"));
    }

    #[test]
    fn test_prompt_with_markdown() {
        let prompt = task().markdown(true).prompt(&context()).unwrap();
        assert!(prompt.contains("Expected Output: A list of 5 roles"));
        assert!(prompt.contains("formatted in Markdown"));
        assert_eq!(task().markdown(true).output_format(), OutputFormat::Markdown);
    }

    #[test]
    fn test_key_is_stable() {
        assert_eq!(task().key(), task().key());
        assert_eq!(task().key().len(), 32);
    }

    #[test]
    fn test_output_spec_from_yaml() {
        let text: OutputSpec = serde_yaml::from_str("\"A report\"").unwrap();
        assert_eq!(text, OutputSpec::text("A report"));

        let schema: OutputSpec = serde_yaml::from_str(
            "description: Plan\nschema:\n  type: object\n  required: [steps]\n",
        )
        .unwrap();
        assert_eq!(
            schema,
            OutputSpec::schema("Plan", json!({"type": "object", "required": ["steps"]}))
        );
        assert_eq!(task().output_format(), OutputFormat::Raw);
    }

    #[test]
    fn test_output_spec_rejects_unknown_keys() {
        let err = serde_yaml::from_str::<OutputSpec>("schema: {type: object}\nformat: x\n").unwrap_err();
        assert!(err.to_string().contains("unknown field `format`"));
    }

    #[test]
    fn test_output_spec_errors_name_the_problem() {
        let err = serde_yaml::from_str::<OutputSpec>("description: Plan\n").unwrap_err();
        assert!(err.to_string().contains("missing field `schema`"));
        let err = serde_yaml::from_str::<OutputSpec>("schema: [steps]\n").unwrap_err();
        assert!(err.to_string().contains("schema must be a mapping"));
        let err = serde_yaml::from_str::<OutputSpec>("- a\n- b\n").unwrap_err();
        assert!(err.to_string().contains("expected a string"));
    }
}
