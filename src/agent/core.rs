//! Agent: a role-scoped wrapper around a language model with bound tools
//! and execution limits.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use md5::{Digest, Md5};
use once_cell::sync::OnceCell;

use super::utils;
use crate::agents::crew_agent_executor::CrewAgentExecutor;
use crate::context::Context;
use crate::llm::LLM;
use crate::llms::base_llm::{LlmBackend, LlmMessage};
use crate::task::Task;
use crate::tasks::task_output::TaskOutput;
use crate::tools::registry::ToolTable;
use crate::utilities::cancellation::CancellationToken;
use crate::utilities::clock::Clock;
use crate::utilities::output_validation::{validate_output, OutputPolicy};
use crate::utilities::rpm_controller::RPMController;
use crate::utilities::errors::AgentError;

/// Default bound on reasoning-loop completions.
pub const DEFAULT_MAX_ITER: u32 = 25;
/// Default retries for transient backend errors.
pub const DEFAULT_MAX_RETRY_LIMIT: u32 = 2;

/// Shared collaborators for one agent execution.
#[derive(Debug, Clone)]
pub struct ExecutionEnv {
    pub backend: Arc<dyn LlmBackend>,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancellationToken,
}

/// An agent bound to a role.
///
/// The role key is fixed at construction. Executions share nothing except
/// the rate-limit window: each call to [`execute`](Agent::execute) starts a
/// fresh conversation from the task and the context it is given.
pub struct Agent {
    key: String,
    /// Display role used in prompts.
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub llm: LLM,
    pub tools: ToolTable,
    /// Must stay false; delegation is not supported.
    pub allow_delegation: bool,
    pub max_iter: u32,
    pub max_execution_time: Option<Duration>,
    pub max_rpm: Option<u32>,
    pub max_retry_limit: u32,
    pub inject_date: bool,
    pub date_format: String,
    pub output_policy: OutputPolicy,
    rpm_controller: OnceCell<RPMController>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("key", &self.key)
            .field("role", &self.role)
            .field("llm", &self.llm)
            .field("tools", &self.tools)
            .field("max_iter", &self.max_iter)
            .field("max_execution_time", &self.max_execution_time)
            .field("max_rpm", &self.max_rpm)
            .finish()
    }
}

impl Agent {
    /// Agent identified by `key`, with the key as display role.
    pub fn new(key: impl Into<String>, goal: impl Into<String>, backstory: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            role: key.clone(),
            key,
            goal: goal.into(),
            backstory: backstory.into(),
            llm: LLM::default(),
            tools: ToolTable::empty(),
            allow_delegation: false,
            max_iter: DEFAULT_MAX_ITER,
            max_execution_time: None,
            max_rpm: None,
            max_retry_limit: DEFAULT_MAX_RETRY_LIMIT,
            inject_date: false,
            date_format: utils::DEFAULT_DATE_FORMAT.to_string(),
            output_policy: OutputPolicy::default(),
            rpm_controller: OnceCell::new(),
        }
    }

    /// The role key tasks refer to. Unique within a crew.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn llm(mut self, llm: LLM) -> Self {
        self.llm = llm;
        self
    }

    pub fn tools(mut self, tools: ToolTable) -> Self {
        self.tools = tools;
        self
    }

    pub fn max_iter(mut self, max_iter: u32) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn max_execution_time(mut self, limit: Duration) -> Self {
        self.max_execution_time = Some(limit);
        self
    }

    pub fn max_rpm(mut self, max_rpm: u32) -> Self {
        self.max_rpm = Some(max_rpm);
        self
    }

    pub fn max_retry_limit(mut self, retries: u32) -> Self {
        self.max_retry_limit = retries;
        self
    }

    pub fn inject_date(mut self, inject: bool) -> Self {
        self.inject_date = inject;
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn output_policy(mut self, policy: OutputPolicy) -> Self {
        self.output_policy = policy;
        self
    }

    /// MD5 of `role|goal|backstory`.
    pub fn agent_key(&self) -> String {
        let source = format!("{}|{}|{}", self.role, self.goal, self.backstory);
        let mut hasher = Md5::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The rate limiter, created on first use with the run's clock.
    fn rate_limiter(&self, clock: &Arc<dyn Clock>) -> Option<&RPMController> {
        self.max_rpm?;
        Some(
            self.rpm_controller
                .get_or_init(|| RPMController::new(self.max_rpm, Arc::clone(clock))),
        )
    }

    /// Run `task` against a read-only view of the run context.
    pub fn execute(&self, task: &Task, context: &Context, env: &ExecutionEnv) -> Result<TaskOutput, AgentError> {
        log::info!("Agent '{}' started task '{}'", self.key, task.name);

        let description = task.resolve_description(context)?;
        let expected = task.resolve_expected_output(context)?;
        let mut task_prompt = task.prompt(context)?;
        if self.inject_date {
            task_prompt = utils::inject_date(&task_prompt, env.clock.today(), &self.date_format);
        }

        let mut executor = CrewAgentExecutor::new(
            &self.role,
            &self.llm,
            &self.tools,
            self.rate_limiter(&env.clock),
            env,
            self.max_iter,
            self.max_retry_limit,
            self.max_execution_time,
        );

        if self.llm.reasoning {
            let planning = utils::planning_messages(&self.role, &self.goal, &self.backstory, &task_prompt);
            let attempts = self.llm.max_reasoning_attempts.unwrap_or(1);
            if let Some(plan) = executor.plan(planning, attempts)? {
                task_prompt = utils::append_plan(&task_prompt, &plan);
            }
        }

        let messages = vec![
            LlmMessage::system(utils::system_prompt(&self.role, &self.goal, &self.backstory, &self.tools)),
            LlmMessage::user(utils::format_task_with_context(&task_prompt, context)),
        ];
        let finish = executor.invoke(messages)?;
        let validated = validate_output(&finish.output, &expected, self.output_policy)?;

        let mut output = TaskOutput::new(&task.name, description, &self.role, validated.raw, task.output_format());
        output.expected_output = expected.render();
        output.json = validated.json;
        output.iterations = executor.iterations as usize;
        output.tool_calls = executor.tool_calls;
        output.tool_errors = executor.tool_errors;
        output.messages = std::mem::take(&mut executor.messages);

        log::info!(
            "Agent '{}' finished task '{}' after {} iteration(s)",
            self.key,
            task.name,
            output.iterations
        );
        Ok(output)
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Agent(role={}, llm={})", self.role, self.llm.model)
    }
}
