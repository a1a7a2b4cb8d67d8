//! The bounded reasoning/tool loop behind [`Agent::execute`](crate::agent::Agent::execute).
//!
//! Each iteration makes one backend completion and then either finishes,
//! runs one tool, or reports a format problem back to the model. The loop
//! stops on a final answer, after `max_iter` completions, when the agent's
//! deadline passes, or when the run is cancelled.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use super::parser::{self, AgentFinish, ParseResult, OBSERVATION};
use crate::agent::utils::tool_error_observation;
use crate::agent::ExecutionEnv;
use crate::llm::LLM;
use crate::llms::base_llm::{BackendError, CompletionRequest, LlmMessage};
use crate::tools::registry::ToolTable;
use crate::utilities::errors::{AgentError, AgentErrorKind};
use crate::utilities::rpm_controller::RPMController;

/// First retry delay for transient backend errors; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// CrewAgentExecutor
// ---------------------------------------------------------------------------

/// Runs one agent on one task.
pub struct CrewAgentExecutor<'a> {
    role: &'a str,
    llm: &'a LLM,
    tools: &'a ToolTable,
    rpm: Option<&'a RPMController>,
    env: &'a ExecutionEnv,
    max_iter: u32,
    max_retry_limit: u32,
    /// Absolute deadline on `env.clock`.
    deadline: Option<Duration>,
    /// Conversation history.
    pub messages: Vec<LlmMessage>,
    /// Backend completions made by the loop.
    pub iterations: u32,
    pub tool_calls: usize,
    pub tool_errors: usize,
}

impl fmt::Debug for CrewAgentExecutor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrewAgentExecutor")
            .field("role", &self.role)
            .field("tools", self.tools)
            .field("max_iter", &self.max_iter)
            .field("iterations", &self.iterations)
            .field("messages_count", &self.messages.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl<'a> CrewAgentExecutor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: &'a str,
        llm: &'a LLM,
        tools: &'a ToolTable,
        rpm: Option<&'a RPMController>,
        env: &'a ExecutionEnv,
        max_iter: u32,
        max_retry_limit: u32,
        max_execution_time: Option<Duration>,
    ) -> Self {
        Self {
            role,
            llm,
            tools,
            rpm,
            env,
            max_iter,
            max_retry_limit,
            deadline: max_execution_time.and_then(|limit| {
                let deadline = env.clock.now().checked_add(limit);
                if deadline.is_none() {
                    log::warn!("Agent '{}': max_execution_time {:?} is out of range, running without a deadline", role, limit);
                }
                deadline
            }),
            messages: Vec::new(),
            iterations: 0,
            tool_calls: 0,
            tool_errors: 0,
        }
    }

    /// Ask the model for a plan, up to `attempts` times.
    ///
    /// Returns the first non-empty plan. Planning calls do not count as
    /// loop iterations.
    pub fn plan(&mut self, planning: Vec<LlmMessage>, attempts: u32) -> Result<Option<String>, AgentError> {
        for attempt in 1..=attempts.max(1) {
            self.check_limits()?;
            let plan = self.complete(planning.clone())?;
            let plan = plan.trim();
            if !plan.is_empty() {
                log::debug!("Agent '{}' produced a plan on attempt {}", self.role, attempt);
                return Ok(Some(plan.to_string()));
            }
            log::debug!("Agent '{}' returned an empty plan (attempt {})", self.role, attempt);
        }
        Ok(None)
    }

    /// Run the loop on `messages` until a final answer or a limit.
    pub fn invoke(&mut self, messages: Vec<LlmMessage>) -> Result<AgentFinish, AgentError> {
        self.messages = messages;

        while self.iterations < self.max_iter {
            self.check_limits()?;
            let answer = self.complete(self.messages.clone())?;
            self.iterations += 1;
            log::debug!(
                "Agent '{}' iteration {}/{}: {} chars",
                self.role,
                self.iterations,
                self.max_iter,
                answer.len()
            );

            match parser::parse(&answer) {
                Ok(ParseResult::Finish(finish)) => {
                    self.messages.push(LlmMessage::assistant(answer));
                    return Ok(finish);
                }
                Ok(ParseResult::Action(action)) => {
                    let slot = self.tools.resolve(&action.tool)?;
                    let tool_name = self.tools.name_of(slot).to_string();
                    let args = action.tool_args();
                    log::debug!("Agent '{}' calling tool '{}' with {}", self.role, tool_name, args);

                    let adapter = self.tools.adapter(slot);
                    self.tool_calls += 1;
                    let observation = match self.bounded(&format!("tool '{}'", tool_name), move || {
                        adapter.invoke(&args)
                    })? {
                        Ok(output) => output,
                        Err(err) => {
                            self.tool_errors += 1;
                            log::warn!("Agent '{}': tool '{}' failed: {}", self.role, tool_name, err);
                            tool_error_observation(&tool_name, &err)
                        }
                    };
                    self.messages.push(LlmMessage::assistant(answer));
                    self.messages
                        .push(LlmMessage::user(format!("{} {}", OBSERVATION, observation)));
                }
                Err(err) => {
                    log::debug!("Agent '{}' produced unparseable output: {}", self.role, err);
                    self.messages.push(LlmMessage::assistant(answer));
                    self.messages.push(LlmMessage::user(err.error));
                }
            }
        }

        Err(AgentError::new(
            AgentErrorKind::IterationLimitExceeded,
            format!(
                "agent '{}' made {} completions without a final answer",
                self.role, self.max_iter
            ),
        ))
    }

    /// One rate-limited completion with bounded retries on transient errors.
    fn complete(&mut self, messages: Vec<LlmMessage>) -> Result<String, AgentError> {
        let request = CompletionRequest {
            messages,
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            stop: vec![format!("\n{}", OBSERVATION)],
        };

        let mut attempt: u32 = 0;
        loop {
            self.check_limits()?;
            if let Some(rpm) = self.rpm {
                rpm.acquire();
            }

            let backend = Arc::clone(&self.env.backend);
            let req = request.clone();
            let result: Result<String, BackendError> =
                self.bounded("LLM call", move || backend.complete(&req))?;

            match result {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && attempt < self.max_retry_limit => {
                    let backoff = INITIAL_BACKOFF * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    log::warn!(
                        "Agent '{}': backend {} ({}), retry {}/{} in {:?}",
                        self.role,
                        err.kind,
                        err.message,
                        attempt,
                        self.max_retry_limit,
                        backoff
                    );
                    self.env.clock.sleep(backoff);
                }
                Err(err) => {
                    return Err(AgentError::new(
                        AgentErrorKind::BackendUnavailable,
                        format!("{} after {} attempt(s): {}", self.env.backend.provider(), attempt + 1, err),
                    ));
                }
            }
        }
    }

    /// Run `call`, abandoning it if the deadline passes first.
    ///
    /// Without a deadline the call runs on the current thread. With one, it
    /// runs on a worker thread; an abandoned call keeps running but its
    /// result is dropped.
    fn bounded<T, F>(&self, what: &str, call: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let Some(deadline) = self.deadline else {
            return Ok(call());
        };
        let remaining = deadline.saturating_sub(self.env.clock.now());
        if remaining.is_zero() {
            return Err(self.timeout_error());
        }

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name(format!("agent-{}", self.role))
            .spawn(move || {
                let _ = tx.send(call());
            })
            .map_err(|e| {
                AgentError::new(AgentErrorKind::BackendUnavailable, format!("failed to spawn worker: {}", e))
            })?;

        let value = match rx.recv_timeout(remaining) {
            Ok(value) => value,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Agent '{}' abandoned an in-flight {}", self.role, what);
                return Err(self.timeout_error());
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(AgentError::new(
                    AgentErrorKind::BackendUnavailable,
                    format!("{} panicked", what),
                ));
            }
        };
        self.check_deadline()?;
        Ok(value)
    }

    fn check_limits(&self) -> Result<(), AgentError> {
        if self.env.cancel.is_cancelled() {
            return Err(AgentError::new(AgentErrorKind::Cancelled, "run cancelled"));
        }
        self.check_deadline()
    }

    fn check_deadline(&self) -> Result<(), AgentError> {
        match self.deadline {
            Some(deadline) if self.env.clock.now() >= deadline => Err(self.timeout_error()),
            _ => Ok(()),
        }
    }

    fn timeout_error(&self) -> AgentError {
        AgentError::new(
            AgentErrorKind::Timeout,
            format!("agent '{}' exceeded its max_execution_time", self.role),
        )
    }
}
