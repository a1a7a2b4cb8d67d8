//! Crew: the validated set of agents and tasks, and the runs it starts.
//!
//! A [`CrewBuilder`] collects agents and tasks and checks every binding
//! eagerly in [`build`](CrewBuilder::build). The resulting [`Crew`] is an
//! immutable descriptor; each [`Crew::start`] produces a single-use [`Run`]
//! with a fresh context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{utils::is_valid_date_format, Agent, ExecutionEnv};
use crate::context::Context;
use crate::crews::crew_output::{CrewOutput, RunFailure};
use crate::llms::base_llm::LlmBackend;
use crate::process::Process;
use crate::task::Task;
use crate::tasks::task_output::TaskOutput;
use crate::utilities::cancellation::CancellationToken;
use crate::utilities::clock::{Clock, SystemClock};
use crate::utilities::errors::{AgentErrorKind, ConfigError, ConfigErrorKind, RunError};

/// Called after every completed task.
pub type TaskCallback = Arc<dyn Fn(&TaskOutput) + Send + Sync>;

/// Execution state of one task within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    /// Failed with the given error message.
    Failed(String),
}

// ---------------------------------------------------------------------------
// CrewBuilder
// ---------------------------------------------------------------------------

/// Collects agents and tasks, then validates them into a [`Crew`].
pub struct CrewBuilder {
    name: Option<String>,
    backend: Arc<dyn LlmBackend>,
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    process: Process,
    clock: Option<Arc<dyn Clock>>,
    max_run_time: Option<Duration>,
    task_callback: Option<TaskCallback>,
}

impl CrewBuilder {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            name: None,
            backend,
            agents: Vec::new(),
            tasks: Vec::new(),
            process: Process::default(),
            clock: None,
            max_run_time: None,
            task_callback: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    /// Add a task. Tasks run in the order they are added.
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    /// Time source for deadlines, rate limits and date injection.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Budget for a whole run, checked between tasks.
    pub fn max_run_time(mut self, limit: Duration) -> Self {
        self.max_run_time = Some(limit);
        self
    }

    pub fn task_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskOutput) + Send + Sync + 'static,
    {
        self.task_callback = Some(Arc::new(callback));
        self
    }

    /// Validate every binding and produce the crew.
    pub fn build(self) -> Result<Crew, ConfigError> {
        for (i, agent) in self.agents.iter().enumerate() {
            let path = format!("agents.{}", agent.key());
            if self.agents[..i].iter().any(|a| a.key() == agent.key()) {
                return Err(ConfigError::new(
                    ConfigErrorKind::DuplicateName,
                    path,
                    format!("agent '{}' is declared twice", agent.key()),
                ));
            }
            if agent.allow_delegation {
                return Err(ConfigError::invalid_schema(
                    format!("{}.allow_delegation", path),
                    "delegation is not supported",
                ));
            }
            if agent.max_iter == 0 {
                return Err(ConfigError::invalid_schema(
                    format!("{}.max_iter", path),
                    "max_iter must be at least 1",
                ));
            }
            if !is_valid_date_format(&agent.date_format) {
                return Err(ConfigError::invalid_schema(
                    format!("{}.date_format", path),
                    format!("'{}' is not a valid date format", agent.date_format),
                ));
            }
        }

        if self.tasks.is_empty() {
            return Err(ConfigError::missing_field("tasks", "a crew needs at least one task"));
        }

        let mut task_agents = Vec::with_capacity(self.tasks.len());
        for (i, task) in self.tasks.iter().enumerate() {
            let path = format!("tasks.{}", task.name);
            let earlier = &self.tasks[..i];
            if earlier.iter().any(|t| t.name == task.name) {
                return Err(ConfigError::new(
                    ConfigErrorKind::DuplicateName,
                    path,
                    format!("task '{}' is declared twice", task.name),
                ));
            }

            let agent_idx = self
                .agents
                .iter()
                .position(|a| a.key() == task.agent)
                .ok_or_else(|| {
                    ConfigError::missing_field(
                        format!("{}.agent", path),
                        format!("agent '{}' is not declared", task.agent),
                    )
                })?;
            task_agents.push(agent_idx);

            for (j, dep) in task.context.iter().enumerate() {
                let dep_path = format!("{}.context[{}]", path, j);
                if earlier.iter().any(|t| &t.name == dep) {
                    continue;
                }
                if self.tasks[i..].iter().any(|t| &t.name == dep) {
                    return Err(ConfigError::new(
                        ConfigErrorKind::DependencyOrderViolation,
                        dep_path,
                        format!("task '{}' depends on '{}', which is not declared before it", task.name, dep),
                    ));
                }
                return Err(ConfigError::missing_field(
                    dep_path,
                    format!("task '{}' depends on undeclared task '{}'", task.name, dep),
                ));
            }
        }

        let unused: Vec<&str> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(i, _)| !task_agents.contains(i))
            .map(|(_, a)| a.key())
            .collect();
        if !unused.is_empty() {
            log::warn!("Agents without tasks: {}", unused.join(", "));
        }

        Ok(Crew {
            id: Uuid::new_v4(),
            name: self.name,
            backend: self.backend,
            agents: self.agents,
            tasks: self.tasks,
            task_agents,
            process: self.process,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            max_run_time: self.max_run_time,
            task_callback: self.task_callback,
        })
    }
}

// ---------------------------------------------------------------------------
// Crew
// ---------------------------------------------------------------------------

/// A validated, immutable crew.
pub struct Crew {
    pub id: Uuid,
    pub name: Option<String>,
    backend: Arc<dyn LlmBackend>,
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    /// Index into `agents` for each task.
    task_agents: Vec<usize>,
    pub process: Process,
    clock: Arc<dyn Clock>,
    max_run_time: Option<Duration>,
    task_callback: Option<TaskCallback>,
}

impl fmt::Debug for Crew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crew")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("agents", &self.agents.iter().map(Agent::key).collect::<Vec<_>>())
            .field("tasks", &self.tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>())
            .field("process", &self.process)
            .field("max_run_time", &self.max_run_time)
            .finish()
    }
}

impl Crew {
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// MD5 over agent and task keys; stable across builds of the same config.
    pub fn key(&self) -> String {
        let mut source: Vec<String> = self.agents.iter().map(Agent::agent_key).collect();
        source.extend(self.tasks.iter().map(Task::key));
        let mut hasher = Md5::new();
        hasher.update(source.join("|").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Run every task with `inputs` seeding the context.
    pub fn kickoff<I, K, V>(&self, inputs: I) -> Result<CrewOutput, RunFailure>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.kickoff_with_cancel(inputs, CancellationToken::new())
    }

    /// Like [`kickoff`](Crew::kickoff), stopping early once `cancel` fires.
    pub fn kickoff_with_cancel<I, K, V>(&self, inputs: I, cancel: CancellationToken) -> Result<CrewOutput, RunFailure>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.start(inputs, cancel)?.execute()
    }

    /// Prepare a run: fresh context seeded with `inputs`, every task pending.
    pub fn start<I, K, V>(&self, inputs: I, cancel: CancellationToken) -> Result<Run<'_>, RunFailure>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let run = Run {
            crew: self,
            id: Uuid::new_v4(),
            context: Context::from_inputs(inputs),
            states: vec![TaskState::Pending; self.tasks.len()],
            outputs: Vec::with_capacity(self.tasks.len()),
            env: ExecutionEnv {
                backend: Arc::clone(&self.backend),
                clock: Arc::clone(&self.clock),
                cancel,
            },
        };

        let shadowed = run
            .context
            .keys()
            .into_iter()
            .find(|k| self.tasks.iter().any(|t| t.name == *k))
            .map(str::to_string);
        if let Some(key) = shadowed {
            return Err(run.fail(None, RunError::InputShadowsTask { key }));
        }
        Ok(run)
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// One execution of a crew. Consumed by [`execute`](Run::execute).
pub struct Run<'a> {
    crew: &'a Crew,
    id: Uuid,
    context: Context,
    states: Vec<TaskState>,
    outputs: Vec<TaskOutput>,
    env: ExecutionEnv,
}

impl fmt::Debug for Run<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.id)
            .field("states", &self.states)
            .field("context_keys", &self.context.keys())
            .finish()
    }
}

impl<'a> Run<'a> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// `(task name, state)` for every task in declaration order.
    pub fn ledger(&self) -> Vec<(String, TaskState)> {
        self.crew
            .tasks
            .iter()
            .zip(&self.states)
            .map(|(t, s)| (t.name.clone(), s.clone()))
            .collect()
    }

    /// Execute the tasks in declaration order.
    ///
    /// The first failure stops the run; later tasks stay `Pending`.
    pub fn execute(mut self) -> Result<CrewOutput, RunFailure> {
        let crew = self.crew;
        let started = self.env.clock.now();
        log::info!(
            "Run {} started: {} task(s), process {}",
            self.id,
            crew.tasks.len(),
            crew.process
        );

        for (idx, task) in crew.tasks.iter().enumerate() {
            if self.env.cancel.is_cancelled() {
                log::warn!("Run {} cancelled before task '{}'", self.id, task.name);
                return Err(self.fail(None, RunError::Cancelled));
            }
            if let Some(limit) = crew.max_run_time {
                let elapsed = self.env.clock.now().saturating_sub(started);
                if elapsed >= limit {
                    log::warn!("Run {} exceeded its time budget before task '{}'", self.id, task.name);
                    return Err(self.fail(None, RunError::Timeout { elapsed }));
                }
            }
            debug_assert!(task
                .context
                .iter()
                .all(|dep| self.context.contains(dep)));

            let agent = &crew.agents[crew.task_agents[idx]];
            self.states[idx] = TaskState::Running;
            log::info!("Task '{}' running with agent '{}'", task.name, agent.key());

            match agent.execute(task, &self.context, &self.env) {
                Ok(output) => {
                    self.context.record_task_output(&task.name, output.context_value());
                    self.states[idx] = TaskState::Completed;
                    log::info!("Task '{}' completed", task.name);
                    if let Some(callback) = &crew.task_callback {
                        callback(&output);
                    }
                    self.outputs.push(output);
                }
                Err(err) => {
                    log::error!("Task '{}' failed: {}", task.name, err);
                    self.states[idx] = TaskState::Failed(err.to_string());
                    let error = if err.kind == AgentErrorKind::Cancelled {
                        RunError::Cancelled
                    } else {
                        RunError::Task {
                            task: task.name.clone(),
                            source: err,
                        }
                    };
                    return Err(self.fail(Some(task.name.clone()), error));
                }
            }
        }

        log::info!("Run {} completed", self.id);
        let (raw, json) = self
            .outputs
            .last()
            .map(|last| (last.raw.clone(), last.json.clone()))
            .unwrap_or_default();
        Ok(CrewOutput {
            run_id: self.id,
            raw,
            json,
            tasks_output: self.outputs,
            context: self.context,
        })
    }

    fn fail(self, task: Option<String>, error: RunError) -> RunFailure {
        let ledger = self.ledger();
        RunFailure {
            run_id: self.id,
            task,
            error,
            context: self.context,
            completed_prefix: self.outputs,
            ledger,
        }
    }
}
