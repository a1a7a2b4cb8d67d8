//! Results of a crew run: the final output on success, or the failure
//! report with everything produced before the failing task.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::context::Context;
use crate::crew::TaskState;
use crate::tasks::task_output::TaskOutput;
use crate::utilities::errors::RunError;

/// The result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct CrewOutput {
    pub run_id: Uuid,
    /// Raw text of the final task.
    pub raw: String,
    /// Structured output of the final task, if any.
    pub json: Option<Value>,
    /// Output of each task, in execution order.
    pub tasks_output: Vec<TaskOutput>,
    /// Initial inputs plus every task output.
    pub context: Context,
}

impl CrewOutput {
    /// Look up a key in the final task's JSON output.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.json.as_ref().and_then(|json| json.get(key))
    }

    /// Output of the task named `name`.
    pub fn task_output(&self, name: &str) -> Option<&TaskOutput> {
        self.tasks_output.iter().find(|t| t.name == name)
    }
}

impl fmt::Display for CrewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.json {
            Some(json) => write!(f, "{}", json),
            None => write!(f, "{}", self.raw),
        }
    }
}

/// A run that stopped early.
#[derive(Debug, Clone, Error)]
#[error("run {run_id} failed{}: {error}", .task.as_deref().map(|t| format!(" at task '{}'", t)).unwrap_or_default())]
pub struct RunFailure {
    pub run_id: Uuid,
    /// The task that was running, if the failure happened inside one.
    pub task: Option<String>,
    #[source]
    pub error: RunError,
    /// Context accumulated before the failure.
    pub context: Context,
    /// Outputs of the tasks that completed, in order.
    pub completed_prefix: Vec<TaskOutput>,
    /// Final state of every task, in declaration order.
    pub ledger: Vec<(String, TaskState)>,
}

impl RunFailure {
    pub fn state_of(&self, task: &str) -> Option<&TaskState> {
        self.ledger.iter().find(|(name, _)| name == task).map(|(_, state)| state)
    }
}
