//! # career-crew
//!
//! A small crew orchestration engine. Role-scoped agents backed by a
//! language model, optionally with tools, run a fixed sequence of tasks.
//! Each task sees the run inputs and the outputs of every task before it;
//! the output of the last task is the result of the run.
//!
//! ```no_run
//! use std::sync::Arc;
//! use career_crew::{CrewBase, OpenAiBackend};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let crew = CrewBase::load("config")?.crew(Arc::new(OpenAiBackend::from_env()))?;
//! let output = crew.kickoff([("resume_text", "...")])?;
//! println!("{}", output.raw);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agents;
pub mod context;
pub mod crew;
pub mod crews;
pub mod llm;
pub mod llms;
pub mod process;
pub mod project;
pub mod task;
pub mod tasks;
pub mod tools;
pub mod utilities;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Agent, ExecutionEnv};
pub use context::{Context, ContextValue};
pub use crew::{Crew, CrewBuilder, Run, TaskState};
pub use crews::crew_output::{CrewOutput, RunFailure};
pub use llm::LLM;
pub use llms::base_llm::{BackendError, BackendErrorKind, LlmBackend};
pub use llms::providers::openai::OpenAiBackend;
pub use process::Process;
pub use project::CrewBase;
pub use task::{OutputSpec, Task};
pub use tasks::task_output::TaskOutput;
pub use tools::base_tool::{ToolAdapter, ToolError, ToolErrorKind};
pub use tools::registry::{ToolRegistry, ToolTable};
pub use utilities::cancellation::CancellationToken;
pub use utilities::clock::{Clock, ManualClock, SystemClock};
pub use utilities::errors::{AgentError, AgentErrorKind, ConfigError, ConfigErrorKind, RunError, TemplateError};
pub use utilities::output_validation::OutputPolicy;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
