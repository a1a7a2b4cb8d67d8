//! Agents: role identity, limits and task execution.

pub mod core;
pub mod utils;

pub use self::core::{Agent, ExecutionEnv, DEFAULT_MAX_ITER, DEFAULT_MAX_RETRY_LIMIT};
