//! The agent reasoning loop and the parser for model responses.

pub mod crew_agent_executor;
pub mod parser;

pub use crew_agent_executor::CrewAgentExecutor;
pub use parser::{AgentAction, AgentFinish, OutputParserError, ParseResult};
