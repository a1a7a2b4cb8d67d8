//! LLM backend abstraction and providers.

pub mod base_llm;
pub mod providers;

pub use base_llm::{
    BackendError, BackendErrorKind, CompletionRequest, LlmBackend, LlmMessage, MessageRole,
};
pub use providers::OpenAiBackend;
