//! Concrete LLM backends.

pub mod openai;

pub use openai::OpenAiBackend;
