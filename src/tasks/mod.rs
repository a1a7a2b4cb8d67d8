//! Task results and their formats.

pub mod output_format;
pub mod task_output;

pub use output_format::OutputFormat;
pub use task_output::TaskOutput;
