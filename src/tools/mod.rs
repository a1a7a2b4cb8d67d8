//! Tool adapters available to agents.
//!
//! - `base_tool`: the [`ToolAdapter`] trait and [`ToolError`].
//! - `registry`: crew-wide [`ToolRegistry`] and per-agent [`ToolTable`].
//! - `file_read_tool` / `scrape_website_tool`: the built-in adapters.

pub mod base_tool;
pub mod file_read_tool;
pub mod registry;
pub mod scrape_website_tool;

pub use base_tool::{ToolAdapter, ToolError, ToolErrorKind};
pub use file_read_tool::FileReadTool;
pub use registry::{ToolRegistry, ToolSlot, ToolTable};
pub use scrape_website_tool::ScrapeWebsiteTool;
