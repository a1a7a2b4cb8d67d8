//! career-crew command-line runner.
//!
//! Loads the crew from a config directory, seeds the run with a resume and
//! prints the final strategy.
//!
//! # Usage
//!
//! ```bash
//! career-crew config/ resume.md
//! ```
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` / `OPENAI_BASE_URL`: model backend
//! - `FIRECRAWL_API_KEY` / `FIRECRAWL_BASE_URL`: web scraping tool
//! - `RUST_LOG`: log filter (default: "info,career_crew=debug")

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use career_crew::tools::FileReadTool;
use career_crew::{CancellationToken, CrewBase, OpenAiBackend, ToolRegistry};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,career_crew=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<()> {
    let mut args = std::env::args_os().skip(1);
    let (Some(config_dir), Some(profile_path)) = (args.next(), args.next()) else {
        bail!("usage: career-crew <config_dir> <profile_file>");
    };
    let config_dir = PathBuf::from(config_dir);
    let profile_path = PathBuf::from(profile_path);

    let resume_text = std::fs::read_to_string(&profile_path)
        .with_context(|| format!("failed to read profile {}", profile_path.display()))?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Interrupt received, stopping at the next step");
        handler_token.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let mut registry = ToolRegistry::with_builtin_tools();
    registry.register(Arc::new(FileReadTool::with_default_path(profile_path.clone())));

    let crew = CrewBase::load(&config_dir)
        .with_context(|| format!("invalid crew configuration in {}", config_dir.display()))?
        .with_registry(registry)
        .crew(Arc::new(OpenAiBackend::from_env()))?;
    tracing::info!("Loaded crew {} ({} tasks)", crew.key(), crew.tasks().len());

    let inputs = [
        ("resume_text".to_string(), resume_text),
        ("resume_path".to_string(), profile_path.display().to_string()),
    ];
    match crew.kickoff_with_cancel(inputs, cancel) {
        Ok(output) => {
            println!("{}", output.raw);
            Ok(())
        }
        Err(failure) => {
            for (task, state) in &failure.ledger {
                eprintln!("  {:<28} {:?}", task, state);
            }
            Err(failure.into())
        }
    }
}
