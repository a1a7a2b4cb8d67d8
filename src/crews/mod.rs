//! Crew run results.

pub mod crew_output;

pub use crew_output::{CrewOutput, RunFailure};
