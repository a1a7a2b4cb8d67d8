//! Shared utilities: errors, templating, time, cancellation, rate limiting
//! and output validation.

pub mod cancellation;
pub mod clock;
pub mod errors;
pub mod output_validation;
pub mod rpm_controller;
pub mod runtime;
pub mod string_utils;
