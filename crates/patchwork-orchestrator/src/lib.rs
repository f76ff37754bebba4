//! # patchwork-orchestrator
//!
//! Job execution pipeline for the Patchwork calculation agent.
//!
//! This crate provides:
//! - Input materialization into a job's working directory
//! - Command execution with a deadline and tee'd output capture
//! - Change detection and result packaging
//! - [`run_calculation`], which ties the stages together against any
//!   [`patchwork_agent::Coordinator`]

mod orchestrator;
pub mod package;
pub mod runner;
pub mod tee;
pub mod workspace;

pub use orchestrator::{run_calculation, CalculationJob};
pub use package::{package, trim_and_split};
pub use runner::{ProcessOutput, TIMEOUT_MESSAGE};
pub use workspace::{changed_files, materialize};
