//! # patchwork-core
//!
//! Core types for the Patchwork calculation agent.
//!
//! The agent takes a calculation identifier, pulls the calculation's inputs from
//! a coordinating server, runs one external command against them and uploads
//! whatever files the command produced.
//!
//! ## Wire model
//!
//! - A [`CalculationContext`] carries the named inputs of one calculation
//! - Binary inputs and outputs travel as [`Artifact`] records (data URIs)
//! - A [`CalculationResponse`] carries outputs plus the command's log lines

pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::AgentConfig;
pub use error::{CalcError, Result};
pub use fail_open::fail_open;
pub use types::*;
