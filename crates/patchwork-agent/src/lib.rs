//! # patchwork-agent
//!
//! Everything that crosses the boundary to the coordinating server.
//!
//! - [`CoordinatorClient`] fetches calculation contexts and uploads results
//! - [`codec`] turns files into data-URI artifacts and back
//! - [`sniff`] detects content types from file bytes
//!
//! The [`Coordinator`] trait is the seam the orchestrator is written against,
//! so pipelines can run against [`MockCoordinator`] in tests.

mod auth;
mod client;
pub mod codec;
pub mod sniff;

pub use auth::{resolve_token, TOKEN_ENV};
pub use client::{Coordinator, CoordinatorClient, MockCoordinator};
pub use sniff::detect_content_type;
