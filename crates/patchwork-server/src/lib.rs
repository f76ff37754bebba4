//! # patchwork-server
//!
//! Service mode for the Patchwork calculation agent.
//! Each POST to `/` triggers one calculation in its own scratch directory,
//! with at most `concurrency` calculations running at once.

mod gate;
mod server;
pub mod trigger;

pub use gate::AdmissionGate;
pub use server::{router, serve};

use patchwork_core::AgentConfig;
use std::path::PathBuf;
use tracing::info;

/// Configuration for the trigger server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Command, coordinator defaults, limits and port
    pub agent: AgentConfig,
    /// Directory job scratch directories are created in
    pub work_dir: PathBuf,
}

impl ServerConfig {
    pub fn new(agent: AgentConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent,
            work_dir: work_dir.into(),
        }
    }
}

/// Bind the configured port on all interfaces and serve until shutdown
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", config.agent.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        "Listening on {} (concurrency {})",
        listener.local_addr()?,
        config.agent.concurrency
    );

    serve(listener, config).await
}
