//! Configuration management for the calculation agent
//!
//! Settings come from three layers, lowest precedence first: built-in
//! defaults, an optional TOML file, then command-line flags applied by the
//! binary on top of the loaded struct.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{CalcError, Result};

/// Agent-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Shell command executed for every calculation
    #[serde(default)]
    pub command: String,

    /// Coordinator base URL
    #[serde(default)]
    pub host: Option<String>,

    /// Bearer token sent to the coordinator
    #[serde(default)]
    pub token: Option<String>,

    /// Maximum number of jobs running at once in service mode
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for the command, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Port the service listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Also post raw command output to the coordinator's log endpoint
    #[serde(default)]
    pub submit_logs: bool,
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_port() -> u16 {
    8080
}

impl AgentConfig {
    /// Load configuration from a TOML file, or use defaults when no path is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content).map_err(|e| {
                    CalcError::Config(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })
            }
            None => Ok(Self::default()),
        }
    }

    /// Check the settings every mode needs
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(CalcError::Config("No command provided".to_string()));
        }
        if self.concurrency == 0 {
            return Err(CalcError::Config(
                "Concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Host with any trailing slash removed, if one is configured
    pub fn host(&self) -> Option<&str> {
        self.host
            .as_deref()
            .map(|h| h.trim_end_matches('/'))
            .filter(|h| !h.is_empty())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            host: None,
            token: None,
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            port: default_port(),
            submit_logs: false,
        }
    }
}
