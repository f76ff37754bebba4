//! Patchwork CLI - remote calculation agent
//!
//! Usage:
//!   patchwork -c <command> -h <host> <calculation>   Run one calculation here
//!   patchwork -c <command> [-concurrency N]          Serve HTTP triggers

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use patchwork_agent::{resolve_token, CoordinatorClient};
use patchwork_core::AgentConfig;
use patchwork_orchestrator::{run_calculation, CalculationJob};
use patchwork_server::ServerConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "patchwork")]
#[command(version, about = "Runs calculations for a coordinating server")]
#[command(disable_help_flag = true)]
struct Cli {
    /// Calculation to run once; without it the agent serves HTTP triggers
    calculation: Option<String>,

    /// Command executed for every calculation
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Coordinator base URL
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Bearer token for the coordinator
    #[arg(short = 't', long)]
    token: Option<String>,

    /// Maximum calculations running at once in service mode
    #[arg(long)]
    concurrency: Option<usize>,

    /// Command deadline in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Port for service mode
    #[arg(long)]
    port: Option<u16>,

    /// Also post raw command output to the coordinator
    #[arg(long)]
    submit_logs: bool,

    /// TOML file with default settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// Defaults, then the config file, then flags
    fn agent_config(&self) -> Result<AgentConfig> {
        let mut config = AgentConfig::load_or_default(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(command) = &self.command {
            config.command = command.clone();
        }
        if let Some(host) = &self.host {
            config.host = Some(host.clone());
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.submit_logs |= self.submit_logs;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Long-only flags that are also accepted with a single dash (`-timeout 5`)
const SINGLE_DASH_LONG: &[&str] = &["concurrency", "timeout", "port", "submit-logs", "config"];

/// Rewrite single-dash spellings of long-only flags to their `--` form
///
/// Without this clap would read `-timeout` as `-t imeout`. Arguments after a
/// bare `--` are left untouched.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut rewritten = Vec::new();
    let mut options_ended = false;

    for arg in args {
        if options_ended {
            rewritten.push(arg);
            continue;
        }
        let single_dash = arg.to_str().and_then(|s| {
            let rest = s.strip_prefix('-').filter(|r| !r.starts_with('-'))?;
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            SINGLE_DASH_LONG.contains(&name).then(|| format!("-{}", s))
        });
        if arg == "--" {
            options_ended = true;
        }
        rewritten.push(single_dash.map(OsString::from).unwrap_or(arg));
    }

    rewritten
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Patchwork calculation agent {}", env!("CARGO_PKG_VERSION"));
    let work_dir = std::env::current_dir().context("Failed to resolve working directory")?;
    info!("Running in {}", work_dir.display());

    let config = cli.agent_config()?;
    info!("Command: {}", config.command);

    match cli.calculation {
        Some(calculation) => cmd_run_once(&config, &calculation, &work_dir).await,
        None => patchwork_server::run(ServerConfig::new(config, work_dir)).await,
    }
}

async fn cmd_run_once(config: &AgentConfig, calculation: &str, work_dir: &Path) -> Result<()> {
    let host = config
        .host()
        .context("A coordinator host (-h) is required to run a calculation")?;

    let client = CoordinatorClient::new(host, resolve_token(config.token.as_deref()));
    let job = CalculationJob::new(&config.command, calculation, work_dir)
        .with_timeout(Duration::from_secs(config.timeout_secs))
        .with_submit_logs(config.submit_logs);

    let response = run_calculation(&client, &job)
        .await
        .with_context(|| format!("Calculation {} failed", calculation))?;

    info!(
        "Calculation {} uploaded with {} outputs",
        calculation,
        response.outputs.len()
    );
    Ok(())
}
