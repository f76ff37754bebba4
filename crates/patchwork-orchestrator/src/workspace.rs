//! Working directory management for a single job
//!
//! Inputs are written into the directory before the command runs; afterwards
//! the directory is scanned for files the command created or rewrote.

use chrono::{DateTime, Utc};
use patchwork_agent::codec;
use patchwork_core::{CalcValue, CalculationContext, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// Write every input of `context` into `dir`
///
/// Artifact inputs become `<name>.<ext>` holding the decoded bytes, other
/// values become `<name>.json`, null values are skipped. The first failure
/// aborts the whole expansion. Returns the files written.
pub async fn materialize(dir: &Path, context: &CalculationContext) -> Result<Vec<PathBuf>> {
    for (name, reason) in &context.failed_inputs {
        warn!("Input {} failed upstream: {}", name, reason);
    }

    let mut written = Vec::with_capacity(context.inputs.len());
    for (name, value) in &context.inputs {
        let path = match value {
            value if value.is_null() => {
                debug!("Skipping null input {}", name);
                continue;
            }
            CalcValue::Artifact(artifact) => codec::decode(dir, name, artifact).await?,
            CalcValue::Json(value) => {
                let path = codec::input_path(dir, name, "json")?;
                debug!("Writing input file {}", path.display());
                fs::write(&path, serde_json::to_vec(value)?).await?;
                path
            }
        };
        written.push(path);
    }

    Ok(written)
}

/// Files directly inside `dir` modified strictly after `since`
///
/// Subdirectories are never returned and never descended into. Order follows
/// the directory listing.
pub async fn changed_files(dir: &Path, since: SystemTime) -> Result<Vec<PathBuf>> {
    info!(
        "Looking for files that have changed since {}",
        DateTime::<Utc>::from(since).to_rfc3339()
    );

    let mut changed = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_dir() {
            continue;
        }

        let modified = metadata.modified()?;
        debug!(
            "Checking file {} changed {}",
            entry.file_name().to_string_lossy(),
            DateTime::<Utc>::from(modified).to_rfc3339()
        );

        if modified > since {
            debug!("Including file {}", entry.file_name().to_string_lossy());
            changed.push(entry.path());
        }
    }

    Ok(changed)
}
