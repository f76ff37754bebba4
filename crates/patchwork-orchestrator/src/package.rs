//! Result packaging
//!
//! Every file the command touched becomes one output: `.json` files are parsed
//! and embedded as JSON, anything else is embedded as an artifact.

use patchwork_agent::codec;
use patchwork_core::{CalcError, CalcValue, CalculationResponse, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

use crate::workspace::changed_files;

/// Split captured output into its non-empty lines
pub fn trim_and_split(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the response for a finished command
pub async fn package(
    dir: &Path,
    since: SystemTime,
    stdout: &str,
    stderr: &str,
) -> Result<CalculationResponse> {
    let mut outputs = BTreeMap::new();

    for file in changed_files(dir, since).await? {
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Reading output file {}", file.display());

        let value = if file_name.ends_with(".json") {
            let data = fs::read(&file).await?;
            let parsed: serde_json::Value = serde_json::from_slice(&data).map_err(|e| {
                CalcError::Format(format!("Output {} is not valid JSON: {}", file_name, e))
            })?;
            CalcValue::Json(parsed)
        } else {
            CalcValue::Artifact(codec::encode(&file).await?)
        };

        let key = output_key(&outputs, &file_name);
        outputs.insert(key, value);
    }

    Ok(CalculationResponse {
        outputs,
        logs: trim_and_split(stdout),
        errors: trim_and_split(stderr),
    })
}

/// File name without its extension
///
/// Falls back to the full file name when the stem is taken, then to a
/// numbered variant of the full name, so no output is overwritten.
fn output_key(outputs: &BTreeMap<String, CalcValue>, file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    if !outputs.contains_key(&stem) {
        return stem;
    }
    if !outputs.contains_key(file_name) {
        return file_name.to_string();
    }

    let mut n = 2;
    loop {
        let key = format!("{}-{}", file_name, n);
        if !outputs.contains_key(&key) {
            return key;
        }
        n += 1;
    }
}
