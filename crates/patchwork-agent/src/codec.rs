//! Artifact codec - moves binary files through the JSON protocol
//!
//! A file becomes an [`Artifact`] whose `uri` is a base64 data URI, and an
//! artifact becomes a file again named after the input it belongs to.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use patchwork_core::{Artifact, CalcError, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::sniff::detect_content_type;

const DATA_URI_PREFIX: &str = "data:";

/// Read a file and wrap it as an artifact
pub async fn encode(path: &Path) -> Result<Artifact> {
    let data = fs::read(path).await?;
    let content_type = detect_content_type(&data);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    debug!(
        "Encoding {} as {} ({} bytes)",
        path.display(),
        content_type,
        data.len()
    );

    Ok(Artifact {
        name,
        content_type: content_type.to_string(),
        uri: format!(
            "{}{};base64,{}",
            DATA_URI_PREFIX,
            content_type,
            BASE64_STANDARD.encode(&data)
        ),
    })
}

/// Write an artifact's bytes into `dir` as `<name>.<extension>`
///
/// The extension comes from the artifact's own file name. Returns the path
/// written.
pub async fn decode(dir: &Path, name: &str, artifact: &Artifact) -> Result<PathBuf> {
    let path = input_path(dir, name, artifact.extension())?;
    let raw = decode_payload(&artifact.uri)?;

    debug!("Writing input file {} ({} bytes)", path.display(), raw.len());
    fs::write(&path, raw).await?;

    Ok(path)
}

/// File in `dir` that holds the input called `name`
///
/// Input names come from the coordinator and must be a single plain file name
/// so the file cannot land outside `dir`.
pub fn input_path(dir: &Path, name: &str, extension: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(|c: char| c == '/' || c == '\\');

    if !plain {
        return Err(CalcError::Format(format!(
            "Input name {:?} is not a plain file name",
            name
        )));
    }

    Ok(dir.join(format!("{}.{}", name, extension)))
}

/// Extract the bytes embedded in a base64 data URI
pub fn decode_payload(uri: &str) -> Result<Vec<u8>> {
    if !uri.starts_with(DATA_URI_PREFIX) {
        return Err(CalcError::Format("Not a data URI".to_string()));
    }

    let (_, payload) = uri
        .split_once(',')
        .ok_or_else(|| CalcError::Format("Data URI has no payload".to_string()))?;

    BASE64_STANDARD
        .decode(payload)
        .map_err(|e| CalcError::Format(format!("Invalid base64 payload: {}", e)))
}
