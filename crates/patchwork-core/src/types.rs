//! Wire types exchanged with the coordinating server

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A file travelling through the JSON protocol as a data URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Original file name, extension included
    pub name: String,
    /// MIME type sniffed from the file contents
    pub content_type: String,
    /// `data:<contentType>;base64,<payload>`
    pub uri: String,
}

impl Artifact {
    /// Extension used when the artifact is written back to disk.
    ///
    /// Everything after the last `.` of the name. A name without a dot is
    /// returned whole.
    pub fn extension(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or(&self.name)
    }
}

/// A named input or output value.
///
/// Decoding tries the [`Artifact`] shape first (an object with string `name`,
/// `contentType` and `uri` fields) and falls back to arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CalcValue {
    Artifact(Artifact),
    Json(serde_json::Value),
}

impl CalcValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CalcValue::Json(serde_json::Value::Null))
    }
}

impl From<Artifact> for CalcValue {
    fn from(artifact: Artifact) -> Self {
        CalcValue::Artifact(artifact)
    }
}

impl From<serde_json::Value> for CalcValue {
    fn from(value: serde_json::Value) -> Self {
        CalcValue::Json(value)
    }
}

/// Structured identifier of a calculation as the coordinator describes it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculationId {
    pub document_type: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub version: String,
    pub path: String,
}

impl std::fmt::Display for CalculationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [
            self.document_type.as_str(),
            self.kind.as_str(),
            self.id.as_str(),
            self.version.as_str(),
            self.path.as_str(),
        ]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
        write!(f, "{}", parts.join("/"))
    }
}

/// Accept the structured id, a bare string, or any other JSON value
///
/// The id is only used for logging, so an unexpected shape never fails a job.
fn deserialize_calculation_id<'de, D>(
    deserializer: D,
) -> std::result::Result<CalculationId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Structured(CalculationId),
        Plain(String),
        Other(serde_json::Value),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Structured(id) => id,
        Repr::Plain(id) => CalculationId {
            id,
            ..CalculationId::default()
        },
        Repr::Other(serde_json::Value::Null) => CalculationId::default(),
        Repr::Other(value) => CalculationId {
            id: value.to_string(),
            ..CalculationId::default()
        },
    })
}

/// Everything the coordinator knows about one calculation's inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationContext {
    #[serde(default, deserialize_with = "deserialize_calculation_id")]
    pub id: CalculationId,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, CalcValue>,
    #[serde(default)]
    pub failed_inputs: BTreeMap<String, String>,
}

/// JSON trigger body accepted by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Result of one calculation, uploaded to the coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationResponse {
    /// Keyed by output file name without its extension
    pub outputs: BTreeMap<String, CalcValue>,
    /// Non-empty lines of the command's stdout
    pub logs: Vec<String>,
    /// Non-empty lines of the command's stderr
    pub errors: Vec<String>,
}
