//! Trigger body resolution
//!
//! A trigger is either a bare calculation id or a JSON
//! [`CalculationPayload`] that may also override the coordinator host and
//! token.

use patchwork_core::{CalcError, CalculationPayload, Result};

/// Where and what one triggered job should fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub calculation: String,
    pub host: String,
    pub token: Option<String>,
}

/// Resolve a request body against the configured host and token
pub fn resolve(
    body: &str,
    default_host: Option<&str>,
    default_token: Option<&str>,
) -> Result<Trigger> {
    let body = body.trim();

    let (calculation, host, token) = if body.starts_with('{') {
        let payload: CalculationPayload = serde_json::from_str(body)
            .map_err(|e| CalcError::Format(format!("Invalid trigger payload: {}", e)))?;
        (
            payload.id.trim().to_string(),
            non_empty(payload.host).or_else(|| default_host.map(str::to_string)),
            non_empty(payload.token).or_else(|| default_token.map(str::to_string)),
        )
    } else {
        (
            body.to_string(),
            default_host.map(str::to_string),
            default_token.map(str::to_string),
        )
    };

    if calculation.is_empty() {
        return Err(CalcError::Format("No calculation id in request".to_string()));
    }

    let host = host
        .map(|h| h.trim_end_matches('/').to_string())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CalcError::Config("No coordinator host configured".to_string()))?;

    Ok(Trigger {
        calculation,
        host,
        token,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
