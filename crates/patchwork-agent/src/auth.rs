//! Bearer token resolution for the coordinator
//!
//! Priority:
//! 1. Token given on the command line or in the config file
//! 2. PATCHWORK_TOKEN environment variable
//! 3. Empty token (the coordinator decides whether that is acceptable)

use std::env;

/// Environment variable consulted when no token is configured
pub const TOKEN_ENV: &str = "PATCHWORK_TOKEN";

/// Resolve the bearer token to use for coordinator requests
pub fn resolve_token(configured: Option<&str>) -> String {
    if let Some(token) = configured.filter(|t| !t.is_empty()) {
        return token.to_string();
    }

    if let Ok(token) = env::var(TOKEN_ENV) {
        tracing::info!("Using token from {}", TOKEN_ENV);
        return token;
    }

    tracing::debug!("No coordinator token configured");
    String::new()
}
