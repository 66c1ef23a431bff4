//! Shared HTTP client for page fetches and signaling requests

use tracing::warn;

use crate::config::SessionConfig;
use crate::error::{AppError, Result};

/// Build the client used by the resolver and the negotiator
///
/// Certificate verification stays on unless the configuration explicitly
/// accepts invalid certificates.
pub fn build_http_client(config: &SessionConfig) -> Result<reqwest::Client> {
    if config.accept_invalid_certs {
        warn!("TLS certificate verification is disabled");
    }

    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}
