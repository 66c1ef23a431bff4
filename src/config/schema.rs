use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Public STUN server used when no ICE servers are configured
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Main session configuration
///
/// Immutable once a session starts; the player wraps it in an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host page URL (or the signaling endpoint itself)
    pub page_url: String,
    /// Signaling endpoint, resolved from the page when absent
    pub endpoint: Option<String>,
    /// Stream name, parsed from the page URL when absent
    pub stream: Option<String>,
    /// ICE servers for NAT traversal
    pub ice_servers: Vec<IceServerConfig>,
    /// Budget for the connecting phase in seconds
    pub connect_timeout_secs: u64,
    /// How long to keep the session after connecting (0 = until interrupted)
    pub hold_secs: u64,
    /// HTTP request timeout in seconds (page fetch and signaling)
    pub request_timeout_secs: u64,
    /// What happens to received media
    pub sink: SinkStrategy,
    /// Skip TLS certificate verification (self-signed / IP-addressed servers)
    pub accept_invalid_certs: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_url: String::new(),
            endpoint: None,
            stream: None,
            ice_servers: vec![IceServerConfig::stun(DEFAULT_STUN_SERVER)],
            connect_timeout_secs: 30,
            hold_secs: 30,
            request_timeout_secs: 10,
            sink: SinkStrategy::Discard,
            accept_invalid_certs: false,
        }
    }
}

impl SessionConfig {
    /// Connectivity timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Hold timeout, `None` means hold until interrupted
    pub fn hold_timeout(&self) -> Option<Duration> {
        if self.hold_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.hold_secs))
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parsed host page URL
    pub fn page_url(&self) -> Result<Url> {
        parse_http_url(&self.page_url, "page URL")
    }

    /// Parsed explicit endpoint, if any
    pub fn endpoint_url(&self) -> Result<Option<Url>> {
        self.endpoint
            .as_deref()
            .map(|e| parse_http_url(e, "endpoint URL"))
            .transpose()
    }

    /// Check the configuration before a session starts
    pub fn validate(&self) -> Result<()> {
        self.page_url()?;
        self.endpoint_url()?;

        if self.connect_timeout_secs == 0 {
            return Err(AppError::Config(
                "connect timeout must be greater than zero".to_string(),
            ));
        }

        for server in &self.ice_servers {
            server.validate()?;
        }

        if let SinkStrategy::Record { output } = &self.sink {
            if output.as_os_str().is_empty() {
                return Err(AppError::Config("record output path is empty".to_string()));
            }
        }

        Ok(())
    }
}

fn parse_http_url(raw: &str, what: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", what, raw, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AppError::Config(format!(
                "Unsupported {} scheme '{}' (expected http or https)",
                what, other
            )))
        }
    }

    if url.host_str().is_none() {
        return Err(AppError::Config(format!("{} '{}' has no host", what, raw)));
    }

    Ok(url)
}

/// ICE server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URLs (e.g., ["stun:stun.l.google.com:19302"])
    pub urls: Vec<String>,
    /// Username for TURN authentication
    #[serde(default)]
    pub username: String,
    /// Credential for TURN authentication
    #[serde(default)]
    pub credential: String,
}

impl IceServerConfig {
    /// Create a STUN server entry without credentials
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: String::new(),
            credential: String::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.urls.is_empty() {
            return Err(AppError::Config("ICE server has no URLs".to_string()));
        }

        for url in &self.urls {
            let known = ["stun:", "stuns:", "turn:", "turns:"]
                .iter()
                .any(|scheme| url.starts_with(scheme));
            if !known {
                return Err(AppError::Config(format!("Invalid ICE server URL: {}", url)));
            }
            if url.starts_with("turn") && (self.username.is_empty() || self.credential.is_empty())
            {
                return Err(AppError::Config(format!(
                    "TURN server {} requires username and credential",
                    url
                )));
            }
        }

        Ok(())
    }
}

/// Policy for received media, selected once per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SinkStrategy {
    /// Drain frames so the transport keeps flowing
    Discard,
    /// Present decoded video and honour operator cancel input
    Display,
    /// Persist media under the given output base path
    Record { output: PathBuf },
}

impl Default for SinkStrategy {
    fn default() -> Self {
        Self::Discard
    }
}

impl std::fmt::Display for SinkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkStrategy::Discard => write!(f, "discard"),
            SinkStrategy::Display => write!(f, "display"),
            SinkStrategy::Record { output } => write!(f, "record ({})", output.display()),
        }
    }
}
