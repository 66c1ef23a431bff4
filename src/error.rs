use std::time::Duration;

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Endpoint resolution failed: {0}")]
    Resolution(String),

    #[error("Negotiation transport error: {0}")]
    NegotiationTransport(String),

    #[error("Negotiation rejected: {message}")]
    NegotiationProtocol {
        code: Option<i64>,
        message: String,
    },

    #[error("Connection not established within {0:?}")]
    ConnectivityTimeout(Duration),

    #[error("ICE connection failed")]
    ConnectivityFailed,

    #[error("Teardown error: {0}")]
    Teardown(String),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session already closed")]
    SessionClosed,
}

impl AppError {
    /// Server-reported error code, if this error came from the signaling server
    pub fn server_code(&self) -> Option<i64> {
        match self {
            AppError::NegotiationProtocol { code, .. } => *code,
            _ => None,
        }
    }

    /// Short category name used in logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Resolution(_) => "resolution",
            AppError::NegotiationTransport(_) => "negotiation-transport",
            AppError::NegotiationProtocol { .. } => "negotiation-protocol",
            AppError::ConnectivityTimeout(_) => "connectivity-timeout",
            AppError::ConnectivityFailed => "connectivity-failed",
            AppError::Teardown(_) => "teardown",
            AppError::WebRtcError(_) => "webrtc",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
            AppError::SessionClosed => "session-closed",
        }
    }
}

impl From<webrtc::Error> for AppError {
    fn from(e: webrtc::Error) -> Self {
        AppError::WebRtcError(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_message() {
        let err = AppError::NegotiationProtocol {
            code: Some(400),
            message: "bad stream".to_string(),
        };
        assert_eq!(err.to_string(), "Negotiation rejected: bad stream");
        assert_eq!(err.server_code(), Some(400));
        assert_eq!(err.kind(), "negotiation-protocol");
    }

    #[test]
    fn test_kind_for_connectivity() {
        assert_eq!(AppError::ConnectivityFailed.kind(), "connectivity-failed");
        assert_eq!(
            AppError::ConnectivityTimeout(Duration::from_secs(3)).kind(),
            "connectivity-timeout"
        );
        assert_eq!(AppError::ConnectivityFailed.server_code(), None);
    }
}
