//! WebRTC signaling types and messages

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Play request sent to the signaling endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayRequest {
    /// Stream name on the server
    pub streamurl: String,
    /// SDP offer
    pub sdp: String,
}

impl PlayRequest {
    pub fn new(stream: impl Into<String>, sdp: impl Into<String>) -> Self {
        Self {
            streamurl: stream.into(),
            sdp: sdp.into(),
        }
    }
}

/// Outcome of one offer/answer exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiationResult {
    pub success: bool,
    /// Server error code (present when the server rejected the offer)
    pub code: Option<i64>,
    /// Failure reason
    pub message: Option<String>,
    /// Applied answer SDP
    pub answer_sdp: Option<String>,
    /// The server answered, but not with a usable answer
    pub protocol_error: bool,
}

impl NegotiationResult {
    pub fn accepted(answer_sdp: impl Into<String>) -> Self {
        Self {
            success: true,
            answer_sdp: Some(answer_sdp.into()),
            ..Default::default()
        }
    }

    pub fn failed(err: &AppError) -> Self {
        let message = match err {
            AppError::NegotiationProtocol { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            success: false,
            code: err.server_code(),
            message: Some(message),
            answer_sdp: None,
            protocol_error: matches!(err, AppError::NegotiationProtocol { .. }),
        }
    }

    /// The failure as an error, `None` on success
    pub fn error(&self) -> Option<AppError> {
        if self.success {
            return None;
        }
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        Some(if self.protocol_error {
            AppError::NegotiationProtocol {
                code: self.code,
                message,
            }
        } else {
            AppError::NegotiationTransport(message)
        })
    }
}

/// Session connection state
///
/// Ordered: a session only ever moves forward, except to `Closed` which is
/// reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Unstarted,
    Negotiating,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Unstarted => write!(f, "unstarted"),
            ConnectionState::Negotiating => write!(f, "negotiating"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// ICE-level connectivity reported by the transport engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectivity {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectivity {
    /// `connected` and `completed` both mean a usable path exists
    pub fn is_connected(&self) -> bool {
        matches!(self, IceConnectivity::Connected | IceConnectivity::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, IceConnectivity::Failed)
    }
}

impl std::fmt::Display for IceConnectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IceConnectivity::New => write!(f, "new"),
            IceConnectivity::Checking => write!(f, "checking"),
            IceConnectivity::Connected => write!(f, "connected"),
            IceConnectivity::Completed => write!(f, "completed"),
            IceConnectivity::Disconnected => write!(f, "disconnected"),
            IceConnectivity::Failed => write!(f, "failed"),
            IceConnectivity::Closed => write!(f, "closed"),
        }
    }
}

/// Media kind of an inbound track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_request_wire_format() {
        let req = PlayRequest::new("livestream", "v=0\r\n");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["streamurl"], "livestream");
        assert_eq!(json["sdp"], "v=0\r\n");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_result_keeps_error_category() {
        let err = AppError::NegotiationProtocol {
            code: Some(400),
            message: "bad stream".to_string(),
        };
        let result = NegotiationResult::failed(&err);
        assert!(!result.success);
        assert_eq!(result.code, Some(400));
        assert_eq!(result.message.as_deref(), Some("bad stream"));
        assert!(matches!(
            result.error(),
            Some(AppError::NegotiationProtocol { code: Some(400), .. })
        ));

        let result = NegotiationResult::failed(&AppError::NegotiationTransport("refused".into()));
        assert!(matches!(result.error(), Some(AppError::NegotiationTransport(_))));

        assert!(NegotiationResult::accepted("v=0").error().is_none());
    }

    #[test]
    fn test_connection_state_order() {
        assert!(ConnectionState::Unstarted < ConnectionState::Negotiating);
        assert!(ConnectionState::Connecting < ConnectionState::Connected);
        assert!(ConnectionState::Connected < ConnectionState::Failed);
        assert!(ConnectionState::Failed < ConnectionState::Closed);
    }

    #[test]
    fn test_ice_connected_and_completed_both_succeed() {
        assert!(IceConnectivity::Connected.is_connected());
        assert!(IceConnectivity::Completed.is_connected());
        assert!(!IceConnectivity::Checking.is_connected());
        assert!(IceConnectivity::Failed.is_failed());
    }
}
