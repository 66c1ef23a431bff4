//! Session event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::webrtc::signaling::{ConnectionState, IceConnectivity, MediaKind};

/// Session event enum
///
/// Serialized with a dotted event name and a data payload:
///
/// ```json
/// {
///   "event": "session.state_changed",
///   "data": { "from": "negotiating", "to": "connecting" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    // ============================================================================
    // Session lifecycle
    // ============================================================================
    /// Session connection state moved forward (or closed)
    #[serde(rename = "session.state_changed")]
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Signaling endpoint resolved (or taken from configuration)
    #[serde(rename = "session.endpoint_resolved")]
    EndpointResolved {
        endpoint: String,
        /// "page", "fallback" or "configured"
        source: String,
    },

    /// Offer/answer exchange finished
    #[serde(rename = "session.negotiated")]
    Negotiated {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Session torn down
    #[serde(rename = "session.closed")]
    Closed {
        /// Total session lifetime in milliseconds
        duration_ms: u64,
    },

    // ============================================================================
    // Connectivity
    // ============================================================================
    /// ICE connectivity value reported by the transport
    #[serde(rename = "ice.state_changed")]
    IceStateChanged { state: IceConnectivity },

    /// Still waiting for connectivity
    #[serde(rename = "ice.waiting")]
    WaitingProgress { elapsed_secs: u64 },

    // ============================================================================
    // Tracks
    // ============================================================================
    /// New inbound track registered
    #[serde(rename = "track.added")]
    TrackAdded {
        track_id: u64,
        kind: MediaKind,
        codec: String,
    },

    /// Per-second receive rate sample
    #[serde(rename = "track.rate")]
    TrackRate { track_id: u64, fps: f64 },

    /// Track stopped delivering frames
    #[serde(rename = "track.ended")]
    TrackEnded { track_id: u64, frames: u64 },
}

impl SessionEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "session.state_changed",
            Self::EndpointResolved { .. } => "session.endpoint_resolved",
            Self::Negotiated { .. } => "session.negotiated",
            Self::Closed { .. } => "session.closed",
            Self::IceStateChanged { .. } => "ice.state_changed",
            Self::WaitingProgress { .. } => "ice.waiting",
            Self::TrackAdded { .. } => "track.added",
            Self::TrackRate { .. } => "track.rate",
            Self::TrackEnded { .. } => "track.ended",
        }
    }
}
