//! Transport engine port
//!
//! The player never talks to webrtc-rs directly. Everything it needs from the
//! engine (offer/answer, connectivity changes, inbound tracks, teardown) goes
//! through `MediaTransport`, implemented for real by `PeerConnection`.

use std::sync::Arc;

use async_trait::async_trait;

use super::signaling::IceConnectivity;
use super::track::FrameSource;
use crate::error::Result;
use crate::events::Subscription;

#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Create the local offer and install it as local description
    ///
    /// Returns the SDP to send, including gathered candidates.
    async fn create_offer(&self) -> Result<String>;

    /// Install the server's answer as remote description
    async fn apply_answer(&self, sdp: &str) -> Result<()>;

    /// ICE connectivity changes, from now on
    fn subscribe_connectivity(&self) -> Subscription<IceConnectivity>;

    /// Inbound tracks, from now on
    fn subscribe_tracks(&self) -> Subscription<Arc<dyn FrameSource>>;

    /// Release the engine; ends every subscription
    async fn close(&self) -> Result<()>;
}
