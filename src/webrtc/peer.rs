//! WebRTC peer connection management

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::signaling::IceConnectivity;
use super::track::{FrameSource, RemoteTrackSource};
use super::transport::MediaTransport;
use crate::config::SessionConfig;
use crate::error::{AppError, Result};
use crate::events::{Subscribers, Subscription};

/// Upper bound for ICE gathering before the offer is sent
const GATHERING_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive-only peer connection
pub struct PeerConnection {
    session_id: String,
    pc: Arc<RTCPeerConnection>,
    connectivity: Arc<Subscribers<IceConnectivity>>,
    tracks: Arc<Subscribers<Arc<dyn FrameSource>>>,
}

impl PeerConnection {
    /// Create a peer connection with one receive-only audio and video transceiver
    pub async fn new(config: &SessionConfig, session_id: &str) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::WebRtcError(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone(),
                credential: server.credential.clone(),
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to create peer connection: {}", e))
        })?;
        let pc = Arc::new(pc);

        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                AppError::WebRtcError(format!("Failed to add {} transceiver: {}", kind, e))
            })?;
        }

        let peer = Self {
            session_id: session_id.to_string(),
            pc,
            connectivity: Arc::new(Subscribers::new()),
            tracks: Arc::new(Subscribers::new()),
        };
        peer.setup_event_handlers();

        info!("Peer connection created for session {}", session_id);
        Ok(peer)
    }

    fn setup_event_handlers(&self) {
        let connectivity = self.connectivity.clone();
        let session_id = self.session_id.clone();
        self.pc
            .on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
                let connectivity = connectivity.clone();
                let session_id = session_id.clone();

                Box::pin(async move {
                    let Some(state) = ice_connectivity(s) else {
                        return;
                    };
                    info!("Peer {} ICE connection state: {}", session_id, state);
                    connectivity.publish(state);
                })
            }));

        // A failed DTLS/SCTP layer ends the session just like ICE failure
        let connectivity = self.connectivity.clone();
        let session_id = self.session_id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let connectivity = connectivity.clone();
                let session_id = session_id.clone();

                Box::pin(async move {
                    debug!("Peer {} connection state: {}", session_id, s);
                    if s == RTCPeerConnectionState::Failed {
                        warn!("Peer {} connection failed", session_id);
                        connectivity.publish(IceConnectivity::Failed);
                    }
                })
            }));

        let tracks = self.tracks.clone();
        let session_id = self.session_id.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let source = RemoteTrackSource::new(track);
                debug!(
                    "Peer {} received {} track ({})",
                    session_id,
                    source.kind(),
                    source.codec()
                );
                tracks.publish(Arc::new(source));
                Box::pin(async {})
            },
        ));
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl MediaTransport for PeerConnection {
    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create offer: {}", e)))?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))?;

        // Non-trickle signaling: the offer must carry the candidates
        if tokio::time::timeout(GATHERING_TIMEOUT, gather_complete.recv())
            .await
            .is_err()
        {
            warn!(
                "ICE gathering not complete after {:?}, sending partial offer",
                GATHERING_TIMEOUT
            );
        }

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| AppError::WebRtcError("No local description available".to_string()))?;
        Ok(local.sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| AppError::WebRtcError(format!("Invalid SDP answer: {}", e)))?;

        self.pc.set_remote_description(answer).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to set remote description: {}", e))
        })?;
        Ok(())
    }

    fn subscribe_connectivity(&self) -> Subscription<IceConnectivity> {
        self.connectivity.subscribe()
    }

    fn subscribe_tracks(&self) -> Subscription<Arc<dyn FrameSource>> {
        self.tracks.subscribe()
    }

    async fn close(&self) -> Result<()> {
        let result = self
            .pc
            .close()
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to close peer connection: {}", e)));

        self.connectivity.close();
        self.tracks.close();
        result
    }
}

fn ice_connectivity(state: RTCIceConnectionState) -> Option<IceConnectivity> {
    let state = match state {
        RTCIceConnectionState::New => IceConnectivity::New,
        RTCIceConnectionState::Checking => IceConnectivity::Checking,
        RTCIceConnectionState::Connected => IceConnectivity::Connected,
        RTCIceConnectionState::Completed => IceConnectivity::Completed,
        RTCIceConnectionState::Disconnected => IceConnectivity::Disconnected,
        RTCIceConnectionState::Failed => IceConnectivity::Failed,
        RTCIceConnectionState::Closed => IceConnectivity::Closed,
        _ => return None,
    };
    Some(state)
}
