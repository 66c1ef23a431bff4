//! WebRTC play session state
//!
//! All mutable session fields (connection state, closed flag, negotiated
//! descriptions and the per-track counters) sit behind one mutex. Tasks never
//! hold the lock across an `.await`; events are published after it is released.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Url;
use tracing::{debug, info};

use super::signaling::{ConnectionState, MediaKind};
use super::track::TrackHandle;
use crate::error::{AppError, Result};
use crate::events::{EventBus, SessionEvent};

struct SessionInner {
    state: ConnectionState,
    closed: bool,
    endpoint: Option<Url>,
    stream: Option<String>,
    local_offer: Option<String>,
    remote_answer: Option<String>,
    tracks: Vec<TrackHandle>,
    next_track_id: u64,
}

/// One play session, owned by a single player instance
pub struct Session {
    id: String,
    created_at: Instant,
    started_at: DateTime<Utc>,
    events: Arc<EventBus>,
    inner: Mutex<SessionInner>,
}

impl Session {
    /// Create a new session in the `unstarted` state
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Instant::now(),
            started_at: Utc::now(),
            events,
            inner: Mutex::new(SessionInner {
                state: ConnectionState::Unstarted,
                closed: false,
                endpoint: None,
                stream: None,
                local_offer: None,
                remote_answer: None,
                tracks: Vec::new(),
                next_track_id: 1,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Monotonic creation time
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Wall-clock creation time
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Move the state forward
    ///
    /// Returns `false` (and changes nothing) if the session is closed or the
    /// target is not ahead of the current state. `Closed` is only reachable
    /// through the shutdown path.
    pub fn advance(&self, next: ConnectionState) -> bool {
        if next == ConnectionState::Closed {
            return false;
        }

        let from = {
            let mut inner = self.inner.lock();
            if inner.closed || next <= inner.state {
                debug!(
                    "Session {} ignoring transition {} -> {}",
                    self.id, inner.state, next
                );
                return false;
            }
            let from = inner.state;
            inner.state = next;
            from
        };

        info!("Session {} state: {} -> {}", self.id, from, next);
        self.events
            .publish(SessionEvent::StateChanged { from, to: next });
        true
    }

    /// Record the resolved signaling endpoint (at most once)
    pub fn set_endpoint(&self, endpoint: Url) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(AppError::SessionClosed);
        }
        if let Some(existing) = &inner.endpoint {
            return Err(AppError::Resolution(format!(
                "endpoint already resolved to {}",
                existing
            )));
        }
        inner.endpoint = Some(endpoint);
        Ok(())
    }

    pub fn endpoint(&self) -> Option<Url> {
        self.inner.lock().endpoint.clone()
    }

    pub fn set_stream(&self, stream: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(AppError::SessionClosed);
        }
        inner.stream = Some(stream.into());
        Ok(())
    }

    pub fn stream(&self) -> Option<String> {
        self.inner.lock().stream.clone()
    }

    pub fn set_local_offer(&self, sdp: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(AppError::SessionClosed);
        }
        inner.local_offer = Some(sdp.into());
        Ok(())
    }

    pub fn local_offer(&self) -> Option<String> {
        self.inner.lock().local_offer.clone()
    }

    pub fn set_remote_answer(&self, sdp: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(AppError::SessionClosed);
        }
        inner.remote_answer = Some(sdp.into());
        Ok(())
    }

    pub fn remote_answer(&self) -> Option<String> {
        self.inner.lock().remote_answer.clone()
    }

    /// Create a track handle; `None` once the session is closed
    pub fn add_track(&self, kind: MediaKind, codec: impl Into<String>) -> Option<TrackHandle> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        let id = inner.next_track_id;
        inner.next_track_id += 1;
        let handle = TrackHandle::new(id, kind, codec, Instant::now());
        inner.tracks.push(handle.clone());
        Some(handle)
    }

    /// Count a received frame; returns the rate when a sample interval elapsed
    pub fn record_frame(&self, track_id: u64, bytes: usize, now: Instant) -> Option<f64> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner
            .tracks
            .iter_mut()
            .find(|t| t.id == track_id)
            .and_then(|t| t.on_frame(bytes, now))
    }

    /// Snapshot of one track
    pub fn track(&self, track_id: u64) -> Option<TrackHandle> {
        self.inner
            .lock()
            .tracks
            .iter()
            .find(|t| t.id == track_id)
            .cloned()
    }

    /// Snapshot of all tracks
    pub fn tracks(&self) -> Vec<TrackHandle> {
        self.inner.lock().tracks.clone()
    }

    /// Atomically set the closed flag
    ///
    /// Returns `true` for exactly one caller; everyone else gets `false`.
    pub(crate) fn begin_close(&self) -> bool {
        let from = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return false;
            }
            inner.closed = true;
            let from = inner.state;
            inner.state = ConnectionState::Closed;
            from
        };

        info!("Session {} state: {} -> closed", self.id, from);
        self.events.publish(SessionEvent::StateChanged {
            from,
            to: ConnectionState::Closed,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session() -> Session {
        Session::new(Arc::new(EventBus::new()))
    }

    #[test]
    fn test_forward_transitions_only() {
        let s = session();
        assert_eq!(s.state(), ConnectionState::Unstarted);
        assert!(s.advance(ConnectionState::Negotiating));
        assert!(s.advance(ConnectionState::Connecting));
        assert!(!s.advance(ConnectionState::Negotiating));
        assert!(s.advance(ConnectionState::Connected));
        assert!(!s.advance(ConnectionState::Connected));
        assert_eq!(s.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_closed_only_via_begin_close() {
        let s = session();
        assert!(!s.advance(ConnectionState::Closed));
        assert!(s.begin_close());
        assert!(!s.begin_close());
        assert_eq!(s.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_closed_short_circuits_mutation() {
        let s = session();
        let track = s.add_track(MediaKind::Video, "video/VP8").unwrap();
        assert!(s.begin_close());

        assert!(!s.advance(ConnectionState::Connected));
        assert!(s.add_track(MediaKind::Audio, "audio/opus").is_none());
        assert!(matches!(s.set_stream("x"), Err(AppError::SessionClosed)));
        assert!(s
            .record_frame(track.id, 100, Instant::now() + Duration::from_secs(2))
            .is_none());
        assert_eq!(s.track(track.id).unwrap().total_frames(), 0);
    }

    #[test]
    fn test_endpoint_resolved_once() {
        let s = session();
        let url = Url::parse("https://example.com/rtc/v1/play/").unwrap();
        s.set_endpoint(url.clone()).unwrap();
        assert!(matches!(s.set_endpoint(url.clone()), Err(AppError::Resolution(_))));
        assert_eq!(s.endpoint(), Some(url));
    }

    #[test]
    fn test_record_frame_updates_track() {
        let s = session();
        let track = s.add_track(MediaKind::Audio, "audio/opus").unwrap();
        let start = track.started_at;

        assert!(s.record_frame(track.id, 10, start).is_none());
        let fps = s
            .record_frame(track.id, 10, start + Duration::from_secs(1))
            .unwrap();
        assert!((fps - 2.0).abs() < f64::EPSILON);
        assert_eq!(s.track(track.id).unwrap().total_frames(), 2);
        assert!(s.record_frame(999, 10, start).is_none());
    }

    #[tokio::test]
    async fn test_state_changes_are_published() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let s = Session::new(bus);

        s.advance(ConnectionState::Negotiating);
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            SessionEvent::StateChanged {
                from: ConnectionState::Unstarted,
                to: ConnectionState::Negotiating
            }
        ));
    }
}
