//! Session teardown
//!
//! Release order: receive loops, sink, transport. Each step runs even when a
//! previous one failed; failures are logged and never returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::Session;
use super::signaling::MediaKind;
use super::track::TrackRegistry;
use super::transport::MediaTransport;
use crate::events::{EventBus, SessionEvent};
use crate::sink::FrameSink;

/// Per-track figures at close time
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub track_id: u64,
    pub kind: MediaKind,
    pub codec: String,
    pub duration: Duration,
    pub frames: u64,
    pub bytes: u64,
}

/// Aggregate statistics returned by the first `close()`
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub duration: Duration,
    pub tracks: Vec<TrackSummary>,
}

pub struct ShutdownController {
    session: Arc<Session>,
    registry: Arc<TrackRegistry>,
    sink: Arc<dyn FrameSink>,
    transport: Arc<dyn MediaTransport>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
}

impl ShutdownController {
    pub fn new(
        session: Arc<Session>,
        registry: Arc<TrackRegistry>,
        sink: Arc<dyn FrameSink>,
        transport: Arc<dyn MediaTransport>,
        events: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            registry,
            sink,
            transport,
            events,
            cancel,
        }
    }

    /// Tear the session down
    ///
    /// Only the first call does any work and gets the report; every other
    /// call (sequential or concurrent) returns `None` right away.
    pub async fn close(&self) -> Option<SessionReport> {
        if !self.session.begin_close() {
            debug!("Session {} already closed", self.session.id());
            return None;
        }

        info!("Closing session {}", self.session.id());
        self.cancel.cancel();

        self.registry.stop_all().await;

        if let Err(e) = self.sink.stop() {
            warn!("Failed to stop {} sink: {}", self.sink.name(), e);
        }

        if let Err(e) = self.transport.close().await {
            warn!("Failed to close transport: {}", e);
        }

        let report = self.report(Instant::now());
        info!(
            "Session {} closed after {:.2}s",
            report.session_id,
            report.duration.as_secs_f64()
        );
        for track in &report.tracks {
            info!(
                "Track {} ({}, {}): {:.2}s, {} frames, {} bytes",
                track.track_id,
                track.kind,
                track.codec,
                track.duration.as_secs_f64(),
                track.frames,
                track.bytes
            );
        }

        self.events.publish(SessionEvent::Closed {
            duration_ms: report.duration.as_millis() as u64,
        });
        Some(report)
    }

    fn report(&self, now: Instant) -> SessionReport {
        let tracks = self
            .session
            .tracks()
            .into_iter()
            .map(|t| TrackSummary {
                track_id: t.id,
                kind: t.kind,
                duration: t.duration_until(now),
                frames: t.total_frames(),
                bytes: t.total_bytes(),
                codec: t.codec,
            })
            .collect();

        SessionReport {
            session_id: self.session.id().to_string(),
            duration: now.saturating_duration_since(self.session.created_at()),
            tracks,
        }
    }
}
