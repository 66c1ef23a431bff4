//! Inbound track registry
//!
//! Every track the transport announces gets a `TrackHandle` in the session's
//! track table and its own receive loop. The loop counts frames, samples the
//! receive rate about once a second and hands each frame to the session sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use super::session::Session;
use super::signaling::MediaKind;
use crate::events::{EventBus, SessionEvent};
use crate::sink::{FrameSink, SinkControl};

/// Minimum wall time between two rate samples
pub const RATE_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// How long `stop_all` waits for receive loops before aborting them
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Per-track bookkeeping owned by the session's track table
#[derive(Debug, Clone)]
pub struct TrackHandle {
    pub id: u64,
    pub kind: MediaKind,
    /// Codec MIME type (e.g. "video/H264")
    pub codec: String,
    pub started_at: Instant,
    frame_counter: u64,
    total_frames: u64,
    total_bytes: u64,
    last_sample_at: Instant,
    last_rate: Option<f64>,
}

impl TrackHandle {
    pub fn new(id: u64, kind: MediaKind, codec: impl Into<String>, now: Instant) -> Self {
        Self {
            id,
            kind,
            codec: codec.into(),
            started_at: now,
            frame_counter: 0,
            total_frames: 0,
            total_bytes: 0,
            last_sample_at: now,
            last_rate: None,
        }
    }

    /// Count one frame
    ///
    /// Returns the frames-per-second rate when at least `RATE_SAMPLE_INTERVAL`
    /// passed since the previous sample; the counter is reset afterwards.
    pub fn on_frame(&mut self, bytes: usize, now: Instant) -> Option<f64> {
        self.frame_counter += 1;
        self.total_frames += 1;
        self.total_bytes += bytes as u64;

        let elapsed = now.saturating_duration_since(self.last_sample_at);
        if elapsed < RATE_SAMPLE_INTERVAL {
            return None;
        }

        let fps = self.frame_counter as f64 / elapsed.as_secs_f64();
        self.frame_counter = 0;
        self.last_sample_at = now;
        self.last_rate = Some(fps);
        Some(fps)
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }

    /// Time since the track arrived
    pub fn duration_until(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// One received media unit (an RTP packet as delivered by the engine)
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub packet: Packet,
    pub received_at: Instant,
}

impl MediaFrame {
    pub fn new(packet: Packet) -> Self {
        Self {
            packet,
            received_at: Instant::now(),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.packet.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packet.payload.is_empty()
    }
}

/// Source of frames for one inbound track
#[async_trait]
pub trait FrameSource: Send + Sync {
    fn kind(&self) -> MediaKind;

    /// Codec MIME type
    fn codec(&self) -> String;

    /// Next frame, `None` once the track ended
    async fn next_frame(&self) -> Option<MediaFrame>;
}

/// `FrameSource` over a webrtc-rs remote track
pub struct RemoteTrackSource {
    track: Arc<TrackRemote>,
    kind: MediaKind,
    codec: String,
}

impl RemoteTrackSource {
    pub fn new(track: Arc<TrackRemote>) -> Self {
        let codec = track.codec().capability.mime_type;
        let kind = match track.kind() {
            RTPCodecType::Audio => MediaKind::Audio,
            RTPCodecType::Video => MediaKind::Video,
            _ if codec.to_lowercase().starts_with("audio/") => MediaKind::Audio,
            _ => MediaKind::Video,
        };
        Self { track, kind, codec }
    }
}

#[async_trait]
impl FrameSource for RemoteTrackSource {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn codec(&self) -> String {
        self.codec.clone()
    }

    async fn next_frame(&self) -> Option<MediaFrame> {
        match self.track.read_rtp().await {
            Ok((packet, _attributes)) => Some(MediaFrame::new(packet)),
            Err(e) => {
                debug!("Remote track {} stopped: {}", self.track.id(), e);
                None
            }
        }
    }
}

/// Registry of inbound tracks for one session
pub struct TrackRegistry {
    session: Arc<Session>,
    events: Arc<EventBus>,
    sink: Arc<dyn FrameSink>,
    /// Session-wide interrupt, cancelled on operator stop
    interrupt: CancellationToken,
    /// Child token owned by the receive loops
    loops: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TrackRegistry {
    pub fn new(
        session: Arc<Session>,
        events: Arc<EventBus>,
        sink: Arc<dyn FrameSink>,
        interrupt: CancellationToken,
    ) -> Self {
        let loops = interrupt.child_token();
        Self {
            session,
            events,
            sink,
            interrupt,
            loops,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register an inbound track and start its receive loop
    ///
    /// Returns the track id, or `None` when the session is already closed.
    pub fn register(&self, source: Arc<dyn FrameSource>) -> Option<u64> {
        // Held until the loop is tracked, so stop_all sees every attached track
        let mut tasks = self.tasks.lock();
        if self.loops.is_cancelled() {
            debug!("Ignoring track after shutdown began");
            return None;
        }

        let handle = self.session.add_track(source.kind(), source.codec())?;
        info!(
            "Track {} added: {} ({})",
            handle.id, handle.kind, handle.codec
        );

        if let Err(e) = self.sink.attach(&handle) {
            warn!(
                "{} sink could not attach track {}: {}",
                self.sink.name(),
                handle.id,
                e
            );
        }

        self.events.publish(SessionEvent::TrackAdded {
            track_id: handle.id,
            kind: handle.kind,
            codec: handle.codec.clone(),
        });

        let id = handle.id;
        let task = tokio::spawn(receive_loop(
            self.session.clone(),
            self.events.clone(),
            self.sink.clone(),
            self.interrupt.clone(),
            self.loops.clone(),
            handle,
            source,
        ));
        tasks.push(task);

        Some(id)
    }

    /// Number of receive loops started so far
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every receive loop and wait for them to finish
    pub async fn stop_all(&self) {
        let tasks: Vec<_> = {
            let mut tasks = self.tasks.lock();
            self.loops.cancel();
            std::mem::take(&mut *tasks)
        };
        if tasks.is_empty() {
            return;
        }

        debug!("Stopping {} receive loops", tasks.len());
        for mut task in tasks {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!("Receive loop did not stop in {:?}, aborting", STOP_GRACE);
                task.abort();
            }
        }
    }
}

async fn receive_loop(
    session: Arc<Session>,
    events: Arc<EventBus>,
    sink: Arc<dyn FrameSink>,
    interrupt: CancellationToken,
    stop: CancellationToken,
    handle: TrackHandle,
    source: Arc<dyn FrameSource>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            frame = source.next_frame() => frame,
        };

        let Some(frame) = frame else {
            let frames = session
                .track(handle.id)
                .map(|t| t.total_frames())
                .unwrap_or(0);
            info!(
                "Track {} ({}) ended after {} frames",
                handle.id, handle.kind, frames
            );
            events.publish(SessionEvent::TrackEnded {
                track_id: handle.id,
                frames,
            });
            break;
        };

        if let Some(fps) = session.record_frame(handle.id, frame.len(), frame.received_at) {
            debug!("Track {} ({}) at {:.1} fps", handle.id, handle.kind, fps);
            events.publish(SessionEvent::TrackRate {
                track_id: handle.id,
                fps,
            });
        }

        if sink.consume(&handle, &frame) == SinkControl::Cancel {
            info!("Stop requested from {} sink", sink.name());
            interrupt.cancel();
            break;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{frame, ChannelSource};
    use super::*;
    use crate::error::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        attached: AtomicUsize,
        consumed: AtomicUsize,
        cancel_after: Option<usize>,
    }

    impl FrameSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn attach(&self, _track: &TrackHandle) -> Result<()> {
            self.attached.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn consume(&self, _track: &TrackHandle, _frame: &MediaFrame) -> SinkControl {
            let n = self.consumed.fetch_add(1, Ordering::SeqCst) + 1;
            match self.cancel_after {
                Some(limit) if n >= limit => SinkControl::Cancel,
                _ => SinkControl::Continue,
            }
        }

        fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    fn registry(sink: Arc<CountingSink>) -> (TrackRegistry, Arc<Session>, CancellationToken) {
        let events = Arc::new(EventBus::new());
        let session = Arc::new(Session::new(events.clone()));
        let cancel = CancellationToken::new();
        let registry = TrackRegistry::new(session.clone(), events, sink, cancel.clone());
        (registry, session, cancel)
    }

    #[test]
    fn test_rate_sampled_once_per_interval() {
        let start = Instant::now();
        let mut handle = TrackHandle::new(1, MediaKind::Video, "video/VP8", start);

        for i in 0..29 {
            assert!(handle
                .on_frame(100, start + Duration::from_millis(i * 30))
                .is_none());
        }
        let fps = handle.on_frame(100, start + Duration::from_secs(1)).unwrap();
        assert!((fps - 30.0).abs() < 1e-9);
        assert_eq!(handle.total_frames(), 30);
        assert_eq!(handle.total_bytes(), 3000);
        assert_eq!(handle.last_rate(), Some(fps));

        // Counter was reset
        assert!(handle
            .on_frame(100, start + Duration::from_millis(1500))
            .is_none());
    }

    #[tokio::test]
    async fn test_frames_reach_sink_and_track_table() {
        let sink = Arc::new(CountingSink::default());
        let (registry, session, _cancel) = registry(sink.clone());

        let (source, tx) = ChannelSource::new(MediaKind::Video, "video/H264");
        let id = registry.register(source).unwrap();
        assert_eq!(sink.attached.load(Ordering::SeqCst), 1);

        for _ in 0..5 {
            tx.send(frame(&[1, 2, 3])).unwrap();
        }
        drop(tx);

        registry.stop_all_after_drain().await;

        assert_eq!(sink.consumed.load(Ordering::SeqCst), 5);
        let track = session.track(id).unwrap();
        assert_eq!(track.total_frames(), 5);
        assert_eq!(track.total_bytes(), 15);
        assert_eq!(track.codec, "video/H264");
    }

    #[tokio::test]
    async fn test_sink_cancel_interrupts_session() {
        let sink = Arc::new(CountingSink {
            cancel_after: Some(2),
            ..Default::default()
        });
        let (registry, _session, cancel) = registry(sink.clone());

        let (source, tx) = ChannelSource::new(MediaKind::Video, "video/VP8");
        registry.register(source);
        for _ in 0..4 {
            tx.send(frame(&[0])).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), cancel.cancelled())
            .await
            .expect("operator cancel should propagate");
        registry.stop_all().await;
        assert_eq!(sink.consumed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_register_refused_after_stop() {
        let sink = Arc::new(CountingSink::default());
        let (registry, _session, _cancel) = registry(sink.clone());

        registry.stop_all().await;
        let (source, _tx) = ChannelSource::new(MediaKind::Audio, "audio/opus");
        assert!(registry.register(source).is_none());
        assert_eq!(sink.attached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_register_refused_when_session_closed() {
        let sink = Arc::new(CountingSink::default());
        let (registry, session, _cancel) = registry(sink);

        assert!(session.begin_close());
        let (source, _tx) = ChannelSource::new(MediaKind::Audio, "audio/opus");
        assert!(registry.register(source).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_ends_idle_loops() {
        let sink = Arc::new(CountingSink::default());
        let (registry, _session, cancel) = registry(sink);

        let (source, _tx) = ChannelSource::new(MediaKind::Audio, "audio/opus");
        registry.register(source);
        assert_eq!(registry.len(), 1);

        tokio::time::timeout(Duration::from_secs(1), registry.stop_all())
            .await
            .unwrap();
        assert!(registry.is_empty());
        // Stopping the loops does not interrupt the session
        assert!(!cancel.is_cancelled());
    }

    impl TrackRegistry {
        /// Wait for loops to finish on their own (sources closed)
        async fn stop_all_after_drain(&self) {
            let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
            for task in tasks {
                let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
            }
        }
    }
}
