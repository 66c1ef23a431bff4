//! Display strategy
//!
//! Video frames go to a `PresentationSurface`. After every frame the sink asks
//! the surface whether the operator wants to stop; a positive answer is turned
//! into `SinkControl::Cancel`, which the receive loop propagates as a session
//! interrupt.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{FrameSink, SinkControl};
use crate::error::Result;
use crate::utils::LogThrottler;
use crate::webrtc::signaling::MediaKind;
use crate::webrtc::track::{MediaFrame, TrackHandle};
use crate::{info_throttled, warn_throttled};

/// Where presented video ends up
pub trait PresentationSurface: Send + Sync {
    /// Prepare output for a video track
    fn open(&self, track: &TrackHandle) -> Result<()>;

    fn present(&self, track: &TrackHandle, frame: &MediaFrame) -> Result<()>;

    /// `true` once the operator asked to stop
    fn poll_cancel(&self) -> bool;

    /// Release the surface
    fn close(&self) -> Result<()>;
}

/// Sink that forwards video to a presentation surface
pub struct DisplaySink {
    surface: Arc<dyn PresentationSurface>,
    throttler: LogThrottler,
}

impl DisplaySink {
    pub fn new(surface: Arc<dyn PresentationSurface>) -> Self {
        Self {
            surface,
            throttler: LogThrottler::with_secs(5),
        }
    }
}

impl FrameSink for DisplaySink {
    fn name(&self) -> &'static str {
        "display"
    }

    fn attach(&self, track: &TrackHandle) -> Result<()> {
        match track.kind {
            MediaKind::Video => self.surface.open(track),
            MediaKind::Audio => {
                debug!("Display ignores audio track {}", track.id);
                Ok(())
            }
        }
    }

    fn consume(&self, track: &TrackHandle, frame: &MediaFrame) -> SinkControl {
        if track.kind == MediaKind::Video {
            if let Err(e) = self.surface.present(track, frame) {
                warn_throttled!(
                    self.throttler,
                    &format!("present_{}", track.id),
                    "Failed to present frame of track {}: {}",
                    track.id,
                    e
                );
            }
        }

        if self.surface.poll_cancel() {
            SinkControl::Cancel
        } else {
            SinkControl::Continue
        }
    }

    fn stop(&self) -> Result<()> {
        self.surface.close()
    }
}

/// Terminal-backed surface
///
/// Reports presentation progress through the log and reads operator input
/// from stdin: a line with `q`, `quit` or ESC requests a stop.
pub struct ConsoleSurface {
    cancel_requested: Arc<AtomicBool>,
    presented: Mutex<HashMap<u64, u64>>,
    throttler: LogThrottler,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self {
            cancel_requested: Arc::new(AtomicBool::new(false)),
            presented: Mutex::new(HashMap::new()),
            throttler: LogThrottler::with_secs(5),
        }
    }

    /// Start the stdin reader
    ///
    /// Runs on a plain thread: a blocking stdin read must not keep the async
    /// runtime from shutting down.
    pub fn listen_for_quit(&self) -> Result<()> {
        let flag = self.cancel_requested.clone();
        std::thread::Builder::new()
            .name("console-input".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if is_quit_command(&line) {
                        info!("Quit requested from console");
                        flag.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            })?;
        info!("Display active, type 'q' and Enter to stop");
        Ok(())
    }

    /// Request a stop as if the operator typed `q`
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }
}

impl Default for ConsoleSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSurface for ConsoleSurface {
    fn open(&self, track: &TrackHandle) -> Result<()> {
        self.presented.lock().insert(track.id, 0);
        info!("Presenting video track {} ({})", track.id, track.codec);
        Ok(())
    }

    fn present(&self, track: &TrackHandle, frame: &MediaFrame) -> Result<()> {
        let count = {
            let mut presented = self.presented.lock();
            let count = presented.entry(track.id).or_insert(0);
            *count += 1;
            *count
        };
        info_throttled!(
            self.throttler,
            &format!("present_{}", track.id),
            "Track {}: {} frames presented (last {} bytes, seq {})",
            track.id,
            count,
            frame.len(),
            frame.packet.header.sequence_number
        );
        Ok(())
    }

    fn poll_cancel(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        for (id, count) in self.presented.lock().drain() {
            info!("Track {}: {} frames presented in total", id, count);
        }
        Ok(())
    }
}

fn is_quit_command(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.eq_ignore_ascii_case("q")
        || trimmed.eq_ignore_ascii_case("quit")
        || trimmed.contains('\u{1b}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webrtc::track::testing::frame;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Default)]
    struct FakeSurface {
        opened: AtomicUsize,
        presented: AtomicUsize,
        closed: AtomicBool,
        cancel: AtomicBool,
    }

    impl PresentationSurface for FakeSurface {
        fn open(&self, _track: &TrackHandle) -> Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn present(&self, _track: &TrackHandle, _frame: &MediaFrame) -> Result<()> {
            self.presented.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn poll_cancel(&self) -> bool {
            self.cancel.load(Ordering::SeqCst)
        }

        fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_only_video_is_presented() {
        let surface = Arc::new(FakeSurface::default());
        let sink = DisplaySink::new(surface.clone());
        let video = TrackHandle::new(1, MediaKind::Video, "video/VP8", Instant::now());
        let audio = TrackHandle::new(2, MediaKind::Audio, "audio/opus", Instant::now());

        sink.attach(&video).unwrap();
        sink.attach(&audio).unwrap();
        assert_eq!(surface.opened.load(Ordering::SeqCst), 1);

        assert_eq!(sink.consume(&video, &frame(&[1])), SinkControl::Continue);
        assert_eq!(sink.consume(&audio, &frame(&[1])), SinkControl::Continue);
        assert_eq!(surface.presented.load(Ordering::SeqCst), 1);

        sink.stop().unwrap();
        assert!(surface.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_operator_cancel_is_reported() {
        let surface = Arc::new(FakeSurface::default());
        let sink = DisplaySink::new(surface.clone());
        let video = TrackHandle::new(1, MediaKind::Video, "video/H264", Instant::now());

        assert_eq!(sink.consume(&video, &frame(&[1])), SinkControl::Continue);
        surface.cancel.store(true, Ordering::SeqCst);
        assert_eq!(sink.consume(&video, &frame(&[1])), SinkControl::Cancel);
    }

    #[test]
    fn test_console_surface_cancel_flag() {
        let surface = ConsoleSurface::new();
        let video = TrackHandle::new(3, MediaKind::Video, "video/VP9", Instant::now());
        surface.open(&video).unwrap();
        surface.present(&video, &frame(&[0; 4])).unwrap();
        assert!(!surface.poll_cancel());

        surface.request_cancel();
        assert!(surface.poll_cancel());
        surface.close().unwrap();
    }

    #[test]
    fn test_quit_commands() {
        assert!(is_quit_command("q"));
        assert!(is_quit_command(" QUIT \n"));
        assert!(is_quit_command("\u{1b}"));
        assert!(!is_quit_command("quiet"));
        assert!(!is_quit_command(""));
    }
}
