use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::{FrameSink, SinkControl};
use crate::error::Result;
use crate::webrtc::track::{MediaFrame, TrackHandle};

/// Drops every frame, keeping only a running count
#[derive(Default)]
pub struct DiscardSink {
    dropped: AtomicU64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for DiscardSink {
    fn name(&self) -> &'static str {
        "discard"
    }

    fn attach(&self, track: &TrackHandle) -> Result<()> {
        debug!("Discarding frames of track {} ({})", track.id, track.codec);
        Ok(())
    }

    fn consume(&self, _track: &TrackHandle, _frame: &MediaFrame) -> SinkControl {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        SinkControl::Continue
    }

    fn stop(&self) -> Result<()> {
        debug!("Discard sink dropped {} frames", self.dropped());
        Ok(())
    }
}
