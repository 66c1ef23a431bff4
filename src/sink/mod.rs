//! Media sink strategies
//!
//! A session routes every received frame into exactly one sink, chosen from
//! `SinkStrategy` when the player starts:
//!
//! - `discard`: drain frames so the transport keeps flowing
//! - `display`: present video on a `PresentationSurface` and honour operator cancel
//! - `record`: write each track to disk with the webrtc media writers

pub mod discard;
pub mod display;
pub mod record;

pub use discard::DiscardSink;
pub use display::{ConsoleSurface, DisplaySink, PresentationSurface};
pub use record::RecordSink;

use std::sync::Arc;

use crate::config::SinkStrategy;
use crate::error::Result;
use crate::webrtc::track::{MediaFrame, TrackHandle};

/// What the receive loop should do after handing over a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    /// Operator asked to stop; treated like an external interrupt
    Cancel,
}

/// Destination for received frames
///
/// Called from the per-track receive loops, so implementations must be
/// cheap and must not block.
pub trait FrameSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// A new track arrived
    fn attach(&self, track: &TrackHandle) -> Result<()>;

    /// Handle one frame of an attached track
    fn consume(&self, track: &TrackHandle, frame: &MediaFrame) -> SinkControl;

    /// Flush and release everything; called once during shutdown
    fn stop(&self) -> Result<()>;
}

/// Build the sink for a strategy
pub fn build_sink(strategy: &SinkStrategy) -> Result<Arc<dyn FrameSink>> {
    let sink: Arc<dyn FrameSink> = match strategy {
        SinkStrategy::Discard => Arc::new(DiscardSink::new()),
        SinkStrategy::Display => {
            let surface = Arc::new(ConsoleSurface::new());
            surface.listen_for_quit()?;
            Arc::new(DisplaySink::new(surface))
        }
        SinkStrategy::Record { output } => Arc::new(RecordSink::create(output.clone())?),
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sink_selects_strategy() {
        let sink = build_sink(&SinkStrategy::Discard).unwrap();
        assert_eq!(sink.name(), "discard");

        let sink = build_sink(&SinkStrategy::Record {
            output: "out".into(),
        })
        .unwrap();
        assert_eq!(sink.name(), "record");
    }
}
