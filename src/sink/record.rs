//! Record strategy
//!
//! Each track is written by one of the webrtc media writers, chosen by codec:
//!
//! | Codec | Container | File                  |
//! |-------|-----------|-----------------------|
//! | VP8   | IVF       | `<output>-video.ivf`  |
//! | VP9   | IVF       | `<output>-video.ivf`  |
//! | H.264 | Annex-B   | `<output>-video.h264` |
//! | Opus  | Ogg       | `<output>-audio.ogg`  |
//!
//! A second track of the same kind gets its id appended to the file name.
//! Tracks with other codecs are not recorded.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};
use webrtc::media::io::h264_writer::H264Writer;
use webrtc::media::io::ivf_reader::IVFFileHeader;
use webrtc::media::io::ivf_writer::IVFWriter;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::media::io::Writer;

use super::{FrameSink, SinkControl};
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::warn_throttled;
use crate::webrtc::signaling::MediaKind;
use crate::webrtc::track::{MediaFrame, TrackHandle};

const OPUS_SAMPLE_RATE: u32 = 48000;
const OPUS_CHANNELS: u8 = 2;

/// Container chosen for a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Ivf { four_cc: [u8; 4] },
    AnnexB,
    Ogg,
}

impl Container {
    fn for_codec(mime_type: &str) -> Option<Self> {
        let mime = mime_type.to_lowercase();
        if mime.ends_with("/vp8") {
            Some(Container::Ivf { four_cc: *b"VP80" })
        } else if mime.ends_with("/vp9") {
            Some(Container::Ivf { four_cc: *b"VP90" })
        } else if mime.ends_with("/h264") {
            Some(Container::AnnexB)
        } else if mime.ends_with("/opus") {
            Some(Container::Ogg)
        } else {
            None
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Container::Ivf { .. } => "ivf",
            Container::AnnexB => "h264",
            Container::Ogg => "ogg",
        }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Writer + Send>> {
        let file = File::create(path)?;
        let writer: Box<dyn Writer + Send> = match self {
            Container::Ivf { four_cc } => {
                let header = IVFFileHeader {
                    signature: *b"DKIF",
                    version: 0,
                    header_size: 32,
                    four_cc: *four_cc,
                    width: 640,
                    height: 480,
                    timebase_denominator: 30,
                    timebase_numerator: 1,
                    num_frames: 900,
                    unused: 0,
                };
                Box::new(IVFWriter::new(file, &header).map_err(writer_error)?)
            }
            Container::AnnexB => Box::new(H264Writer::new(file)),
            Container::Ogg => Box::new(
                OggWriter::new(file, OPUS_SAMPLE_RATE, OPUS_CHANNELS).map_err(writer_error)?,
            ),
        };
        Ok(writer)
    }
}

fn writer_error(e: impl std::fmt::Display) -> AppError {
    AppError::Io(std::io::Error::other(e.to_string()))
}

struct TrackWriter {
    path: PathBuf,
    writer: Box<dyn Writer + Send>,
    written: u64,
}

/// Sink that persists each track under an output base path
pub struct RecordSink {
    output: PathBuf,
    writers: Mutex<HashMap<u64, TrackWriter>>,
    throttler: LogThrottler,
}

impl RecordSink {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            writers: Mutex::new(HashMap::new()),
            throttler: LogThrottler::with_secs(5),
        }
    }

    /// Create a sink whose output directory exists up front
    pub fn create(output: impl Into<PathBuf>) -> Result<Self> {
        let sink = Self::new(output);
        sink.prepare_output_dir()?;
        Ok(sink)
    }

    fn prepare_output_dir(&self) -> Result<()> {
        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// `<output>-<kind>.<ext>`, or `<output>-<kind>-<id>.<ext>` when taken
    fn path_for(&self, track: &TrackHandle, ext: &str, taken: bool) -> PathBuf {
        let base = self.output.to_string_lossy();
        let name = if taken {
            format!("{}-{}-{}.{}", base, track.kind, track.id, ext)
        } else {
            format!("{}-{}.{}", base, track.kind, ext)
        };
        PathBuf::from(name)
    }

    /// Paths currently being written
    pub fn paths(&self) -> Vec<PathBuf> {
        self.writers
            .lock()
            .values()
            .map(|w| w.path.clone())
            .collect()
    }
}

impl FrameSink for RecordSink {
    fn name(&self) -> &'static str {
        "record"
    }

    fn attach(&self, track: &TrackHandle) -> Result<()> {
        let Some(container) = Container::for_codec(&track.codec) else {
            warn!(
                "Not recording track {}: unsupported codec {}",
                track.id, track.codec
            );
            return Ok(());
        };

        self.prepare_output_dir()?;

        let mut writers = self.writers.lock();
        let first = self.path_for(track, container.extension(), false);
        let taken = writers.values().any(|w| w.path == first);
        let path = self.path_for(track, container.extension(), taken);

        let writer = container.open(&path)?;
        info!(
            "Recording {} track {} ({}) to {}",
            track.kind,
            track.id,
            track.codec,
            path.display()
        );
        writers.insert(
            track.id,
            TrackWriter {
                path,
                writer,
                written: 0,
            },
        );
        Ok(())
    }

    fn consume(&self, track: &TrackHandle, frame: &MediaFrame) -> SinkControl {
        let mut writers = self.writers.lock();
        if let Some(entry) = writers.get_mut(&track.id) {
            match entry.writer.write_rtp(&frame.packet) {
                Ok(()) => entry.written += 1,
                Err(e) => {
                    warn_throttled!(
                        self.throttler,
                        &format!("record_{}", track.id),
                        "Failed to write packet of track {} to {}: {}",
                        track.id,
                        entry.path.display(),
                        e
                    );
                }
            }
        }
        SinkControl::Continue
    }

    fn stop(&self) -> Result<()> {
        let writers: Vec<_> = self.writers.lock().drain().collect();
        let mut failures = Vec::new();

        for (id, mut entry) in writers {
            match entry.writer.close() {
                Ok(()) => info!(
                    "Track {}: {} packets saved to {}",
                    id,
                    entry.written,
                    entry.path.display()
                ),
                Err(e) => {
                    warn!("Failed to finalize {}: {}", entry.path.display(), e);
                    failures.push(format!("{}: {}", entry.path.display(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Teardown(failures.join("; ")))
        }
    }
}
