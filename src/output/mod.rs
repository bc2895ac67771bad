//! Downstream consumers of rendered frames: file writers, the stream sink and
//! the tracking-results recorder.

mod mjpeg;
mod raw;
mod results;
mod stream_sink;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::config::{Codec, OutputConfig};
use crate::frame::Frame;

pub use mjpeg::MjpegWriter;
pub use raw::RawVideoWriter;
pub use results::{read_results, ResultsRecorder, TrackingFrame};
pub use stream_sink::{LogStreamSink, StreamSink};

pub trait FrameWriter: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and release files. Further writes are errors.
    fn close(&mut self) -> Result<()>;
}

/// Substituted when output is disabled.
#[derive(Debug, Default)]
pub struct NullWriter {
    frames: u64,
}

impl NullWriter {
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }
}

impl FrameWriter for NullWriter {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Build the writer selected by configuration.
pub fn open_writer(cfg: &OutputConfig) -> Result<Box<dyn FrameWriter>> {
    if !cfg.enabled {
        return Ok(Box::new(NullWriter::default()));
    }
    let plan = ChunkPlan::new(cfg.fps, cfg.chunk_duration.map(|d| d.as_secs_f32()));
    match cfg.codec {
        Codec::Raw => Ok(Box::new(RawVideoWriter::create(&cfg.path, cfg.fps, plan)?)),
        Codec::Mjpeg => Ok(Box::new(MjpegWriter::create(&cfg.path, plan)?)),
    }
}

/// How many frames go into one output chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    frames_per_chunk: Option<u64>,
}

impl ChunkPlan {
    pub fn new(fps: f32, chunk_secs: Option<f32>) -> Self {
        let frames_per_chunk = chunk_secs.map(|secs| ((fps * secs).round() as u64).max(1));
        Self { frames_per_chunk }
    }

    pub fn unchunked() -> Self {
        Self {
            frames_per_chunk: None,
        }
    }

    /// True when a chunk holding `frames_in_chunk` frames is full.
    pub fn is_full(&self, frames_in_chunk: u64) -> bool {
        self.frames_per_chunk
            .is_some_and(|limit| frames_in_chunk >= limit)
    }
}

pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| anyhow!("failed to create output directory {}: {}", path.display(), e))
}
