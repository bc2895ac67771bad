//! Frame acquisition.
//!
//! Every source sits behind the blocking `FrameSource` interface so the
//! pipeline does not care whether frames come from a file, a network camera,
//! a USB device or the synthetic generator.
//!
//! - `stub://name[?frames=N]` arguments open a `SyntheticSource` in any mode.
//! - FILE, IP and USB arguments use FFmpeg (feature: ingest-ffmpeg).

#[cfg(feature = "ingest-ffmpeg")]
mod ffmpeg;
mod synthetic;

use anyhow::Result;

use crate::config::{StreamConfig, StreamMode};
use crate::frame::Frame;

#[cfg(feature = "ingest-ffmpeg")]
pub use ffmpeg::FfmpegSource;
pub use synthetic::SyntheticSource;

/// Counters reported by a source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub trait FrameSource: Send {
    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is decoded. `Ok(None)` marks the end of the
    /// stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release the stream. Called once during teardown.
    fn close(&mut self) {}
}

/// Build the source described by `cfg`.
pub fn open_source(cfg: &StreamConfig) -> Result<Box<dyn FrameSource>> {
    if cfg.arg.starts_with(synthetic::SCHEME) {
        return Ok(Box::new(SyntheticSource::from_arg(
            &cfg.arg,
            cfg.frame_size.0,
            cfg.frame_size.1,
        )?));
    }
    open_device(cfg)
}

#[cfg(feature = "ingest-ffmpeg")]
fn open_device(cfg: &StreamConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FfmpegSource::new(cfg.mode, &cfg.arg)?))
}

#[cfg(not(feature = "ingest-ffmpeg"))]
fn open_device(cfg: &StreamConfig) -> Result<Box<dyn FrameSource>> {
    let kind = match cfg.mode {
        StreamMode::File => "file",
        StreamMode::Ip => "IP camera",
        StreamMode::Usb => "USB camera",
    };
    Err(anyhow::anyhow!(
        "stream '{}': {} ingestion of '{}' requires the ingest-ffmpeg feature",
        cfg.name,
        kind,
        cfg.arg
    ))
}

/// FFmpeg input location for a stream argument. USB devices given as an
/// index map to `/dev/videoN`.
pub fn device_path(mode: StreamMode, arg: &str) -> String {
    match mode {
        StreamMode::Usb if arg.chars().all(|c| c.is_ascii_digit()) => format!("/dev/video{}", arg),
        _ => arg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(arg: &str) -> StreamConfig {
        StreamConfig {
            name: "front".to_string(),
            mode: StreamMode::File,
            arg: arg.to_string(),
            frame_size: (320, 240),
        }
    }

    #[test]
    fn stub_arguments_open_synthetic_source() -> Result<()> {
        let mut source = open_source(&stream("stub://front?frames=2"))?;
        source.connect()?;
        let frame = source.next_frame()?.expect("first frame");
        assert_eq!(frame.size(), (320, 240));
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    #[test]
    fn device_sources_need_ffmpeg() {
        let err = open_source(&stream("/var/video.mp4")).err().unwrap();
        assert!(err.to_string().contains("ingest-ffmpeg"));
    }

    #[test]
    fn usb_index_maps_to_device_node() {
        assert_eq!(device_path(StreamMode::Usb, "2"), "/dev/video2");
        assert_eq!(device_path(StreamMode::Usb, "/dev/video5"), "/dev/video5");
        assert_eq!(device_path(StreamMode::Ip, "rtsp://cam/1"), "rtsp://cam/1");
    }
}
