//! FFmpeg-backed source for video files, network cameras and USB devices.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::{device_path, FrameSource, SourceStats};
use crate::config::StreamMode;
use crate::frame::Frame;

pub struct FfmpegSource {
    location: String,
    mode: StreamMode,
    input: Option<ffmpeg::format::context::Input>,
    stream_index: usize,
    decoder: Option<ffmpeg::codec::decoder::Video>,
    scaler: Option<ffmpeg::software::scaling::Context>,
    frame_count: u64,
    eof_sent: bool,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    last_error: Option<String>,
}

impl FfmpegSource {
    pub fn new(mode: StreamMode, arg: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        if mode == StreamMode::Usb {
            ffmpeg::device::register_all();
        }
        Ok(Self {
            location: device_path(mode, arg),
            mode,
            input: None,
            stream_index: 0,
            decoder: None,
            scaler: None,
            frame_count: 0,
            eof_sent: false,
            last_frame_at: None,
            connected_at: None,
            last_error: None,
        })
    }

    fn health_grace(&self) -> Duration {
        match self.mode {
            StreamMode::File => Duration::from_secs(2),
            StreamMode::Ip | StreamMode::Usb => Duration::from_secs(5),
        }
    }

    fn to_frame(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("{}: scaler not initialised", self.location))?;
        let mut rgb = ffmpeg::frame::Video::empty();
        scaler.run(decoded, &mut rgb).context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb)?;
        let frame = Frame::new(pixels, width, height, self.frame_count)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(frame)
    }
}

impl FrameSource for FfmpegSource {
    fn connect(&mut self) -> Result<()> {
        let input = ffmpeg::format::input(&self.location)
            .with_context(|| format!("failed to open '{}' with ffmpeg", self.location))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", self.location))?;
        let stream_index = stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        self.input = Some(input);
        self.stream_index = stream_index;
        self.decoder = Some(decoder);
        self.scaler = Some(scaler);
        self.connected_at = Some(Instant::now());
        log::info!("FfmpegSource: connected to {} ({:?})", self.location, self.mode);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            let decoder = self
                .decoder
                .as_mut()
                .ok_or_else(|| anyhow!("{}: next_frame before connect", self.location))?;
            if decoder.receive_frame(&mut decoded).is_ok() {
                return self.to_frame(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let input = self
                .input
                .as_mut()
                .ok_or_else(|| anyhow!("{}: next_frame before connect", self.location))?;
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    decoder
                        .send_packet(&packet)
                        .context("send packet to ffmpeg decoder")?;
                }
                Err(ffmpeg::Error::Eof) => {
                    decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                    log::info!("{}: end of stream after {} frames", self.location, self.frame_count);
                }
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    return Err(anyhow!("{}: read failed: {}", self.location, e));
                }
            }
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        match self.last_frame_at {
            Some(last) => last.elapsed() <= self.health_grace(),
            None => connected_at.elapsed() <= self.health_grace(),
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.location.clone(),
        }
    }

    fn close(&mut self) {
        self.scaler = None;
        self.decoder = None;
        self.input = None;
        log::debug!("{}: closed", self.location);
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}
