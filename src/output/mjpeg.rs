use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{ensure_dir, ChunkPlan, FrameWriter};
use crate::frame::Frame;

const JPEG_QUALITY: u8 = 85;

/// Motion-JPEG chunks: concatenated baseline JPEG images per
/// `chunk_NNNN.mjpeg` file.
pub struct MjpegWriter {
    dir: PathBuf,
    plan: ChunkPlan,
    next_chunk: u32,
    current: Option<(BufWriter<File>, u64)>,
    closed: bool,
}

impl MjpegWriter {
    pub fn create(dir: &Path, plan: ChunkPlan) -> Result<Self> {
        ensure_dir(dir)?;
        log::info!("writing MJPEG chunks to {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            plan,
            next_chunk: 0,
            current: None,
            closed: false,
        })
    }

    fn open_chunk(&mut self) -> Result<BufWriter<File>> {
        let path = self.dir.join(format!("chunk_{:04}.mjpeg", self.next_chunk));
        self.next_chunk += 1;
        let file = File::create(&path)
            .map_err(|e| anyhow!("failed to create {}: {}", path.display(), e))?;
        Ok(BufWriter::new(file))
    }
}

impl FrameWriter for MjpegWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(anyhow!("write to closed writer"));
        }
        let full = self
            .current
            .as_ref()
            .map_or(true, |(_, frames)| self.plan.is_full(*frames));
        if full {
            if let Some((mut out, _)) = self.current.take() {
                out.flush().context("flush mjpeg chunk")?;
            }
            let out = self.open_chunk()?;
            self.current = Some((out, 0));
        }
        let (out, frames) = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow!("no open chunk"))?;
        let encoder = JpegEncoder::new_with_quality(&mut *out, JPEG_QUALITY);
        frame
            .image()
            .write_with_encoder(encoder)
            .context("encode jpeg frame")?;
        *frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        if let Some((mut out, _)) = self.current.take() {
            out.flush().context("flush mjpeg chunk")?;
        }
        Ok(())
    }
}
