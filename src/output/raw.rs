use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{ensure_dir, ChunkPlan, FrameWriter};
use crate::frame::{Frame, TextOverlay};

/// Sidecar describing one raw chunk.
#[derive(Debug, Serialize)]
struct ChunkIndex {
    pixel_format: &'static str,
    width: u32,
    height: u32,
    fps: f32,
    first_frame_index: u64,
    frames: u64,
    /// Text overlays per frame, in frame order.
    overlays: Vec<Vec<TextOverlay>>,
}

struct Chunk {
    data_path: PathBuf,
    out: BufWriter<File>,
    index: ChunkIndex,
}

/// Writes packed rgb24 frames to `chunk_NNNN.rgb` files, each with a
/// `chunk_NNNN.json` sidecar giving dimensions and frame rate.
///
/// A new chunk starts when the current one is full or the frame size changes.
pub struct RawVideoWriter {
    dir: PathBuf,
    fps: f32,
    plan: ChunkPlan,
    next_chunk: u32,
    current: Option<Chunk>,
    closed: bool,
}

impl RawVideoWriter {
    pub fn create(dir: &Path, fps: f32, plan: ChunkPlan) -> Result<Self> {
        ensure_dir(dir)?;
        log::info!("writing raw video chunks to {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            fps,
            plan,
            next_chunk: 0,
            current: None,
            closed: false,
        })
    }

    fn chunk_path(&self, n: u32, ext: &str) -> PathBuf {
        self.dir.join(format!("chunk_{:04}.{}", n, ext))
    }

    fn start_chunk(&mut self, frame: &Frame) -> Result<Chunk> {
        let data_path = self.chunk_path(self.next_chunk, "rgb");
        self.next_chunk += 1;
        let file = File::create(&data_path)
            .map_err(|e| anyhow!("failed to create {}: {}", data_path.display(), e))?;
        Ok(Chunk {
            data_path,
            out: BufWriter::new(file),
            index: ChunkIndex {
                pixel_format: "rgb24",
                width: frame.width(),
                height: frame.height(),
                fps: self.fps,
                first_frame_index: frame.index,
                frames: 0,
                overlays: Vec::new(),
            },
        })
    }

    fn finish_chunk(chunk: Chunk) -> Result<()> {
        let Chunk {
            data_path,
            mut out,
            index,
        } = chunk;
        out.flush()
            .with_context(|| format!("flush {}", data_path.display()))?;
        let sidecar = data_path.with_extension("json");
        let json = serde_json::to_vec_pretty(&index)?;
        std::fs::write(&sidecar, json)
            .map_err(|e| anyhow!("failed to write {}: {}", sidecar.display(), e))?;
        log::debug!("closed chunk {} ({} frames)", data_path.display(), index.frames);
        Ok(())
    }
}

impl FrameWriter for RawVideoWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(anyhow!("write to closed writer"));
        }
        let rotate = match &self.current {
            Some(chunk) => {
                self.plan.is_full(chunk.index.frames)
                    || (chunk.index.width, chunk.index.height) != frame.size()
            }
            None => true,
        };
        if rotate {
            if let Some(done) = self.current.take() {
                Self::finish_chunk(done)?;
            }
            self.current = Some(self.start_chunk(frame)?);
        }
        let chunk = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow!("no open chunk"))?;
        chunk
            .out
            .write_all(frame.data())
            .with_context(|| format!("write {}", chunk.data_path.display()))?;
        chunk.index.frames += 1;
        chunk.index.overlays.push(frame.overlays().to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.current.take() {
            Some(chunk) => Self::finish_chunk(chunk),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BLACK;

    #[test]
    fn rotates_chunks_by_frame_count_and_size() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = RawVideoWriter::create(dir.path(), 2.0, ChunkPlan::new(2.0, Some(1.0)))?;
        for i in 0..3 {
            let mut frame = Frame::blank(4, 2, BLACK);
            frame.index = i;
            writer.write_frame(&frame)?;
        }
        writer.write_frame(&Frame::blank(8, 2, BLACK))?;
        writer.close()?;

        let first: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("chunk_0000.json"))?)?;
        assert_eq!(first["frames"], 2);
        assert_eq!(first["pixel_format"], "rgb24");
        assert_eq!(std::fs::metadata(dir.path().join("chunk_0000.rgb"))?.len(), 2 * 4 * 2 * 3);

        let second: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("chunk_0001.json"))?)?;
        assert_eq!(second["first_frame_index"], 2);
        assert_eq!(second["frames"], 1);

        let third: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("chunk_0002.json"))?)?;
        assert_eq!(third["width"], 8);

        assert!(writer.write_frame(&Frame::blank(4, 2, BLACK)).is_err());
        Ok(())
    }
}
