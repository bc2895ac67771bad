use anyhow::{anyhow, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub(super) const SCHEME: &str = "stub://";

/// Generated frames for tests and demos.
///
/// `stub://name` runs forever; `stub://name?frames=N` ends after N frames.
pub struct SyntheticSource {
    arg: String,
    width: u32,
    height: u32,
    limit: Option<u64>,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn from_arg(arg: &str, width: u32, height: u32) -> Result<Self> {
        let rest = arg
            .strip_prefix(SCHEME)
            .ok_or_else(|| anyhow!("synthetic source needs a {} argument, got '{}'", SCHEME, arg))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        if name.trim().is_empty() {
            return Err(anyhow!("synthetic source '{}' has no name", arg));
        }
        let mut limit = None;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("frames", n)) => {
                    limit = Some(n.parse::<u64>().map_err(|_| {
                        anyhow!("synthetic source '{}': frames must be an integer", arg)
                    })?);
                }
                _ => return Err(anyhow!("synthetic source '{}': unknown option '{}'", arg, pair)),
            }
        }
        Ok(Self {
            arg: arg.to_string(),
            width,
            height,
            limit,
            frame_count: 0,
            connected: false,
        })
    }

    fn render(&self, index: u64) -> Result<Frame> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut pixels = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let shade = ((x + y) as u64 / 4 + index) % 64;
                let base = 96 + shade as u8;
                pixels.extend_from_slice(&[base, base, base.saturating_add(16)]);
            }
        }
        Frame::new(pixels, self.width, self.height, index)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.arg);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("{}: next_frame before connect", self.arg));
        }
        if self.limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let frame = self.render(self.frame_count)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.arg.clone(),
        }
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_limit() -> Result<()> {
        let source = SyntheticSource::from_arg("stub://cam?frames=12", 8, 8)?;
        assert_eq!(source.limit, Some(12));
        assert!(SyntheticSource::from_arg("stub://cam?frames=x", 8, 8).is_err());
        assert!(SyntheticSource::from_arg("stub://cam?fps=3", 8, 8).is_err());
        assert!(SyntheticSource::from_arg("stub://", 8, 8).is_err());
        Ok(())
    }

    #[test]
    fn frames_are_indexed_from_zero() -> Result<()> {
        let mut source = SyntheticSource::from_arg("stub://cam", 8, 8)?;
        assert!(source.next_frame().is_err());
        source.connect()?;
        let first = source.next_frame()?.expect("frame");
        let second = source.next_frame()?.expect("frame");
        assert_eq!((first.index, second.index), (0, 1));
        assert_ne!(first.data(), second.data());
        Ok(())
    }
}
