use anyhow::Result;
use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Final consumer of each composited frame and its status text.
pub trait StreamSink {
    fn send_data(&mut self, frame: &Frame, text: &[String]) -> Result<()>;

    /// True once the consumer asked the pipeline to stop.
    fn check_exit(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}

/// Logs a one-line summary at most once per interval.
pub struct LogStreamSink {
    interval: Duration,
    last_log: Option<Instant>,
    frames: u64,
}

impl LogStreamSink {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_log: None,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for LogStreamSink {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl StreamSink for LogStreamSink {
    fn send_data(&mut self, frame: &Frame, text: &[String]) -> Result<()> {
        self.frames += 1;
        let due = self
            .last_log
            .map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            self.last_log = Some(Instant::now());
            let objects = text
                .iter()
                .skip_while(|line| line.as_str() != "Objects:")
                .skip(1)
                .count();
            log::info!(
                "frame {} ({}x{}): {} tracked objects, {} overlays",
                frame.index,
                frame.width(),
                frame.height(),
                objects,
                frame.overlays().len()
            );
        }
        for line in text {
            log::trace!("{}", line);
        }
        Ok(())
    }
}
