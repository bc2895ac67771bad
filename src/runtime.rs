//! The tick loop with guaranteed teardown.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::event::EventSink;
use crate::output::{FrameWriter, ResultsRecorder, StreamSink};
use crate::pipeline::StreamCompositor;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Elapsed time and tick rate of a run.
#[derive(Clone, Debug, Default)]
pub struct RunStats {
    started: Option<Instant>,
    stopped: Option<Instant>,
    frames: u64,
}

impl RunStats {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.stopped = None;
        self.frames = 0;
    }

    pub fn update(&mut self) {
        self.frames += 1;
    }

    pub fn stop(&mut self) {
        if self.stopped.is_none() {
            self.stopped = Some(Instant::now());
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn elapsed_secs(&self) -> f64 {
        match (self.started, self.stopped) {
            (Some(start), Some(stop)) => stop.duration_since(start).as_secs_f64(),
            (Some(start), None) => start.elapsed().as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Frames per second over the run; 0 before any time has elapsed.
    pub fn fps(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed > 0.0 {
            self.frames as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// External stop request, checked once per tick.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C to this signal.
    pub fn install_ctrlc(&self) -> Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            log::info!("stop requested");
            signal.stop();
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))
    }
}

/// Everything a run owns and must release.
pub struct Runtime {
    pub compositor: StreamCompositor,
    pub writer: Box<dyn FrameWriter>,
    pub stream_sink: Box<dyn StreamSink>,
    pub events: Box<dyn EventSink>,
    pub recorder: Option<ResultsRecorder>,
    pub clock: Arc<dyn Clock>,
    pub stop: StopSignal,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Runtime {
    /// Run ticks until stopped, a stream ends, `max_ticks` is reached or an
    /// error occurs. Teardown runs exactly once on every path; the loop error,
    /// if any, is returned after it.
    pub fn run(self) -> Result<RunStats> {
        let mut guard = Teardown {
            runtime: self,
            stats: RunStats::default(),
            done: false,
        };
        guard.stats.start();
        let outcome = guard.run_loop();
        let stats = guard.finish();
        outcome.map(|()| stats)
    }
}

struct Teardown {
    runtime: Runtime,
    stats: RunStats,
    done: bool,
}

impl Teardown {
    fn run_loop(&mut self) -> Result<()> {
        let rt = &mut self.runtime;
        rt.compositor.connect()?;
        let mut last_health_log = Instant::now();

        loop {
            if rt.stop.is_stopped() {
                log::info!("stop signal received");
                break;
            }
            if rt.max_ticks.is_some_and(|max| rt.compositor.ticks() >= max) {
                log::info!("reached {} ticks", rt.compositor.ticks());
                break;
            }

            let Some(output) = rt.compositor.tick(rt.events.as_mut(), rt.clock.as_ref())? else {
                break;
            };
            if let Some(recorder) = rt.recorder.as_mut() {
                for stream in &output.streams {
                    recorder.record(&stream.stream, stream.frame_index, &stream.objects)?;
                }
            }
            rt.writer.write_frame(&output.frame)?;
            rt.stream_sink.send_data(&output.frame, &output.text)?;
            self.stats.update();

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                for pipeline in rt.compositor.pipelines() {
                    let stats = pipeline.source_stats();
                    log::info!(
                        "source health={} frames={} source={}",
                        pipeline.is_healthy(),
                        stats.frames_captured,
                        stats.source
                    );
                }
                last_health_log = Instant::now();
            }

            if rt.stream_sink.check_exit() {
                log::info!("stream sink requested exit");
                break;
            }
        }
        Ok(())
    }

    fn teardown(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.stats.stop();
        let rt = &mut self.runtime;
        if let Err(e) = rt.writer.close() {
            log::error!("writer close failed: {:#}", e);
        }
        rt.compositor.close();
        rt.stream_sink.close();
        if let Some(recorder) = rt.recorder.as_mut() {
            if let Err(e) = recorder.flush() {
                log::error!("{:#}", e);
            }
        }
        rt.events.flush();
        log::info!("elapsed time: {:.2}", self.stats.elapsed_secs());
        log::info!("approx. FPS: {:.2}", self.stats.fps());
        log::info!("Program Ending");
    }

    fn finish(mut self) -> RunStats {
        self.teardown();
        self.stats.clone()
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AggregateMode;
    use crate::detect::{Engine, Detector, SyntheticDetector};
    use crate::event::MemorySink;
    use crate::frame::Frame;
    use crate::ingest::{FrameSource, SourceStats, SyntheticSource};
    use crate::pipeline::{StreamPipeline, StreamSettings};
    use crate::track::{CentroidTracker, TrackerSettings};
    use crate::zone::ZoneList;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct Counters {
        writer_closed: Arc<AtomicUsize>,
        source_closed: Arc<AtomicUsize>,
        frames_written: Arc<AtomicUsize>,
    }

    struct CountingWriter(Counters);

    impl FrameWriter for CountingWriter {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            self.0.frames_written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            self.0.writer_closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSource {
        inner: SyntheticSource,
        fail_at: u64,
        counters: Counters,
    }

    impl FrameSource for FailingSource {
        fn connect(&mut self) -> Result<()> {
            self.inner.connect()
        }
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.inner.stats().frames_captured >= self.fail_at {
                return Err(anyhow!("camera unplugged"));
            }
            self.inner.next_frame()
        }
        fn is_healthy(&self) -> bool {
            true
        }
        fn stats(&self) -> SourceStats {
            self.inner.stats()
        }
        fn close(&mut self) {
            self.counters.source_closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NoSink;

    impl StreamSink for NoSink {
        fn send_data(&mut self, _frame: &Frame, _text: &[String]) -> Result<()> {
            Ok(())
        }
    }

    fn runtime(fail_at: u64, max_ticks: Option<u64>, counters: &Counters) -> Result<Runtime> {
        let source = FailingSource {
            inner: SyntheticSource::from_arg("stub://cam", 64, 48)?,
            fail_at,
            counters: counters.clone(),
        };
        let mut detector = SyntheticDetector::new(1);
        detector.load(Engine::Cpu)?;
        let pipeline = StreamPipeline::new(
            "cam",
            Box::new(source),
            Box::new(detector),
            Box::new(CentroidTracker::new(TrackerSettings::default())),
            ZoneList::empty(64, 48),
            StreamSettings {
                frame_size: (64, 48),
                confidence: 0.1,
                overlap_threshold: 0.5,
                labels: Vec::new(),
                throttle: Duration::from_secs(2),
                aggregates: AggregateMode::Totals,
                object_label: "person".to_string(),
            },
        );
        Ok(Runtime {
            compositor: StreamCompositor::new(vec![pipeline])?,
            writer: Box::new(CountingWriter(counters.clone())),
            stream_sink: Box::new(NoSink),
            events: Box::new(MemorySink::new()),
            recorder: None,
            clock: Arc::new(ManualClock::at_epoch_secs(0)),
            stop: StopSignal::new(),
            max_ticks,
        })
    }

    #[test]
    fn failing_source_still_tears_down_once() -> Result<()> {
        let counters = Counters::default();
        let err = runtime(3, None, &counters)?.run().unwrap_err();
        assert!(format!("{:#}", err).contains("camera unplugged"));
        assert_eq!(counters.writer_closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.source_closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.frames_written.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[test]
    fn max_ticks_bounds_the_run() -> Result<()> {
        let counters = Counters::default();
        let stats = runtime(100, Some(5), &counters)?.run()?;
        assert_eq!(stats.frames(), 5);
        assert_eq!(counters.writer_closed.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn stop_signal_ends_before_first_tick() -> Result<()> {
        let counters = Counters::default();
        let rt = runtime(100, None, &counters)?;
        rt.stop.stop();
        let stats = rt.run()?;
        assert_eq!(stats.frames(), 0);
        assert_eq!(counters.source_closed.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn fps_is_zero_without_elapsed_time() {
        assert_eq!(RunStats::default().fps(), 0.0);
    }
}
