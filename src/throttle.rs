//! Wall-clock throttling of aggregate metrics.
//!
//! Aggregates (object totals, per-zone occupancy) are computed at most once
//! per window regardless of frame rate. The publish time is captured after the
//! emission work, so the spacing between emissions can exceed the window by
//! the cost of that work.

use std::time::{Duration, SystemTime};

use crate::clock::Clock;
use crate::config::AggregateMode;
use crate::event::{
    Event, EventHeader, EventSink, LABEL_ACTIVE_OBJECTS, LABEL_TOTAL_DETECTED, LABEL_ZONE_OCCUPANCY,
};
use crate::track::{ObjectId, TrackedObjects};
use crate::zone::ZoneList;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

/// Opens at most once per `window`.
#[derive(Clone, Debug)]
pub struct Throttle {
    window: Duration,
    last_publish: Option<SystemTime>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_publish: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_publish(&self) -> Option<SystemTime> {
        self.last_publish
    }

    /// True when nothing was published yet or `window` has elapsed since.
    /// A clock that moved backwards keeps the gate closed.
    pub fn is_open(&self, now: SystemTime) -> bool {
        match self.last_publish {
            None => true,
            Some(last) => now
                .duration_since(last)
                .map(|elapsed| elapsed >= self.window)
                .unwrap_or(false),
        }
    }

    /// Run `work` when the gate is open, then stamp the publish time from
    /// `clock`. Returns whether `work` ran.
    pub fn run_if_open<F: FnOnce()>(&mut self, clock: &dyn Clock, work: F) -> bool {
        if !self.is_open(clock.now()) {
            return false;
        }
        work();
        self.last_publish = Some(clock.now());
        true
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// "Total detected" is the highest active identifier, not a count of distinct
/// objects. With ids 3 and 7 active it is 7. No active objects gives 0.
pub fn total_detected(objects: &TrackedObjects) -> ObjectId {
    objects.keys().next_back().copied().unwrap_or(0)
}

/// Emits the configured aggregate events behind a `Throttle`.
pub struct AggregateEmitter {
    throttle: Throttle,
    mode: AggregateMode,
    object_label: String,
}

impl AggregateEmitter {
    pub fn new(window: Duration, mode: AggregateMode, object_label: &str) -> Self {
        Self {
            throttle: Throttle::new(window),
            mode,
            object_label: object_label.to_string(),
        }
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Publish aggregates if the window has elapsed. Returns whether it did.
    pub fn emit_if_due(
        &mut self,
        objects: &TrackedObjects,
        zones: &ZoneList,
        sink: &mut dyn EventSink,
        clock: &dyn Clock,
    ) -> bool {
        let mode = self.mode;
        let object_label = self.object_label.as_str();
        self.throttle.run_if_open(clock, || {
            let now = clock.now();
            if mode.includes_totals() {
                let total = total_detected(objects);
                let header = EventHeader::new(LABEL_TOTAL_DETECTED, now, object_label);
                sink.publish(&Event::value(header, total as f64));
                let header = EventHeader::new(LABEL_ACTIVE_OBJECTS, now, object_label);
                sink.publish(&Event::value(header, objects.len() as f64));
            }
            if mode.includes_occupancy() {
                for (zone, count) in zones.occupancy(objects.values()) {
                    let header = EventHeader::new(LABEL_ZONE_OCCUPANCY, now, object_label).with_zone(&zone);
                    sink.publish(&Event::value(header, count as f64));
                }
            }
            log::debug!("aggregates published for {} active objects", objects.len());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::detect::BoundingBox;
    use crate::event::MemorySink;
    use crate::track::TrackedObject;
    use crate::zone::Zone;

    fn object(id: ObjectId, cx: f32) -> TrackedObject {
        TrackedObject {
            id,
            bbox: BoundingBox::centered(cx, 240.0, 20.0, 40.0),
            label: "person".to_string(),
            class_index: 0,
            confidence: 0.9,
        }
    }

    #[test]
    fn two_second_window_opens_at_start_and_after_window() {
        let clock = ManualClock::at_epoch_secs(1_000);
        let mut throttle = Throttle::new(DEFAULT_WINDOW);
        let mut fired_at = Vec::new();
        let mut elapsed_ms = 0u64;
        for tick_ms in [0u64, 500, 1000, 1500, 2100] {
            clock.advance(Duration::from_millis(tick_ms - elapsed_ms));
            elapsed_ms = tick_ms;
            if throttle.run_if_open(&clock, || {}) {
                fired_at.push(tick_ms);
            }
        }
        assert_eq!(fired_at, vec![0, 2100]);
    }

    #[test]
    fn publish_time_is_taken_after_work() {
        let clock = ManualClock::at_epoch_secs(1_000);
        let mut throttle = Throttle::new(DEFAULT_WINDOW);
        throttle.run_if_open(&clock, || clock.advance(Duration::from_millis(300)));
        assert_eq!(
            throttle.last_publish(),
            Some(std::time::UNIX_EPOCH + Duration::from_millis(1_000_300))
        );
        clock.advance(Duration::from_millis(1_800));
        assert!(!throttle.is_open(clock.now()));
    }

    #[test]
    fn total_detected_is_max_identifier_not_count() {
        let objects: TrackedObjects = [(3, object(3, 10.0)), (7, object(7, 20.0))]
            .into_iter()
            .collect();
        assert_eq!(total_detected(&objects), 7);
        assert_eq!(total_detected(&TrackedObjects::new()), 0);
    }

    #[test]
    fn emitter_publishes_selected_aggregates_once_per_window() {
        let clock = ManualClock::at_epoch_secs(1_000);
        let zones = ZoneList::new(
            vec![
                Zone::rect("A", 0.0, 0.0, 320.0, 480.0, [0, 255, 0]).unwrap(),
                Zone::rect("B", 320.0, 0.0, 640.0, 480.0, [0, 0, 255]).unwrap(),
            ],
            640,
            480,
        )
        .unwrap();
        let objects: TrackedObjects = [(3, object(3, 100.0)), (7, object(7, 200.0))]
            .into_iter()
            .collect();
        let mut sink = MemorySink::new();
        let mut emitter = AggregateEmitter::new(DEFAULT_WINDOW, AggregateMode::Both, "person");

        assert!(emitter.emit_if_due(&objects, &zones, &mut sink, &clock));
        clock.advance(Duration::from_millis(500));
        assert!(!emitter.emit_if_due(&objects, &zones, &mut sink, &clock));

        let total: Vec<&Event> = sink.with_label(LABEL_TOTAL_DETECTED).collect();
        assert_eq!(total.len(), 1);
        assert_eq!(total[0].value_of(), Some(7.0));
        let active: Vec<&Event> = sink.with_label(LABEL_ACTIVE_OBJECTS).collect();
        assert_eq!(active[0].value_of(), Some(2.0));
        let occupancy: Vec<(String, f64)> = sink
            .with_label(LABEL_ZONE_OCCUPANCY)
            .map(|e| {
                (
                    e.header().zone_label.clone().unwrap_or_default(),
                    e.value_of().unwrap_or(-1.0),
                )
            })
            .collect();
        assert_eq!(
            occupancy,
            vec![("A".to_string(), 2.0), ("B".to_string(), 0.0)]
        );
    }

    #[test]
    fn occupancy_only_mode_skips_totals() {
        let clock = ManualClock::at_epoch_secs(1_000);
        let zones = ZoneList::empty(640, 480);
        let mut sink = MemorySink::new();
        let mut emitter = AggregateEmitter::new(DEFAULT_WINDOW, AggregateMode::Occupancy, "person");
        emitter.emit_if_due(&TrackedObjects::new(), &zones, &mut sink, &clock);
        assert_eq!(sink.with_label(LABEL_TOTAL_DETECTED).count(), 0);
    }
}
