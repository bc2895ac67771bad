use crate::clock::Clock;
use crate::event::{
    Event, EventHeader, EventSink, LABEL_DWELL, LABEL_ENTRY, LABEL_EXIT, LABEL_ZONE_ENTRY, NO_ZONE,
};
use crate::track::{ObjectId, TrackedObject, TrackedObjects};
use crate::zone::{ZoneList, ZoneTransition};

use super::LifecycleStore;

/// Receives identifier lifecycle notifications from a tracker.
///
/// Both calls happen synchronously inside `Tracker::update` and must not
/// block beyond best-effort event publication.
pub trait LifecycleListener {
    fn on_enter(&mut self, id: ObjectId, object: &TrackedObject);
    fn on_exit(&mut self, id: ObjectId, object: &TrackedObject);
}

/// Ignores every notification.
#[derive(Default)]
pub struct NoopListener;

impl LifecycleListener for NoopListener {
    fn on_enter(&mut self, _id: ObjectId, _object: &TrackedObject) {}
    fn on_exit(&mut self, _id: ObjectId, _object: &TrackedObject) {}
}

/// Logs notifications at debug level.
#[derive(Default)]
pub struct LoggingListener;

impl LifecycleListener for LoggingListener {
    fn on_enter(&mut self, _id: ObjectId, object: &TrackedObject) {
        log::debug!("tracker enter: {}", object.display_label());
    }

    fn on_exit(&mut self, _id: ObjectId, object: &TrackedObject) {
        log::debug!("tracker exit: {}", object.display_label());
    }
}

/// Forwards each notification to every inner listener in order.
#[derive(Default)]
pub struct FanoutListener<'a> {
    listeners: Vec<&'a mut dyn LifecycleListener>,
}

impl<'a> FanoutListener<'a> {
    pub fn new(listeners: Vec<&'a mut dyn LifecycleListener>) -> Self {
        Self { listeners }
    }
}

impl LifecycleListener for FanoutListener<'_> {
    fn on_enter(&mut self, id: ObjectId, object: &TrackedObject) {
        for listener in &mut self.listeners {
            listener.on_enter(id, object);
        }
    }

    fn on_exit(&mut self, id: ObjectId, object: &TrackedObject) {
        for listener in &mut self.listeners {
            listener.on_exit(id, object);
        }
    }
}

/// Maintains the lifecycle store and publishes entry, exit, dwell and zone
/// events for one stream.
///
/// The listener is the only writer of the store. It borrows its context (zones,
/// store, sink, clock) for the duration of a tick.
pub struct EventLifecycleListener<'a> {
    zones: &'a ZoneList,
    store: &'a mut LifecycleStore,
    sink: &'a mut dyn EventSink,
    clock: &'a dyn Clock,
}

impl<'a> EventLifecycleListener<'a> {
    pub fn new(
        zones: &'a ZoneList,
        store: &'a mut LifecycleStore,
        sink: &'a mut dyn EventSink,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            zones,
            store,
            sink,
            clock,
        }
    }

    /// Record a zone change and publish a `zone_entry` occurrence for it.
    pub fn record_transition(&mut self, transition: &ZoneTransition, object: &TrackedObject) {
        let Some(entry) = self.store.get_mut(transition.id) else {
            log::warn!(
                "zone transition for unknown object {}; skipping",
                transition.id
            );
            return;
        };
        entry.last_zone = Some(transition.zone.clone());
        log::debug!("{} moved to zone {}", object.display_label(), transition.zone);
        let header = EventHeader::new(LABEL_ZONE_ENTRY, self.clock.now(), &object.label)
            .with_object(transition.id)
            .with_zone(&transition.zone);
        self.sink.publish(&Event::occurrence(header));
    }

    /// Apply every transition whose object is still active.
    pub fn apply_transitions(&mut self, transitions: &[ZoneTransition], objects: &TrackedObjects) {
        for transition in transitions {
            if let Some(object) = objects.get(&transition.id) {
                self.record_transition(transition, object);
            }
        }
    }
}

impl LifecycleListener for EventLifecycleListener<'_> {
    fn on_enter(&mut self, id: ObjectId, object: &TrackedObject) {
        let now = self.clock.now();
        if self.store.create(id, now).is_some() {
            log::warn!(
                "object {} entered while already active; lifecycle entry replaced",
                id
            );
        }

        let zone = self.zones.canonical_zone(object).map(|z| z.name().to_string());
        let entry_header = EventHeader::new(LABEL_ZONE_ENTRY, now, &object.label)
            .with_object(id)
            .with_zone(zone.as_deref().unwrap_or(NO_ZONE));
        self.sink.publish(&Event::occurrence(entry_header));

        let start = Event::start_timed(EventHeader::new(LABEL_ENTRY, now, &object.label).with_object(id));
        self.sink.publish(&start);

        if let Some(entry) = self.store.get_mut(id) {
            entry.event_id = start.correlation_id().cloned();
            entry.last_zone = zone;
        }
        log::info!("{} enters", object.display_label());
    }

    fn on_exit(&mut self, id: ObjectId, object: &TrackedObject) {
        let Some(entry) = self.store.remove(id) else {
            log::warn!(
                "exit for unknown object {} ({}); skipping dwell computation",
                id,
                object.label
            );
            return;
        };
        let now = self.clock.now();
        let dwell = match now.duration_since(entry.created_at) {
            Ok(elapsed) => elapsed.as_secs_f64(),
            Err(_) => {
                log::warn!("clock moved backwards while object {} was active", id);
                0.0
            }
        };

        let mut dwell_header = EventHeader::new(LABEL_DWELL, now, &object.label).with_object(id);
        dwell_header.zone_label = entry.last_zone.clone();
        self.sink.publish(&Event::value(dwell_header, dwell));

        match entry.event_id {
            Some(event_id) => {
                let header = EventHeader::new(LABEL_EXIT, now, &object.label).with_object(id);
                self.sink.publish(&Event::end_timed(header, event_id));
            }
            None => log::warn!("object {} has no open entry event; exit event skipped", id),
        }
        log::info!("{} exits after {:.1}s", object.display_label(), dwell);
    }
}
