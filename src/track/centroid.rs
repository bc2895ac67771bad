use std::collections::BTreeMap;

use super::{ObjectId, TrackedObject, TrackedObjects, Tracker};
use crate::detect::Prediction;
use crate::lifecycle::LifecycleListener;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerSettings {
    /// Largest centroid distance (pixels) at which a prediction can continue a track.
    pub max_distance: f32,
    /// Consecutive unmatched frames after which a track is dropped.
    pub deregister_frames: u32,
    /// Consecutive matched frames before a track is reported.
    pub min_inertia: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_distance: 50.0,
            deregister_frames: 20,
            min_inertia: 5,
        }
    }
}

#[derive(Debug)]
struct Track {
    object: TrackedObject,
    hits: u32,
    missed: u32,
    reported: bool,
}

/// Greedy nearest-centroid tracker.
///
/// Identifiers are assigned from 0 in order of first sighting. A track is
/// only reported (and `on_enter` fired) once it has been matched
/// `min_inertia` frames in a row; `on_exit` fires only for reported tracks.
pub struct CentroidTracker {
    settings: TrackerSettings,
    next_id: ObjectId,
    tracks: BTreeMap<ObjectId, Track>,
}

impl CentroidTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            next_id: 0,
            tracks: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    fn required_hits(&self) -> u32 {
        self.settings.min_inertia.max(1)
    }

    /// (track id, prediction index) pairs, closest first, each side used once.
    fn associate(&self, predictions: &[Prediction]) -> Vec<(ObjectId, usize)> {
        let mut pairs: Vec<(f32, ObjectId, usize)> = Vec::new();
        for (id, track) in &self.tracks {
            for (idx, prediction) in predictions.iter().enumerate() {
                let distance = track.object.bbox.center_distance(&prediction.bbox);
                if distance <= self.settings.max_distance {
                    pairs.push((distance, *id, idx));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut used_tracks = Vec::new();
        let mut used_predictions = vec![false; predictions.len()];
        let mut matches = Vec::new();
        for (_, id, idx) in pairs {
            if used_predictions[idx] || used_tracks.contains(&id) {
                continue;
            }
            used_predictions[idx] = true;
            used_tracks.push(id);
            matches.push((id, idx));
        }
        matches
    }
}

impl Tracker for CentroidTracker {
    fn update(
        &mut self,
        predictions: &[Prediction],
        listener: &mut dyn LifecycleListener,
    ) -> TrackedObjects {
        let required_hits = self.required_hits();
        let matches = self.associate(predictions);
        let mut matched_predictions = vec![false; predictions.len()];

        for track in self.tracks.values_mut() {
            track.missed += 1;
        }

        for (id, idx) in matches {
            matched_predictions[idx] = true;
            let Some(track) = self.tracks.get_mut(&id) else {
                continue;
            };
            track.object = TrackedObject::from_prediction(id, &predictions[idx]);
            track.missed = 0;
            track.hits = track.hits.saturating_add(1);
            if !track.reported && track.hits >= required_hits {
                track.reported = true;
                listener.on_enter(id, &track.object);
            }
        }

        // Unconfirmed candidates must be matched on consecutive frames.
        let dropped: Vec<ObjectId> = self
            .tracks
            .iter()
            .filter(|(_, t)| {
                t.missed > 0 && (!t.reported || t.missed > self.settings.deregister_frames)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in dropped {
            if let Some(track) = self.tracks.remove(&id) {
                if track.reported {
                    listener.on_exit(id, &track.object);
                }
            }
        }

        for (idx, prediction) in predictions.iter().enumerate() {
            if matched_predictions[idx] {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            let object = TrackedObject::from_prediction(id, prediction);
            let reported = required_hits <= 1;
            if reported {
                listener.on_enter(id, &object);
            }
            self.tracks.insert(
                id,
                Track {
                    object,
                    hits: 1,
                    missed: 0,
                    reported,
                },
            );
        }

        self.tracks
            .iter()
            .filter(|(_, t)| t.reported)
            .map(|(id, t)| (*id, t.object.clone()))
            .collect()
    }

    fn active_count(&self) -> usize {
        self.tracks.values().filter(|t| t.reported).count()
    }
}
