//! Tracked objects and the tracker seam.
//!
//! The tracker owns object identity. It reports identifiers appearing and
//! disappearing through a `LifecycleListener` during `update`, and returns the
//! currently active objects. The engine only reads these values.

mod centroid;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::detect::{BoundingBox, Prediction};
use crate::lifecycle::LifecycleListener;

pub use centroid::{CentroidTracker, TrackerSettings};

/// Identifier unique among the active objects of one stream.
pub type ObjectId = u64;

/// Active objects keyed by identifier, in ascending id order.
pub type TrackedObjects = BTreeMap<ObjectId, TrackedObject>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: ObjectId,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
}

impl TrackedObject {
    pub fn from_prediction(id: ObjectId, prediction: &Prediction) -> Self {
        Self {
            id,
            bbox: prediction.bbox,
            label: prediction.label.clone(),
            class_index: prediction.class_index,
            confidence: prediction.confidence,
        }
    }

    /// Display label, e.g. `"3: person"`.
    pub fn display_label(&self) -> String {
        format!("{}: {}", self.id, self.label)
    }
}

pub trait Tracker: Send {
    /// Associate `predictions` with existing objects.
    ///
    /// Calls `listener.on_enter` for each identifier that becomes active and
    /// `listener.on_exit` for each identifier that is dropped, synchronously,
    /// before returning the active set.
    fn update(
        &mut self,
        predictions: &[Prediction],
        listener: &mut dyn LifecycleListener,
    ) -> TrackedObjects;

    /// Number of identifiers currently reported as active.
    fn active_count(&self) -> usize;
}
