//! Object detection seam, engine selection and the built-in detectors.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{Detector, Engine};
pub use backends::{AnnotationDetector, SyntheticDetector};
pub use registry::{select_engine, DetectorRegistry, DeviceCapabilities};
pub use result::{filter_by_label, non_max_suppression, BoundingBox, DetectionResult, Prediction};
