mod annotations;
mod synthetic;

pub use annotations::AnnotationDetector;
pub use synthetic::SyntheticDetector;
