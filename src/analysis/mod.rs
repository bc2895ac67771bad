//! Offline evaluation of tracking output against MOT ground truth.

pub mod benchmark;
mod hungarian;
pub mod id_consistency;

pub use benchmark::{evaluate, BenchmarkReport, MetricFamily};
pub use id_consistency::{IdAnalyzer, IdChange, IdReport, IdSwap};
