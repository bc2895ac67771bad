use anyhow::Result;
use std::fmt;

use crate::frame::Frame;

use super::result::DetectionResult;

/// Execution engines a detector model can be loaded onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Engine {
    TensorRt,
    Dnn,
    Cpu,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::TensorRt => "TENSOR_RT",
            Engine::Dnn => "DNN",
            Engine::Cpu => "CPU",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object detector seam.
///
/// A detector is created unloaded, loaded once onto a supported engine, and
/// then called once per frame.
pub trait Detector: Send {
    /// Model identifier.
    fn name(&self) -> &str;

    /// Returns true when the model can run on `engine`.
    fn supports(&self, engine: Engine) -> bool;

    fn load(&mut self, engine: Engine) -> Result<()>;

    /// Engine the model was loaded onto, if any.
    fn engine(&self) -> Option<Engine>;

    /// Class labels indexed by class index.
    fn labels(&self) -> &[String];

    /// Predictions at or above `confidence`, after non-maximum suppression at
    /// `overlap`.
    fn detect(&mut self, frame: &Frame, confidence: f32, overlap: f32) -> Result<DetectionResult>;
}
