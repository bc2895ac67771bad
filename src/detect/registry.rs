use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Result};

use super::backend::{Detector, Engine};
use super::backends::SyntheticDetector;

type DetectorFactory = Box<dyn Fn() -> Box<dyn Detector> + Send + Sync>;

/// Hardware features relevant to engine selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// TensorRT-capable accelerator present.
    pub accelerated: bool,
}

impl DeviceCapabilities {
    /// Inspect the running host. Jetson-class boards expose
    /// `/etc/nv_tegra_release`.
    pub fn from_host() -> Self {
        let accelerated = Path::new("/etc/nv_tegra_release").exists();
        log::debug!("device capabilities: accelerated={}", accelerated);
        Self { accelerated }
    }
}

/// Pick the engine for `detector`: TensorRT on accelerated devices, then DNN,
/// then CPU.
pub fn select_engine(detector: &dyn Detector, caps: DeviceCapabilities) -> Result<Engine> {
    if caps.accelerated && detector.supports(Engine::TensorRt) {
        return Ok(Engine::TensorRt);
    }
    [Engine::Dnn, Engine::Cpu]
        .into_iter()
        .find(|engine| detector.supports(*engine))
        .ok_or_else(|| anyhow!("Model {} not supported on this device", detector.name()))
}

/// Named detector models.
pub struct DetectorRegistry {
    factories: HashMap<String, DetectorFactory>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in models.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SyntheticDetector::MODEL_ID, || {
            Box::new(SyntheticDetector::default())
        });
        registry
    }

    pub fn register<F>(&mut self, model_id: &str, factory: F)
    where
        F: Fn() -> Box<dyn Detector> + Send + Sync + 'static,
    {
        self.factories.insert(model_id.to_string(), Box::new(factory));
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate the last model of `model_ids` and load it onto the best
    /// engine the device supports.
    pub fn load(&self, model_ids: &[String], caps: DeviceCapabilities) -> Result<Box<dyn Detector>> {
        let model_id = model_ids
            .last()
            .ok_or_else(|| anyhow!("No models in model ID list"))?;
        let factory = self.factories.get(model_id).ok_or_else(|| {
            anyhow!(
                "unknown model '{}', registered models: [{}]",
                model_id,
                self.list().join(", ")
            )
        })?;
        let mut detector = factory();
        let engine = select_engine(detector.as_ref(), caps)?;
        detector.load(engine)?;
        log::info!("Engine: {}", engine);
        log::info!("Model: {}", detector.name());
        Ok(detector)
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionResult;
    use crate::frame::Frame;

    struct GpuOnly {
        engine: Option<Engine>,
    }

    impl Detector for GpuOnly {
        fn name(&self) -> &str {
            "gpu-only"
        }
        fn supports(&self, engine: Engine) -> bool {
            engine == Engine::TensorRt
        }
        fn load(&mut self, engine: Engine) -> Result<()> {
            self.engine = Some(engine);
            Ok(())
        }
        fn engine(&self) -> Option<Engine> {
            self.engine
        }
        fn labels(&self) -> &[String] {
            &[]
        }
        fn detect(&mut self, _frame: &Frame, _c: f32, _o: f32) -> Result<DetectionResult> {
            Ok(DetectionResult::default())
        }
    }

    #[test]
    fn empty_model_list_is_fatal() {
        let registry = DetectorRegistry::with_builtin();
        let err = registry.load(&[], DeviceCapabilities::default()).err().unwrap();
        assert!(err.to_string().contains("No models in model ID list"));
    }

    #[test]
    fn last_model_is_selected() -> Result<()> {
        let mut registry = DetectorRegistry::with_builtin();
        registry.register("gpu-only", || Box::new(GpuOnly { engine: None }));
        let models = vec!["gpu-only".to_string(), SyntheticDetector::MODEL_ID.to_string()];
        let detector = registry.load(&models, DeviceCapabilities::default())?;
        assert_eq!(detector.name(), SyntheticDetector::MODEL_ID);
        assert_eq!(detector.engine(), Some(Engine::Dnn));
        Ok(())
    }

    #[test]
    fn unsupported_engine_is_a_capability_error() {
        let mut registry = DetectorRegistry::new();
        registry.register("gpu-only", || Box::new(GpuOnly { engine: None }));
        let models = vec!["gpu-only".to_string()];
        let err = registry
            .load(&models, DeviceCapabilities { accelerated: false })
            .err().unwrap();
        assert!(err.to_string().contains("gpu-only not supported"));

        let detector = registry
            .load(&models, DeviceCapabilities { accelerated: true })
            .unwrap();
        assert_eq!(detector.engine(), Some(Engine::TensorRt));
    }

    #[test]
    fn unknown_model_names_registered_models() {
        let registry = DetectorRegistry::with_builtin();
        let err = registry
            .load(&["yolo".to_string()], DeviceCapabilities::default())
            .err().unwrap();
        assert!(err.to_string().contains(SyntheticDetector::MODEL_ID));
    }
}
