use std::path::Path;
use std::sync::OnceLock;

use parking_lot::Mutex;
use vidanalyze_core::{EngineDescriptor, EngineRuntimeStatus, Error, ExecutionProvider, Result};

/// Process-wide inference-engine state: the descriptor currently in effect
/// and the last-known runtime status reported by a loaded session. Reads and
/// writes share one lock, matching the "one mutex guarding both" concurrency
/// rule for this component.
struct EngineState {
    current: EngineDescriptor,
    runtime_status: EngineRuntimeStatus,
}

fn reset_runtime_status() -> EngineRuntimeStatus {
    EngineRuntimeStatus {
        loaded: false,
        active_provider: ExecutionProvider::Cpu,
        fallback_engaged: false,
        load_time_ms: 0.0,
    }
}

fn state() -> &'static Mutex<EngineState> {
    static STATE: OnceLock<Mutex<EngineState>> = OnceLock::new();
    STATE.get_or_init(|| {
        Mutex::new(EngineState {
            current: EngineDescriptor::default(),
            runtime_status: reset_runtime_status(),
        })
    })
}

/// Process-wide store of the current [`EngineDescriptor`] and the last
/// [`EngineRuntimeStatus`] a model session reported, plus a `prewarm` hook
/// usable as a Pipeline's prewarm callback.
pub struct EngineManager;

impl EngineManager {
    /// Catches descriptor combinations that `ort`'s execution-provider
    /// builders would otherwise reject deep inside model load (e.g.
    /// TensorRT int8 without a calibration-capable workspace).
    pub fn validate(descriptor: &EngineDescriptor) -> Result<()> {
        if descriptor.model_path.is_empty() {
            return Err(Error::InvalidConfig("engine.model_path must not be empty".into()));
        }
        if descriptor.provider == ExecutionProvider::Tensorrt && descriptor.trt_workspace_mb == 0 {
            return Err(Error::InvalidConfig(
                "engine.trt_workspace_mb must be > 0 when provider is tensorrt".into(),
            ));
        }
        if descriptor.trt_fp16 && descriptor.trt_int8 {
            return Err(Error::InvalidConfig(
                "engine.trt_fp16 and engine.trt_int8 are mutually exclusive".into(),
            ));
        }
        Ok(())
    }

    /// Validates and installs `descriptor` as the process-wide current
    /// engine. Resets the recorded runtime status to "CPU, all flags false"
    /// until a session reports otherwise via [`EngineManager::update_runtime_status`].
    pub fn set_engine(descriptor: EngineDescriptor) -> Result<()> {
        Self::validate(&descriptor)?;
        let mut guard = state().lock();
        guard.current = descriptor;
        guard.runtime_status = reset_runtime_status();
        Ok(())
    }

    pub fn current_engine() -> EngineDescriptor {
        state().lock().current.clone()
    }

    /// Called by a loaded session once it knows which provider actually
    /// ended up active (e.g. CUDA requested but CPU fallback engaged).
    pub fn update_runtime_status(status: EngineRuntimeStatus) {
        state().lock().runtime_status = status;
    }

    pub fn current_runtime_status() -> EngineRuntimeStatus {
        state().lock().runtime_status.clone()
    }

    /// Readiness check for a Pipeline's Prewarming phase: confirms the model
    /// artifact is actually present on disk. A real dummy-inference warmup
    /// would go here too; the original system's own `EngineManager::prewarm`
    /// is itself still a stub ahead of that work.
    pub fn prewarm(model_path: &str) -> bool {
        !model_path.is_empty() && Path::new(model_path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_model_path() {
        let descriptor = EngineDescriptor {
            model_path: String::new(),
            ..Default::default()
        };
        assert!(EngineManager::validate(&descriptor).is_err());
    }

    #[test]
    fn rejects_fp16_and_int8_together() {
        let descriptor = EngineDescriptor {
            model_path: "model.onnx".into(),
            trt_fp16: true,
            trt_int8: true,
            ..Default::default()
        };
        assert!(EngineManager::validate(&descriptor).is_err());
    }

    #[test]
    fn accepts_sane_descriptor() {
        let descriptor = EngineDescriptor {
            model_path: "model.onnx".into(),
            ..Default::default()
        };
        assert!(EngineManager::validate(&descriptor).is_ok());
    }

    #[test]
    fn set_engine_resets_runtime_status_to_cpu_false() {
        EngineManager::update_runtime_status(EngineRuntimeStatus {
            loaded: true,
            active_provider: ExecutionProvider::Cuda,
            fallback_engaged: false,
            load_time_ms: 12.0,
        });
        EngineManager::set_engine(EngineDescriptor {
            model_path: "model.onnx".into(),
            ..Default::default()
        })
        .unwrap();
        let status = EngineManager::current_runtime_status();
        assert!(!status.loaded);
        assert_eq!(status.active_provider, ExecutionProvider::Cpu);
        assert!(!status.fallback_engaged);
    }

    #[test]
    fn prewarm_rejects_a_missing_file() {
        assert!(!EngineManager::prewarm("/nonexistent/path/model.onnx"));
        assert!(!EngineManager::prewarm(""));
    }
}
