use serde::{Deserialize, Serialize};

/// Execution provider requested for a model session, in descending
/// preference order when `allow_cpu_fallback` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
    Tensorrt,
}

/// Declarative description of how a model should be loaded and executed.
/// Maps directly onto the `ort` crate's execution-provider builders: `cpu`
/// becomes `CPUExecutionProvider`, `cuda` becomes `CUDAExecutionProvider`,
/// `tensorrt` becomes `TensorRTExecutionProvider` configured from the
/// `trt_*` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDescriptor {
    pub family: String,
    pub model_path: String,
    pub provider: ExecutionProvider,
    #[serde(default)]
    pub allow_cpu_fallback: bool,
    #[serde(default)]
    pub use_io_binding: bool,
    #[serde(default)]
    pub prefer_pinned_memory: bool,
    #[serde(default)]
    pub trt_fp16: bool,
    #[serde(default)]
    pub trt_int8: bool,
    #[serde(default = "default_trt_workspace_mb")]
    pub trt_workspace_mb: u32,
    pub io_binding_input_bytes: Option<usize>,
    pub io_binding_output_bytes: Option<usize>,
}

fn default_trt_workspace_mb() -> u32 {
    1024
}

impl Default for EngineDescriptor {
    fn default() -> Self {
        Self {
            family: "yolo".into(),
            model_path: String::new(),
            provider: ExecutionProvider::Cpu,
            allow_cpu_fallback: true,
            use_io_binding: false,
            prefer_pinned_memory: false,
            trt_fp16: false,
            trt_int8: false,
            trt_workspace_mb: default_trt_workspace_mb(),
            io_binding_input_bytes: None,
            io_binding_output_bytes: None,
        }
    }
}

/// Observed state of a loaded model session, reported by the Engine Manager
/// so operators can tell whether a requested provider was actually honored
/// (e.g. TensorRT requested but CPU fallback engaged).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRuntimeStatus {
    pub loaded: bool,
    pub active_provider: ExecutionProvider,
    pub fallback_engaged: bool,
    pub load_time_ms: f32,
}
