use tracing::{info, warn};
use vidanalyze_core::ExecutionProvider;

/// Resolves the execution provider actually used for a session, applying the
/// same CUDA -> (TensorRT) -> CPU fallback idiom used elsewhere in this
/// codebase for device selection, generalized to `ort`'s provider builders
/// instead of a Candle `Device`.
pub fn select_provider(requested: ExecutionProvider, allow_cpu_fallback: bool) -> ExecutionProvider {
    match requested {
        ExecutionProvider::Cpu => ExecutionProvider::Cpu,
        ExecutionProvider::Cuda => {
            if cuda_available() {
                info!("selected CUDA execution provider");
                ExecutionProvider::Cuda
            } else if allow_cpu_fallback {
                warn!("CUDA requested but unavailable, falling back to CPU");
                ExecutionProvider::Cpu
            } else {
                warn!("CUDA requested but unavailable and fallback disabled");
                ExecutionProvider::Cuda
            }
        }
        ExecutionProvider::Tensorrt => {
            if cuda_available() {
                info!("selected TensorRT execution provider");
                ExecutionProvider::Tensorrt
            } else if allow_cpu_fallback {
                warn!("TensorRT requested but unavailable, falling back to CPU");
                ExecutionProvider::Cpu
            } else {
                warn!("TensorRT requested but unavailable and fallback disabled");
                ExecutionProvider::Tensorrt
            }
        }
    }
}

#[cfg(feature = "cuda-detect")]
fn cuda_available() -> bool {
    std::env::var("ORT_CUDA_UNAVAILABLE").is_err()
}

#[cfg(not(feature = "cuda-detect"))]
fn cuda_available() -> bool {
    // No reliable way to probe CUDA availability without linking the
    // provider; treat as unavailable unless explicitly overridden, so
    // `allow_cpu_fallback` degrades gracefully on CPU-only hosts by default.
    std::env::var("VIDANALYZE_FORCE_CUDA").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_always_selects_cpu() {
        assert_eq!(select_provider(ExecutionProvider::Cpu, false), ExecutionProvider::Cpu);
    }

    #[test]
    fn cuda_without_hardware_falls_back_when_allowed() {
        std::env::remove_var("VIDANALYZE_FORCE_CUDA");
        assert_eq!(select_provider(ExecutionProvider::Cuda, true), ExecutionProvider::Cpu);
    }

    #[test]
    fn cuda_without_fallback_stays_requested() {
        std::env::remove_var("VIDANALYZE_FORCE_CUDA");
        assert_eq!(select_provider(ExecutionProvider::Cuda, false), ExecutionProvider::Cuda);
    }
}
