//! ONNX Runtime-backed object detection: the concrete `ModelSession` plus
//! the preprocessor/postprocessor pair the Analyzer composes around it.

pub mod device;
pub mod postprocess;
pub mod preprocess;
pub mod registry;
pub mod session;

pub use postprocess::YoloPostprocessor;
pub use preprocess::LetterboxPreprocessor;
pub use registry::{load_session, resolve_family, ModelFamily};
pub use session::OrtModelSession;
