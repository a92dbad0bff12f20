//! Shared data model and collaborator contracts for VidAnalyze.
//!
//! This crate has no I/O of its own: it defines the `Frame`/`Detection`/
//! `EngineDescriptor` data model, the configuration bundles that flow from
//! the Pipeline Builder down into each collaborator, and the traits that
//! `vidanalyze-source`, `vidanalyze-inference`, `vidanalyze-analyzer`,
//! `vidanalyze-encoder`, and `vidanalyze-webrtc` implement.

pub mod config;
pub mod contracts;
pub mod detection;
pub mod engine;
pub mod error;
pub mod frame;

pub use config::{
    ClientConnection, EncoderConfig, FilterConfig, PipelineConfig, PipelineEntry, SourceConfig,
    TransportConfig,
};
pub use contracts::{
    Encoder, ModelSession, Postprocessor, Preprocessor, Renderer, Source, SourceFactory,
    SourceStatus, Transport, TransportHandle, TransportStats,
};
pub use detection::{
    non_max_suppression, AnalysisResult, BoundingBox, Detection, Keypoint, Pose, Segmentation,
};
pub use engine::{EngineDescriptor, EngineRuntimeStatus, ExecutionProvider};
pub use error::{Error, Result};
pub use frame::{Frame, LetterboxMeta, PixelFormat, TensorView};
