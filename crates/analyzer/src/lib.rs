//! Hot-swappable per-track analysis stage: preprocess -> run model ->
//! postprocess -> render.

pub mod analyzer;
pub mod renderer;

pub use analyzer::Analyzer;
pub use renderer::{BoxOverlayRenderer, PassthroughRenderer};
