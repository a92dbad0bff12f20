//! FFmpeg-backed pull-based frame source used by the Pipeline Engine.

pub mod ffmpeg;

pub use ffmpeg::{FfmpegSource, MAX_CONSECUTIVE_READ_FAILURES, READ_FAILURE_BACKOFF};
