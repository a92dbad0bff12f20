//! FFmpeg-backed packet encoder implementing `vidanalyze_core::Encoder`.

pub mod ffmpeg;

pub use ffmpeg::FfmpegEncoder;
