//! Collaborator contracts implemented by the `source`, `inference`,
//! `analyzer`, `encoder`, and `webrtc` crates.
//!
//! Every trait here is synchronous and `Send`, never `async`: a Pipeline's
//! Source -> Analyzer -> Encoder -> Transport chain runs end to end inside
//! one blocking OS thread per spec's concurrency model ("parallel OS
//! threads, not cooperative tasks"). Crates that are inherently async (the
//! WebRTC peer connection/data channel machinery) bridge across this
//! boundary with a bounded channel rather than making the contract itself
//! async — see `Transport::connect`'s returned handle.

use serde::{Deserialize, Serialize};

use crate::config::{EncoderConfig, FilterConfig, SourceConfig, TransportConfig};
use crate::detection::AnalysisResult;
use crate::engine::{EngineDescriptor, EngineRuntimeStatus};
use crate::error::Result;
use crate::frame::{Frame, LetterboxMeta, TensorView};

/// Connection lifecycle reported by a [`Source`], named after the states a
/// Pipeline worker cycles a source through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Pull-based frame producer. One instance is owned exclusively by a single
/// Pipeline worker thread; `read_frame` is expected to block until a frame
/// is available, a configured read timeout elapses, or the source is
/// closed.
pub trait Source: Send {
    fn open(&mut self, config: &SourceConfig) -> Result<()>;
    fn read_frame(&mut self) -> Result<Frame>;
    fn status(&self) -> SourceStatus;
    fn close(&mut self) -> Result<()>;
}

/// Constructs a boxed [`Source`] for a URI scheme, mirroring the
/// plugin-factory shape used for ingestion elsewhere in the corpus.
pub trait SourceFactory: Send + Sync {
    fn schemes(&self) -> &'static [&'static str];
    fn create(&self) -> Box<dyn Source>;
}

/// Converts a decoded [`Frame`] into the flat tensor layout a
/// [`ModelSession`] expects, recording the letterbox placement so detections
/// can be mapped back to frame pixel coordinates.
///
/// `Sync` because an Analyzer snapshot is shared via `Arc` across a swap
/// boundary: the worker thread may still be reading it via one `Arc` clone
/// while the control plane builds the next snapshot.
pub trait Preprocessor: Send + Sync {
    fn prepare(&self, frame: &Frame) -> Result<(Vec<f32>, LetterboxMeta)>;
    fn input_shape(&self) -> &[usize];
}

/// A loaded model able to run one forward pass. Implementations own the
/// underlying runtime session (e.g. an `ort::Session`).
pub trait ModelSession: Send + Sync {
    fn run(&self, input: TensorView<'_>) -> Result<Vec<f32>>;
    fn descriptor(&self) -> &EngineDescriptor;
    /// Which execution provider actually ended up loaded, and how long it
    /// took, as last observed at load time.
    fn runtime_status(&self) -> EngineRuntimeStatus;
}

/// Converts a model's raw output tensor into structured results, applying
/// confidence filtering and non-max suppression per [`FilterConfig`].
pub trait Postprocessor: Send + Sync {
    fn process(
        &self,
        raw_output: &[f32],
        meta: &LetterboxMeta,
        filter: &FilterConfig,
    ) -> Result<AnalysisResult>;
}

/// Draws analysis results onto a frame (or passes it through unmodified).
pub trait Renderer: Send + Sync {
    fn render(&self, frame: Frame, result: &AnalysisResult) -> Frame;
}

/// Compresses annotated frames into a wire-ready packet stream.
pub trait Encoder: Send {
    fn open(&mut self, config: &EncoderConfig) -> Result<()>;
    fn encode(&mut self, frame: &Frame) -> Result<Vec<u8>>;
    fn reconfigure(&mut self, config: &EncoderConfig) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Aggregate delivery statistics for one track's transport handle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TransportStats {
    /// Whether any client is currently connected and receiving this track.
    pub connected: bool,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
}

/// A non-blocking sink for one track's encoded packet stream. `send` enqueues
/// into a bounded, drop-oldest queue drained by the transport's own
/// (typically async) delivery loop; it never blocks the calling worker
/// thread.
pub trait TransportHandle: Send + Sync {
    fn send(&self, packet: &[u8], pts_us: i64) -> Result<()>;
    fn stats(&self) -> TransportStats;
    fn disconnect(&self);
}

/// Factory for [`TransportHandle`]s, implemented by the WebRTC streamer.
pub trait Transport: Send + Sync {
    fn connect(&self, track_key: &str, config: &TransportConfig) -> Result<Box<dyn TransportHandle>>;
}
