//! WebRTC data-channel transport: signaling server, per-client streamer,
//! and length-prefixed framing. Implements [`vidanalyze_core::Transport`].

pub mod framing;
pub mod signaling;
pub mod streamer;

pub use streamer::{
    WebRtcTransport, DEFAULT_BIND_ADDR, DEFAULT_ICE_PORT_RANGE, DEFAULT_SIGNALING_PORT,
    DEFAULT_SOURCE_ID, DEFAULT_STREAMER_PORT,
};
