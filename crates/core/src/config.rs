use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::contracts::TransportStats;
use crate::engine::EngineDescriptor;

/// Where a Pipeline's Source reads frames from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub uri: String,
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_reconnect() -> bool {
    true
}

fn default_read_timeout_ms() -> u64 {
    5000
}

/// Tunable parameters for the Analyzer's inference task, hot-swappable
/// without restarting the owning Pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub task: String,
    pub model_family: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
    #[serde(default)]
    pub classes: Vec<u32>,
    #[serde(default)]
    pub draw_overlay: bool,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_nms_threshold() -> f32 {
    0.45
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            task: "detect".into(),
            model_family: "yolo".into(),
            confidence_threshold: default_confidence_threshold(),
            nms_threshold: default_nms_threshold(),
            classes: Vec::new(),
            draw_overlay: true,
            params: HashMap::new(),
        }
    }
}

/// Codec/output parameters for a Pipeline's Encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
    #[serde(default = "default_gop")]
    pub gop: u32,
    #[serde(default)]
    pub b_frames: u32,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub tune: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub zero_latency: bool,
}

fn default_gop() -> u32 {
    60
}

fn default_preset() -> String {
    "veryfast".into()
}

/// Where a Pipeline's encoded output is delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub endpoint_template: String,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl TransportConfig {
    /// Substitutes `${stream}` (and any key present in `extra`) into the
    /// endpoint template. A literal, non-regex replacement, matching the
    /// templating described for signaling endpoints.
    pub fn resolve_endpoint(&self, stream_id: &str) -> String {
        let mut resolved = self.endpoint_template.replace("${stream}", stream_id);
        for (key, value) in &self.extra {
            resolved = resolved.replace(&format!("${{{key}}}"), value);
        }
        resolved
    }
}

/// Full configuration bundle for one Pipeline: identity plus the four
/// collaborator configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stream_id: String,
    pub profile_id: String,
    pub source: SourceConfig,
    pub filter: FilterConfig,
    pub encoder: EncoderConfig,
    pub transport: TransportConfig,
    pub engine: EngineDescriptor,
}

impl PipelineConfig {
    /// Canonical track key, `"<stream>:<profile>"`.
    pub fn track_key(&self) -> String {
        format!("{}:{}", self.stream_id, self.profile_id)
    }
}

/// Snapshot of a running Pipeline as reported by the Track Manager's
/// `list_pipelines()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEntry {
    pub key: String,
    pub stream_id: String,
    pub profile_id: String,
    pub source_uri: String,
    pub model_id: String,
    pub task: String,
    pub state: String,
    pub track_id: String,
    pub processed_frames: u64,
    pub dropped_frames: u64,
    pub fps: f32,
    pub avg_latency_ms: f32,
    pub last_active_ms: u64,
    pub subscriber_count: usize,
    pub transport_stats: TransportStats,
    pub encoder_cfg: EncoderConfig,
}

/// A connected WebRTC client, as tracked by the Streamer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConnection {
    pub client_id: String,
    pub track_key: String,
    pub connected_at_us: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_key_joins_stream_and_profile() {
        let cfg = PipelineConfig {
            stream_id: "camera_01".into(),
            profile_id: "default".into(),
            source: SourceConfig {
                uri: "rtsp://x".into(),
                reconnect: true,
                read_timeout_ms: 5000,
            },
            filter: FilterConfig::default(),
            encoder: EncoderConfig {
                codec: "h264".into(),
                width: 1280,
                height: 720,
                fps: 30,
                bitrate_kbps: 2000,
                gop: 60,
                b_frames: 0,
                preset: "veryfast".into(),
                tune: None,
                profile: None,
                zero_latency: true,
            },
            transport: TransportConfig {
                endpoint_template: "ws://localhost:8083/${stream}".into(),
                extra: HashMap::new(),
            },
            engine: EngineDescriptor::default(),
        };
        assert_eq!(cfg.track_key(), "camera_01:default");
    }

    #[test]
    fn resolve_endpoint_substitutes_stream() {
        let cfg = TransportConfig {
            endpoint_template: "ws://localhost:8083/${stream}".into(),
            extra: HashMap::new(),
        };
        assert_eq!(
            cfg.resolve_endpoint("camera_01"),
            "ws://localhost:8083/camera_01"
        );
    }
}
