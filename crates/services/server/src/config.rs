//! TOML configuration loading for the `vidanalyze-server` binary. Out of
//! the core per the spec's collaborator boundary; the binary consumes only
//! the typed bundles `vidanalyze-core` already defines.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use vidanalyze_core::{EncoderConfig, EngineDescriptor, FilterConfig, PipelineConfig, SourceConfig, TransportConfig};
use vidanalyze_webrtc::{DEFAULT_BIND_ADDR, DEFAULT_ICE_PORT_RANGE, DEFAULT_SIGNALING_PORT};

/// One configured track to subscribe at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    pub stream_id: String,
    pub profile_id: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    pub encoder: EncoderConfig,
    pub transport: TransportConfig,
    /// Overrides the top-level engine descriptor for this track only.
    #[serde(default)]
    pub engine: Option<EngineDescriptor>,
}

/// Top-level configuration file shape.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_signaling_port")]
    pub signaling_port: u16,
    #[serde(default = "default_ice_port_range")]
    pub ice_port_range: (u16, u16),
    pub engine: EngineDescriptor,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_signaling_port() -> u16 {
    DEFAULT_SIGNALING_PORT
}

fn default_ice_port_range() -> (u16, u16) {
    DEFAULT_ICE_PORT_RANGE
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Resolves each configured subscription into a full [`PipelineConfig`],
    /// falling back to the top-level engine descriptor when a subscription
    /// doesn't name its own.
    pub fn into_pipeline_configs(self) -> Vec<PipelineConfig> {
        let default_engine = self.engine;
        self.subscriptions
            .into_iter()
            .map(|sub| PipelineConfig {
                stream_id: sub.stream_id,
                profile_id: sub.profile_id,
                source: sub.source,
                filter: sub.filter,
                encoder: sub.encoder,
                transport: sub.transport,
                engine: sub.engine.unwrap_or_else(|| default_engine.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let toml_text = r#"
            [engine]
            family = "yolo"
            model_path = "models/yolov8n.onnx"
            provider = "cpu"

            [[subscriptions]]
            stream_id = "cam1"
            profile_id = "p720"

            [subscriptions.source]
            uri = "rtsp://example.invalid/stream"

            [subscriptions.encoder]
            codec = "h264"
            width = 1280
            height = 720
            fps = 30
            bitrate_kbps = 2000

            [subscriptions.transport]
            endpoint_template = "ws://localhost:8083/${stream}"
        "#;

        let config: ServerConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.subscriptions.len(), 1);

        let pipelines = config.into_pipeline_configs();
        assert_eq!(pipelines[0].track_key(), "cam1:p720");
        assert_eq!(pipelines[0].engine.family, "yolo");
    }
}
