use thiserror::Error;

/// Unified error type shared by every VidAnalyze crate.
///
/// Mirrors the shape of the error kinds named in the component design: each
/// collaborator (source, inference, encoder, transport) gets its own
/// variant(s) so callers can match on failure origin without downcasting.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source failed to open '{uri}': {reason}")]
    SourceOpenFailed { uri: String, reason: String },

    #[error("source read failed: {0}")]
    SourceReadFailed(String),

    #[error("inference engine failed to load model '{model}': {reason}")]
    InferenceLoadFailed { model: String, reason: String },

    #[error("inference run failed: {0}")]
    InferenceRunFailed(String),

    #[error("encoder failed to open: {0}")]
    EncoderOpenFailed(String),

    #[error("encoder failed to encode frame: {0}")]
    EncoderEncodeFailed(String),

    #[error("transport failed to connect to '{endpoint}': {reason}")]
    TransportConnectFailed { endpoint: String, reason: String },

    #[error("transport failed to send: {0}")]
    TransportSendFailed(String),

    #[error("unknown track '{0}'")]
    UnknownTrack(String),

    #[error("pipeline '{0}' is already running")]
    AlreadyRunning(String),

    #[error("builder factory '{0}' failed")]
    BuilderFactoryFailed(String),

    #[error("malformed signaling message: {0}")]
    MalformedSignalingMessage(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_track_formats_the_key() {
        let err = Error::UnknownTrack("camera_01:default".into());
        assert_eq!(err.to_string(), "unknown track 'camera_01:default'");
    }

    #[test]
    fn already_running_formats_the_key() {
        let err = Error::AlreadyRunning("camera_01:default".into());
        assert_eq!(err.to_string(), "pipeline 'camera_01:default' is already running");
    }

    #[test]
    fn anyhow_errors_convert_to_other() {
        let anyhow_err = anyhow::anyhow!("boom");
        let err: Error = anyhow_err.into();
        assert!(matches!(err, Error::Other(ref s) if s == "boom"));
    }
}
