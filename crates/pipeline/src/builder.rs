use std::sync::Arc;

use vidanalyze_analyzer::Analyzer;
use vidanalyze_core::{Encoder, Error, PipelineConfig, Result, Transport};
use vidanalyze_encoder::FfmpegEncoder;
use vidanalyze_source::FfmpegSource;

use crate::engine_manager::EngineManager;
use crate::pipeline::Pipeline;

/// Constructs a [`Pipeline`] from a [`PipelineConfig`], in the fixed order
/// Source -> Analyzer -> Encoder -> Transport, surfacing the name of
/// whichever stage fails to build as `Error::BuilderFactoryFailed`. The
/// Encoder is opened here, synchronously: a bad encoder config is a build
/// error, not something discovered later on the worker thread.
pub struct PipelineBuilder<'a> {
    transport: &'a dyn Transport,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    pub fn build(&self, config: PipelineConfig) -> Result<Arc<Pipeline>> {
        EngineManager::set_engine(config.engine.clone())?;

        let source = Box::new(FfmpegSource::new());

        let analyzer = Analyzer::new(config.engine.clone(), config.filter.clone())
            .map_err(|_| Error::BuilderFactoryFailed("analyzer".into()))?;
        EngineManager::update_runtime_status(analyzer.runtime_status());

        let mut encoder = Box::new(FfmpegEncoder::new());
        encoder.open(&config.encoder)?;

        let track_key = config.track_key();
        let transport_handle = self
            .transport
            .connect(&track_key, &config.transport)
            .map_err(|_| Error::BuilderFactoryFailed("transport".into()))?;

        Pipeline::spawn(config, source, Arc::new(analyzer), encoder, Arc::from(transport_handle))
    }
}
