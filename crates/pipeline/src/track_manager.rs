use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};
use vidanalyze_core::{
    EngineDescriptor, Error, FilterConfig, PipelineConfig, PipelineEntry, Result, SourceConfig,
    Transport,
};

use crate::builder::PipelineBuilder;
use crate::engine_manager::EngineManager;
use crate::pipeline::Pipeline;

/// Keyed multiplexer over every running [`Pipeline`], keyed by
/// `"<stream_id>:<profile_id>"`. The entry map's mutex is held only while
/// mutating the map itself -- never across pipeline construction or a call
/// into a pipeline -- so one slow subscribe can't stall unrelated tracks.
pub struct TrackManager {
    entries: Mutex<HashMap<String, Arc<Pipeline>>>,
}

impl Default for TrackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackManager {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to the track named by `config`. Idempotent: if the track
    /// already exists, its subscriber count is incremented and its key is
    /// returned without building anything new. Pipeline construction (which
    /// can block briefly loading a model) happens outside the map lock; if
    /// a concurrent subscribe raced ahead and inserted the same key first,
    /// the pipeline built by this call is stopped and discarded before
    /// returning the winner's key.
    pub fn subscribe(&self, transport: &dyn Transport, config: PipelineConfig) -> Result<String> {
        let key = config.track_key();

        if let Some(existing) = self.entries.lock().get(&key) {
            existing.increment_subscribers();
            return Ok(key);
        }

        let model_path = config.engine.model_path.clone();
        let built = PipelineBuilder::new(transport).build(config)?;
        built.start(move || EngineManager::prewarm(&model_path))?;

        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(existing) => {
                existing.increment_subscribers();
                drop(entries);
                built.stop();
                debug!(key = %key, "discarded race-created duplicate pipeline");
                Ok(key)
            }
            None => {
                entries.insert(key.clone(), built);
                info!(key = %key, "subscribed new pipeline");
                Ok(key)
            }
        }
    }

    /// Decrements the subscriber count for `key`. Does not stop the
    /// pipeline immediately -- `reap_idle` stops pipelines that have had no
    /// subscribers for longer than its grace period, so a client that
    /// reconnects moments later doesn't pay full pipeline startup cost
    /// again.
    pub fn unsubscribe(&self, key: &str) -> Result<()> {
        if let Some(pipeline) = self.entries.lock().get(key) {
            pipeline.decrement_subscribers();
        }
        Ok(())
    }

    pub fn switch_source(&self, key: &str, source: SourceConfig) -> Result<()> {
        self.get(key)?.switch_source(source)
    }

    pub fn switch_model(&self, key: &str, engine: EngineDescriptor) -> Result<()> {
        self.get(key)?.switch_model(engine)
    }

    pub fn switch_task(&self, key: &str, task: String) -> Result<()> {
        self.get(key)?.switch_task(task)
    }

    pub fn set_params(&self, key: &str, filter: FilterConfig) -> Result<()> {
        self.get(key)?.set_params(filter)
    }

    pub fn list_pipelines(&self) -> Vec<PipelineEntry> {
        self.entries.lock().values().map(|p| p.entry()).collect()
    }

    /// Stops and removes every pipeline whose last processed frame (or
    /// subscribe time, if none has processed yet) is older than
    /// `idle_timeout`. Based on frame-processing staleness, not subscriber
    /// count, so a still-subscribed but stalled track is still reaped.
    pub fn reap_idle(&self, idle_timeout: Duration) {
        let now = crate::pipeline::now_epoch_ms();
        let idle_ms = idle_timeout.as_millis() as u64;
        let mut entries = self.entries.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter_map(|(key, pipeline)| {
                let age_ms = now.saturating_sub(pipeline.last_active_ms());
                (age_ms >= idle_ms).then(|| key.clone())
            })
            .collect();

        for key in stale {
            if let Some(pipeline) = entries.remove(&key) {
                drop(entries);
                pipeline.stop();
                info!(key = %key, "reaped idle pipeline");
                entries = self.entries.lock();
            }
        }
    }

    /// Stops every running pipeline, used during process shutdown.
    pub fn shutdown_all(&self) {
        let drained: Vec<Arc<Pipeline>> = self.entries.lock().drain().map(|(_, p)| p).collect();
        for pipeline in drained {
            pipeline.stop();
        }
    }

    fn get(&self, key: &str) -> Result<Arc<Pipeline>> {
        self.entries
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::UnknownTrack(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsubscribe_unknown_track_is_a_no_op() {
        let manager = TrackManager::new();
        assert!(manager.unsubscribe("missing:track").is_ok());
    }

    #[test]
    fn list_pipelines_starts_empty() {
        let manager = TrackManager::new();
        assert!(manager.list_pipelines().is_empty());
    }
}
