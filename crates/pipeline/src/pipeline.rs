use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vidanalyze_analyzer::Analyzer;
use vidanalyze_core::{
    Encoder, Error, FilterConfig, PipelineConfig, PipelineEntry, Result, Source, SourceConfig,
    TransportHandle, TransportStats,
};

use crate::metrics::PipelineMetrics;
use crate::state::{PipelineState, StateCell};

/// How often (in processed frames) the worker logs an aggregate summary.
const LOG_INTERVAL_FRAMES: u64 = 30;

/// Minimum backoff between a failed Prewarming attempt and the next retry.
const PREWARM_BACKOFF_MS: u64 = 200;

enum WorkerCommand {
    SwitchSource(SourceConfig),
    Stop,
}

/// Source and Encoder moved into the worker thread on `start()`. Held here
/// between `spawn()` and `start()` so a Pipeline can be constructed (and its
/// Encoder opened, per the Builder's contract) before anything actually
/// runs.
struct WorkerResources {
    source: Box<dyn Source>,
    encoder: Box<dyn Encoder>,
}

/// One Source -> Analyzer -> Encoder -> Transport graph, running on its own
/// OS thread once started. Owned exclusively by the Track Manager under its
/// track key.
pub struct Pipeline {
    config: Mutex<PipelineConfig>,
    state: Arc<StateCell>,
    metrics: Arc<PipelineMetrics>,
    analyzer: Arc<Analyzer>,
    transport: Arc<dyn TransportHandle>,
    resources: Mutex<Option<WorkerResources>>,
    cmd_tx: Mutex<Option<Sender<WorkerCommand>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    subscriber_count: AtomicUsize,
    last_active_epoch_ms: Arc<AtomicU64>,
}

pub(crate) fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Pipeline {
    /// Assembles a Pipeline in the `Idle` state. Does not open the Source or
    /// spawn the worker thread -- that happens on `start()`, called by the
    /// Track Manager after a successful `subscribe`.
    pub(crate) fn spawn(
        config: PipelineConfig,
        source: Box<dyn Source>,
        analyzer: Arc<Analyzer>,
        encoder: Box<dyn Encoder>,
        transport: Arc<dyn TransportHandle>,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            config: Mutex::new(config),
            state: Arc::new(StateCell::new(PipelineState::Idle)),
            metrics: Arc::new(PipelineMetrics::new()),
            analyzer,
            transport,
            resources: Mutex::new(Some(WorkerResources { source, encoder })),
            cmd_tx: Mutex::new(None),
            handle: Mutex::new(None),
            subscriber_count: AtomicUsize::new(1),
            last_active_epoch_ms: Arc::new(AtomicU64::new(now_epoch_ms())),
        }))
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn track_key(&self) -> String {
        self.config.lock().track_key()
    }

    pub fn stream_id(&self) -> String {
        self.config.lock().stream_id.clone()
    }

    /// Idempotent: `Idle` -> `Prewarming`, then spawns the worker thread,
    /// which retries `prewarm` (and opening the Source) with a backoff of
    /// at least [`PREWARM_BACKOFF_MS`] until both succeed, then transitions
    /// to `Running`. Fails with `Error::AlreadyRunning` if not currently
    /// `Idle`.
    pub fn start(self: &Arc<Self>, prewarm: impl Fn() -> bool + Send + 'static) -> Result<()> {
        let track_key = self.track_key();
        if self.state.get() != PipelineState::Idle {
            return Err(Error::AlreadyRunning(track_key));
        }
        let resources = self
            .resources
            .lock()
            .take()
            .ok_or_else(|| Error::Other(format!("pipeline '{track_key}' has already been started once")))?;

        self.state.set(PipelineState::Prewarming);

        let (cmd_tx, cmd_rx) = mpsc::channel();
        *self.cmd_tx.lock() = Some(cmd_tx);

        let worker_state = Arc::clone(&self.state);
        let worker_metrics = Arc::clone(&self.metrics);
        let worker_analyzer = Arc::clone(&self.analyzer);
        let worker_transport = Arc::clone(&self.transport);
        let worker_last_active = Arc::clone(&self.last_active_epoch_ms);
        let source_config = self.config.lock().source.clone();

        let handle = std::thread::Builder::new()
            .name(format!("pipeline-{track_key}"))
            .spawn(move || {
                run_worker(
                    track_key,
                    resources.source,
                    source_config,
                    worker_analyzer,
                    resources.encoder,
                    worker_transport,
                    worker_state,
                    worker_metrics,
                    worker_last_active,
                    cmd_rx,
                    prewarm,
                )
            })
            .map_err(|e| Error::Other(format!("failed to spawn worker thread: {e}")))?;

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    pub fn increment_subscribers(&self) -> usize {
        self.subscriber_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn decrement_subscribers(&self) -> usize {
        self.subscriber_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0)
            .saturating_sub(1)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }

    /// Epoch ms of the last processed frame, or of construction if none has
    /// processed yet. Basis for the Track Manager's `reap_idle`.
    pub fn last_active_ms(&self) -> u64 {
        self.last_active_epoch_ms.load(Ordering::SeqCst)
    }

    /// Replaces the Source's URI/config in place without restarting the
    /// worker thread; the worker picks up the new config on its next loop
    /// iteration.
    pub fn switch_source(&self, source: SourceConfig) -> Result<()> {
        self.config.lock().source = source.clone();
        let guard = self.cmd_tx.lock();
        match guard.as_ref() {
            Some(tx) => tx
                .send(WorkerCommand::SwitchSource(source))
                .map_err(|_| Error::Other("pipeline worker is gone".into())),
            None => Ok(()),
        }
    }

    /// Hot-swaps the Analyzer's model/engine, reloading the session before
    /// recording the switch. The recorded `engine` config is left unchanged
    /// if the reload fails, so a failed switch never claims a model it
    /// isn't actually running.
    pub fn switch_model(&self, engine: vidanalyze_core::EngineDescriptor) -> Result<()> {
        self.analyzer.set_engine(engine.clone())?;
        crate::engine_manager::EngineManager::update_runtime_status(self.analyzer.runtime_status());
        self.config.lock().engine = engine;
        Ok(())
    }

    /// Hot-swaps the Analyzer's task tag without touching the loaded model
    /// or the tunable filter params.
    pub fn switch_task(&self, task: String) -> Result<()> {
        let mut filter = self.config.lock().filter.clone();
        filter.task = task;
        self.analyzer.set_filter(filter.clone());
        self.config.lock().filter = filter;
        Ok(())
    }

    /// Hot-swaps the Analyzer's filter params (task, thresholds, classes,
    /// overlay) without touching the model session.
    pub fn set_params(&self, filter: FilterConfig) -> Result<()> {
        self.config.lock().filter = filter.clone();
        self.analyzer.set_filter(filter);
        Ok(())
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    pub fn entry(&self) -> PipelineEntry {
        let config = self.config.lock();
        PipelineEntry {
            key: config.track_key(),
            stream_id: config.stream_id.clone(),
            profile_id: config.profile_id.clone(),
            source_uri: config.source.uri.clone(),
            model_id: config.engine.model_path.clone(),
            task: config.filter.task.clone(),
            state: self.state().to_string(),
            track_id: config.track_key(),
            processed_frames: self.metrics.processed_frames(),
            dropped_frames: self.metrics.dropped_frames(),
            fps: self.metrics.fps(),
            avg_latency_ms: self.metrics.avg_latency_ms(),
            last_active_ms: self.last_active_ms(),
            subscriber_count: self.subscriber_count(),
            transport_stats: self.transport.stats(),
            encoder_cfg: config.encoder.clone(),
        }
    }

    /// Stops the worker thread and joins it. Idempotent; safe from any
    /// state, including mid-Prewarming retry loop.
    pub fn stop(&self) {
        if self.state.get() == PipelineState::Idle {
            return;
        }
        self.state.set(PipelineState::Stopping);
        if let Some(tx) = self.cmd_tx.lock().as_ref() {
            let _ = tx.send(WorkerCommand::Stop);
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        self.state.set(PipelineState::Idle);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    track_key: String,
    mut source: Box<dyn Source>,
    mut source_config: SourceConfig,
    analyzer: Arc<Analyzer>,
    mut encoder: Box<dyn Encoder>,
    transport: Arc<dyn TransportHandle>,
    state: Arc<StateCell>,
    metrics: Arc<PipelineMetrics>,
    last_active: Arc<AtomicU64>,
    cmd_rx: Receiver<WorkerCommand>,
    prewarm: impl Fn() -> bool,
) {
    loop {
        if let Ok(WorkerCommand::Stop) = cmd_rx.try_recv() {
            info!(track_key = %track_key, "pipeline stopped during prewarm");
            return;
        }
        if !prewarm() {
            warn!(track_key = %track_key, "prewarm callback failed, retrying after backoff");
            std::thread::sleep(Duration::from_millis(PREWARM_BACKOFF_MS));
            continue;
        }
        match source.open(&source_config) {
            Ok(()) => break,
            Err(err) => {
                warn!(track_key = %track_key, error = %err, "pipeline failed to open source during prewarm, retrying");
                std::thread::sleep(Duration::from_millis(PREWARM_BACKOFF_MS));
                continue;
            }
        }
    }

    state.set(PipelineState::Running);
    info!(track_key = %track_key, "pipeline running");

    let mut last_frame_at = Instant::now();

    loop {
        while let Ok(command) = cmd_rx.try_recv() {
            match command {
                WorkerCommand::Stop => {
                    let _ = source.close();
                    let _ = encoder.close();
                    transport.disconnect();
                    info!(track_key = %track_key, "pipeline stopped");
                    return;
                }
                WorkerCommand::SwitchSource(new_config) => {
                    let _ = source.close();
                    if let Err(err) = source.open(&new_config) {
                        warn!(track_key = %track_key, error = %err, "failed to switch source");
                    } else {
                        source_config = new_config;
                        info!(track_key = %track_key, uri = %source_config.uri, "switched source");
                    }
                }
            }
        }

        if state.get() == PipelineState::Stopping {
            let _ = source.close();
            let _ = encoder.close();
            transport.disconnect();
            return;
        }

        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(track_key = %track_key, error = %err, "source read failed, dropping cycle");
                metrics.record_drop();
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        let frame_interval = last_frame_at.elapsed().as_secs_f32();
        last_frame_at = Instant::now();

        let (rendered, result) = match analyzer.analyze(frame) {
            Ok(out) => out,
            Err(err) => {
                warn!(track_key = %track_key, error = %err, "analysis failed, dropping frame");
                metrics.record_drop();
                continue;
            }
        };

        let packet = match encoder.encode(&rendered) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(track_key = %track_key, error = %err, "encode failed, dropping frame");
                metrics.record_drop();
                continue;
            }
        };

        if !packet.is_empty() {
            if let Err(err) = transport.send(&packet, rendered.pts_us) {
                debug!(track_key = %track_key, error = %err, "transport send failed");
                metrics.record_drop();
            }
        }

        metrics.record_frame(frame_interval, result.inference_time_ms);
        last_active.store(now_epoch_ms(), Ordering::SeqCst);

        if metrics.processed_frames() % LOG_INTERVAL_FRAMES == 0 {
            info!(
                track_key = %track_key,
                processed = metrics.processed_frames(),
                dropped = metrics.dropped_frames(),
                fps = metrics.fps(),
                avg_latency_ms = metrics.avg_latency_ms(),
                "pipeline metrics"
            );
        }
    }
}
