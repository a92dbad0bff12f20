use std::sync::atomic::{AtomicU64, Ordering};

/// EMA blend weight applied to each new per-frame FPS/latency sample,
/// matching the smoothing used for the equivalent aggregate stats
/// elsewhere in this codebase.
const EMA_WEIGHT: f32 = 0.1;

/// Lock-free running metrics for one Pipeline, read by `list_pipelines()`
/// and logged periodically by the worker without ever blocking it.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    processed_frames: AtomicU64,
    dropped_frames: AtomicU64,
    fps_bits: AtomicU64,
    avg_latency_ms_bits: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, frame_interval_secs: f32, latency_ms: f32) {
        self.processed_frames.fetch_add(1, Ordering::Relaxed);

        let instantaneous_fps = if frame_interval_secs > 0.0 {
            1.0 / frame_interval_secs
        } else {
            0.0
        };
        self.blend_f32(&self.fps_bits, instantaneous_fps);
        self.blend_f32(&self.avg_latency_ms_bits, latency_ms);
    }

    pub fn record_drop(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed_frames.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f32 {
        self.load_f32(&self.fps_bits)
    }

    pub fn avg_latency_ms(&self) -> f32 {
        self.load_f32(&self.avg_latency_ms_bits)
    }

    fn blend_f32(&self, cell: &AtomicU64, sample: f32) {
        let current = self.load_f32(cell);
        let blended = if current == 0.0 {
            sample
        } else {
            current * (1.0 - EMA_WEIGHT) + sample * EMA_WEIGHT
        };
        cell.store(blended.to_bits() as u64, Ordering::Relaxed);
    }

    fn load_f32(&self, cell: &AtomicU64) -> f32 {
        f32::from_bits(cell.load(Ordering::Relaxed) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_frame_increments_count_and_blends_fps() {
        let metrics = PipelineMetrics::new();
        metrics.record_frame(1.0 / 30.0, 10.0);
        assert_eq!(metrics.processed_frames(), 1);
        assert!((metrics.fps() - 30.0).abs() < 0.5);
    }

    #[test]
    fn dropped_frames_count_independently() {
        let metrics = PipelineMetrics::new();
        metrics.record_drop();
        metrics.record_drop();
        assert_eq!(metrics.dropped_frames(), 2);
        assert_eq!(metrics.processed_frames(), 0);
    }
}
