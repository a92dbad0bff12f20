use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use vidanalyze_core::{
    AnalysisResult, EngineDescriptor, EngineRuntimeStatus, FilterConfig, Frame, ModelSession,
    Postprocessor, Preprocessor, Renderer, Result, TensorView,
};
use vidanalyze_inference::{load_session, resolve_family, YoloPostprocessor};

use crate::renderer::{BoxOverlayRenderer, PassthroughRenderer};

/// The model-dependent half of an [`Analyzer`]: swapped only when the
/// engine descriptor (model family/weights/provider) changes.
struct ModelBundle {
    preprocessor: Arc<dyn Preprocessor>,
    session: Arc<dyn ModelSession>,
    postprocessor: Arc<dyn Postprocessor>,
}

/// The tunable half of an [`Analyzer`]: swapped whenever `FilterConfig`
/// changes (confidence/NMS thresholds, class allowlist, overlay toggle)
/// without touching the loaded model.
struct FilterState {
    filter: FilterConfig,
    renderer: Arc<dyn Renderer>,
}

/// Per-track analysis stage: preprocess -> run model -> postprocess ->
/// render. Owned by exactly one Pipeline worker; `set_filter`/`set_engine`
/// may be called concurrently from the Track Manager's control plane while
/// the worker is mid-frame. Each half is cloned out from under a short read
/// lock before use, so a swap never blocks (or is blocked by) a frame in
/// flight, matching the snapshot-behind-a-lock pattern used for hot-swap
/// elsewhere in this runtime.
pub struct Analyzer {
    model: RwLock<Arc<ModelBundle>>,
    filter_state: RwLock<Arc<FilterState>>,
}

impl Analyzer {
    pub fn new(engine: EngineDescriptor, filter: FilterConfig) -> Result<Self> {
        let model = build_model_bundle(engine)?;
        let filter_state = build_filter_state(filter);
        Ok(Self {
            model: RwLock::new(Arc::new(model)),
            filter_state: RwLock::new(Arc::new(filter_state)),
        })
    }

    /// Runs one frame through the current model and filter state.
    pub fn analyze(&self, frame: Frame) -> Result<(Frame, AnalysisResult)> {
        let model = self.model.read().clone();
        let filter_state = self.filter_state.read().clone();

        let start = Instant::now();
        let (tensor, meta) = model.preprocessor.prepare(&frame)?;
        let raw_output = model
            .session
            .run(TensorView::new(&tensor, model.preprocessor.input_shape()))?;
        let mut result = model
            .postprocessor
            .process(&raw_output, &meta, &filter_state.filter)?;
        result.inference_time_ms = start.elapsed().as_secs_f32() * 1000.0;

        let rendered = if filter_state.filter.draw_overlay {
            filter_state.renderer.render(frame, &result)
        } else {
            frame
        };

        Ok((rendered, result))
    }

    /// Hot-swaps the tunable filter params without rebuilding the model
    /// session.
    pub fn set_filter(&self, filter: FilterConfig) {
        *self.filter_state.write() = Arc::new(build_filter_state(filter));
    }

    /// Hot-swaps the model itself, reloading the session before acquiring
    /// the write lock so the old model keeps serving in-flight frames right
    /// up until the pointer swap.
    pub fn set_engine(&self, engine: EngineDescriptor) -> Result<()> {
        let next = build_model_bundle(engine)?;
        *self.model.write() = Arc::new(next);
        Ok(())
    }

    pub fn current_filter(&self) -> FilterConfig {
        self.filter_state.read().filter.clone()
    }

    /// Runtime status of the currently loaded model session, as reported by
    /// the session at load time.
    pub fn runtime_status(&self) -> EngineRuntimeStatus {
        self.model.read().session.runtime_status()
    }
}

fn build_model_bundle(engine: EngineDescriptor) -> Result<ModelBundle> {
    let family = resolve_family(&engine.family)?;
    let session = load_session(engine)?;
    Ok(ModelBundle {
        preprocessor: Arc::from(family.preprocessor),
        postprocessor: Arc::new(YoloPostprocessor {
            num_classes: family.num_classes,
            num_boxes: family.num_boxes,
            class_names: family.class_names,
        }),
        session: Arc::from(session),
    })
}

fn build_filter_state(filter: FilterConfig) -> FilterState {
    let renderer: Arc<dyn Renderer> = if filter.draw_overlay {
        Arc::new(BoxOverlayRenderer::default())
    } else {
        Arc::new(PassthroughRenderer)
    };
    FilterState { filter, renderer }
}
