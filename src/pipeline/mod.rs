//! Frame pipeline
//!
//! `FramePipeline` runs every stage on the calling thread, one frame at a
//! time (stills, tests, offline use). `Session` runs the same stages on
//! dedicated threads for a live camera stream.
//!
//! Per-frame failures never escape a frame: they are reported in
//! `ProcessedFrame::status`, and the frame is passed through unchanged
//! whenever there is still an image to show.

pub mod diagnostics;
pub mod session;
mod stages;

use std::sync::Arc;

use crate::color::{ColorCache, ColorSpec, ColorTransform};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{DepthHint, Frame, FrameBufferPool};
use crate::quality::{QualityController, QualityTier};
use crate::segmentation::{HairSegmenter, SegmentationModel};
use crate::settings::{Look, ProcessingSettings};
use crate::telemetry::StageTimings;
use crate::tracking::{FaceDetector, FaceTracker};

pub use diagnostics::{ChannelSink, DiagnosticsSink, FrameDiagnostics, LogSink};
pub use session::{CancellationToken, CapturedFrame, FrameSource, Session};

use stages::{Renderer, Work};

/// Hint for the user when the effect cannot be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guidance {
    /// No face in view on this frame
    NoFace,
    /// Face missing for several frames in a row
    FaceLost { consecutive_misses: u32 },
}

impl Guidance {
    /// Short message suitable for an on-screen prompt
    pub fn message(&self) -> &'static str {
        match self {
            Guidance::NoFace => "Center your face in the frame",
            Guidance::FaceLost { .. } => "Face not found. Try better lighting or move closer",
        }
    }
}

/// Result of processing one frame
#[derive(Debug)]
pub struct ProcessedFrame {
    /// Output image; `None` when the input frame was invalid
    pub output: Option<Frame>,
    /// Sequence number of the input frame
    pub sequence: u64,
    pub timings: StageTimings,
    pub status: Result<()>,
    /// The output is the unmodified input frame
    pub passthrough: bool,
    pub guidance: Option<Guidance>,
    /// Tier the frame was processed at
    pub tier: QualityTier,
    /// Detector confidence on this frame, when tracking ran
    pub face_confidence: Option<f32>,
}

impl ProcessedFrame {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.status.as_ref().err()
    }
}

/// Single-threaded pipeline
pub struct FramePipeline {
    tracker: FaceTracker,
    segmenter: HairSegmenter,
    renderer: Renderer,
    quality: QualityController,
    look: Arc<Look>,
    next_ticket: u64,
    cache: Option<Arc<ColorCache>>,
}

impl FramePipeline {
    pub fn new(
        config: &PipelineConfig,
        pool: FrameBufferPool,
        detector: Box<dyn FaceDetector>,
        model: Box<dyn SegmentationModel>,
    ) -> Self {
        let cache = (config.cache.capacity > 0).then(|| Arc::new(ColorCache::new(config.cache.capacity)));
        Self {
            tracker: FaceTracker::new(detector, config.tracker.clone()),
            segmenter: HairSegmenter::new(model, config.segmentation.clone()),
            renderer: Renderer::new(pool, ColorTransform::new(cache.clone()), config),
            quality: QualityController::new(config.quality.clone(), config.frame_budget()),
            look: Arc::new(Look::default()),
            next_ticket: 0,
            cache,
        }
    }

    /// Select a color; applies from the next processed frame
    pub fn apply_color(&mut self, color: ColorSpec, settings: ProcessingSettings) {
        self.look = Arc::new(Look::new(color, settings));
    }

    /// Stop recoloring; frames pass through
    pub fn clear_color(&mut self) {
        self.look = Arc::new(Look::default());
    }

    pub fn look(&self) -> &Look {
        &self.look
    }

    pub fn quality_tier(&self) -> QualityTier {
        self.quality.tier()
    }

    pub fn cache(&self) -> Option<&Arc<ColorCache>> {
        self.cache.as_ref()
    }

    /// Run every stage on `frame`
    pub fn process(&mut self, frame: Frame, depth: Option<DepthHint>) -> ProcessedFrame {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let plan = self.quality.plan(self.look.settings.quality);

        let mut work = Work::new(frame, depth, ticket, self.look.clone(), plan);
        work.track(&mut self.tracker);
        work.segment(&mut self.segmenter);
        let processed = self.renderer.render(work);

        self.quality.observe(processed.timings.end_to_end);
        processed
    }

    /// Drop temporal state (held face, previous mask, latency history)
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.segmenter.reset();
        self.quality.reset();
        self.next_ticket = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::color::palette;
    use crate::color::ColorCategory;
    use crate::compositor::BlendMode;
    use crate::segmentation::tests::{ConstantModel, FailingModel};
    use crate::segmentation::SegmentationInput;
    use crate::tracking::tests::{FixedDetector, ScriptedDetector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Brown-haired test frame: every pixel is natural brown
    pub(crate) fn brown_frame(pool: &FrameBufferPool, width: u32, height: u32, sequence: u64) -> Frame {
        let mut data = pool.acquire((width * height * 4) as usize).unwrap();
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&[101, 67, 33, 255]);
        }
        Frame::new(data, width, height, crate::frame::PixelFormat::Rgba8, sequence)
    }

    fn pipeline(detector: impl FaceDetector + 'static, model: impl SegmentationModel + 'static) -> (FramePipeline, FrameBufferPool) {
        let config = PipelineConfig::default();
        let pool = FrameBufferPool::for_resolution(32, 32, 8);
        let pipeline = FramePipeline::new(&config, pool.clone(), Box::new(detector), Box::new(model));
        (pipeline, pool)
    }

    fn fashion_red() -> ColorSpec {
        let brown = palette::preset("natural-brown").unwrap();
        brown.retarget("fashion-red", ColorCategory::Fashion, 0.0).unwrap()
    }

    struct CountingModel(Arc<AtomicUsize>);

    impl SegmentationModel for CountingModel {
        fn infer(&mut self, input: &SegmentationInput<'_>) -> Result<Vec<f32>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0; (input.width * input.height) as usize])
        }
    }

    #[test]
    fn test_no_look_passes_through() {
        let (mut pipeline, pool) = pipeline(FixedDetector(0.9), ConstantModel(1.0));
        let frame = brown_frame(&pool, 8, 8, 0);
        let input = frame.data.to_vec();

        let processed = pipeline.process(frame, None);
        assert!(processed.is_ok());
        assert!(processed.passthrough);
        assert_eq!(processed.guidance, None);
        assert_eq!(&processed.output.unwrap().data[..], &input[..]);
    }

    #[test]
    fn test_brown_to_fashion_red() {
        let (mut pipeline, pool) = pipeline(FixedDetector(0.9), ConstantModel(1.0));
        pipeline.apply_color(fashion_red(), ProcessingSettings::new(BlendMode::Normal));

        let processed = pipeline.process(brown_frame(&pool, 32, 32, 0), None);
        assert!(processed.is_ok());
        assert!(!processed.passthrough);
        assert_eq!(processed.face_confidence, Some(0.9));

        let output = processed.output.unwrap();
        // Centre of the face region is fully hair
        let idx = ((16 * 32 + 16) * 4) as usize;
        let px = &output.data[idx..idx + 4];
        assert!(px[0] > px[1] && px[0] > px[2], "expected red, got {:?}", px);
        assert!(px[0] as i32 - px[1] as i32 > 40);
        assert_eq!(px[3], 255);
        assert!(processed.timings.composite.is_some());
    }

    #[test]
    fn test_three_misses_fail_with_passthrough() {
        let (mut pipeline, pool) = pipeline(ScriptedDetector::new(&[None, None, None]), ConstantModel(1.0));
        pipeline.apply_color(fashion_red(), ProcessingSettings::default());

        let first = pipeline.process(brown_frame(&pool, 8, 8, 0), None);
        assert!(first.is_ok());
        assert!(first.passthrough);
        assert_eq!(first.guidance, Some(Guidance::NoFace));

        pipeline.process(brown_frame(&pool, 8, 8, 1), None);

        let frame = brown_frame(&pool, 8, 8, 2);
        let input = frame.data.to_vec();
        let third = pipeline.process(frame, None);
        assert_eq!(
            third.error(),
            Some(&PipelineError::FaceDetectionFailed { consecutive_misses: 3 })
        );
        assert!(third.passthrough);
        assert_eq!(third.guidance, Some(Guidance::FaceLost { consecutive_misses: 3 }));
        assert_eq!(&third.output.unwrap().data[..], &input[..]);
    }

    #[test]
    fn test_losing_face_forgets_previous_mask() {
        let script = [Some(0.9), None, None, None, None, None, None];
        let (mut pipeline, pool) = pipeline(ScriptedDetector::new(&script), ConstantModel(1.0));
        pipeline.apply_color(fashion_red(), ProcessingSettings::default());

        assert!(!pipeline.process(brown_frame(&pool, 8, 8, 0), None).passthrough);
        assert!(pipeline.segmenter.reuse(&brown_frame(&pool, 8, 8, 1)).is_some());

        let lost = (1..script.len() as u64)
            .map(|seq| pipeline.process(brown_frame(&pool, 8, 8, seq), None))
            .any(|processed| processed.guidance.is_some());
        assert!(lost);
        assert!(pipeline.segmenter.reuse(&brown_frame(&pool, 8, 8, 9)).is_none());
    }

    #[test]
    fn test_invalid_frame_contained() {
        let (mut pipeline, pool) = pipeline(FixedDetector(0.9), ConstantModel(1.0));
        pipeline.apply_color(fashion_red(), ProcessingSettings::default());

        let broken = Frame::from_rgba(vec![0; 10], 4, 4, 0);
        let processed = pipeline.process(broken, None);
        assert!(processed.output.is_none());
        assert!(matches!(processed.error(), Some(PipelineError::InvalidFrame(_))));

        // The next frame is unaffected
        let next = pipeline.process(brown_frame(&pool, 8, 8, 1), None);
        assert!(next.is_ok());
        assert!(!next.passthrough);
    }

    #[test]
    fn test_segmentation_failure_passes_through() {
        let (mut pipeline, pool) = pipeline(FixedDetector(0.9), FailingModel);
        pipeline.apply_color(fashion_red(), ProcessingSettings::default());

        let processed = pipeline.process(brown_frame(&pool, 8, 8, 0), None);
        assert!(processed.passthrough);
        assert!(matches!(processed.error(), Some(PipelineError::SegmentationFailed(_))));
        assert!(processed.output.is_some());
    }

    #[test]
    fn test_reduced_tier_reuses_mask() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (mut pipeline, pool) = pipeline(FixedDetector(0.9), CountingModel(calls.clone()));
        pipeline.apply_color(
            fashion_red(),
            ProcessingSettings::default().with_quality(QualityTier::Reduced),
        );

        for seq in 0..4 {
            let processed = pipeline.process(brown_frame(&pool, 16, 16, seq), None);
            assert_eq!(processed.tier, QualityTier::Reduced);
            assert!(!processed.passthrough);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_buffers_return_to_pool() {
        let (mut pipeline, pool) = pipeline(FixedDetector(0.9), ConstantModel(1.0));
        pipeline.apply_color(fashion_red(), ProcessingSettings::default().with_smoothing(0.5));
        for seq in 0..20 {
            drop(pipeline.process(brown_frame(&pool, 16, 16, seq), None));
        }
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_clear_color_restores_passthrough() {
        let (mut pipeline, pool) = pipeline(FixedDetector(0.9), ConstantModel(1.0));
        pipeline.apply_color(fashion_red(), ProcessingSettings::default());
        assert!(!pipeline.process(brown_frame(&pool, 8, 8, 0), None).passthrough);
        pipeline.clear_color();
        assert!(pipeline.look().color.is_none());
        assert!(pipeline.process(brown_frame(&pool, 8, 8, 1), None).passthrough);
    }
}
