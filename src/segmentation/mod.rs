//! Hair segmentation
//!
//! `HairSegmenter` runs a `SegmentationModel` inside the hair search region
//! derived from the face, optionally gates the result with depth, and
//! smooths it over time with an exponential moving average:
//!
//! `mask_t = alpha * raw_t + (1 - alpha) * mask_{t-1}`

pub mod mask;

use crate::config::SegmentationConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{DepthHint, Frame, Region};
use crate::tracking::FaceGeometry;

pub use mask::HairMask;

/// What the model is asked to segment
pub struct SegmentationInput<'a> {
    /// Source frame
    pub frame: &'a Frame,
    /// Search region in frame pixels, aligned to the mask grid
    pub region: Region,
    /// Output width the model must produce
    pub width: u32,
    /// Output height the model must produce
    pub height: u32,
}

/// Hair segmentation capability (ML model or test double)
pub trait SegmentationModel: Send {
    /// Hair probabilities for `input.region`, resampled to
    /// `input.width x input.height`, row-major
    fn infer(&mut self, input: &SegmentationInput<'_>) -> Result<Vec<f32>>;

    /// Name for logging
    fn name(&self) -> &str {
        "segmentation-model"
    }
}

/// Temporally smoothed hair segmenter
pub struct HairSegmenter {
    model: Box<dyn SegmentationModel>,
    config: SegmentationConfig,
    previous: Option<HairMask>,
}

impl HairSegmenter {
    pub fn new(model: Box<dyn SegmentationModel>, config: SegmentationConfig) -> Self {
        Self {
            model,
            config,
            previous: None,
        }
    }

    /// Segment hair in `frame` at the given downsample factor
    pub fn segment(
        &mut self,
        frame: &Frame,
        face: &FaceGeometry,
        depth: Option<&DepthHint>,
        scale: u32,
    ) -> Result<HairMask> {
        frame.validate()?;
        let scale = scale.max(1);
        let mut mask = HairMask::empty(frame.width, frame.height, scale, frame.sequence);

        let search = face.hair_search_region(frame.width, frame.height);
        let (mx0, my0) = (search.x / scale, search.y / scale);
        let mx1 = search.right().div_ceil(scale).min(mask.width);
        let my1 = search.bottom().div_ceil(scale).min(mask.height);
        let (roi_w, roi_h) = (mx1.saturating_sub(mx0), my1.saturating_sub(my0));

        if roi_w > 0 && roi_h > 0 {
            // Model input covers exactly the mask pixels it fills
            let (x0, y0) = (mx0 * scale, my0 * scale);
            let region = Region::new(
                x0,
                y0,
                (mx1 * scale).min(frame.width) - x0,
                (my1 * scale).min(frame.height) - y0,
            );
            let input = SegmentationInput {
                frame,
                region,
                width: roi_w,
                height: roi_h,
            };
            let raw = self.model.infer(&input).map_err(|e| match e {
                PipelineError::SegmentationFailed(msg) => PipelineError::SegmentationFailed(msg),
                other => PipelineError::SegmentationFailed(other.to_string()),
            })?;
            if raw.len() != (roi_w * roi_h) as usize {
                return Err(PipelineError::SegmentationFailed(format!(
                    "{} produced {} values, expected {}x{}",
                    self.model.name(),
                    raw.len(),
                    roi_w,
                    roi_h
                )));
            }

            for y in 0..roi_h {
                let dst = ((my0 + y) * mask.width + mx0) as usize;
                let src = (y * roi_w) as usize;
                for x in 0..roi_w as usize {
                    let p = raw[src + x];
                    mask.alpha[dst + x] = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
                }
            }

            if let Some(depth) = depth {
                self.apply_depth(&mut mask, face, depth, (mx0, my0, mx1, my1));
            }
        }

        self.smooth(&mut mask);

        mask.region = mask.bounding_region(self.config.region_threshold);
        mask.confidence = certainty(&mask, (mx0, my0, mx1, my1));
        self.previous = Some(mask.clone());
        Ok(mask)
    }

    /// Last emitted mask, if it was computed for a frame of this size
    pub fn reuse(&self, frame: &Frame) -> Option<HairMask> {
        self.previous
            .as_ref()
            .filter(|mask| mask.matches_frame(frame))
            .cloned()
    }

    /// Forget temporal state
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Zero raw probabilities behind the head
    fn apply_depth(&self, mask: &mut HairMask, face: &FaceGeometry, depth: &DepthHint, roi: (u32, u32, u32, u32)) {
        let Some(face_depth) = face_depth(face, depth) else {
            return;
        };
        let limit = face_depth + self.config.depth_margin_m;
        let (mx0, my0, mx1, my1) = roi;
        let fw = mask.frame_width as f32;
        let fh = mask.frame_height as f32;
        let s = mask.scale as f32;

        for y in my0..my1 {
            let ny = (y as f32 + 0.5) * s / fh;
            for x in mx0..mx1 {
                let nx = (x as f32 + 0.5) * s / fw;
                if let Some(d) = depth.sample(nx, ny) {
                    if d > limit {
                        mask.alpha[(y * mask.width + x) as usize] = 0.0;
                    }
                }
            }
        }
    }

    /// Blend with the previous mask, resampling it if the scale changed
    fn smooth(&self, mask: &mut HairMask) {
        let Some(previous) = &self.previous else {
            return;
        };
        if previous.frame_width != mask.frame_width || previous.frame_height != mask.frame_height {
            return;
        }
        if mask.sequence.saturating_sub(previous.sequence) > self.config.max_history_gap {
            return;
        }

        let rescaled;
        let previous = if previous.scale == mask.scale {
            previous
        } else {
            rescaled = previous.rescaled(mask.scale);
            &rescaled
        };

        let a = self.config.ema_alpha;
        for (current, prev) in mask.alpha.iter_mut().zip(previous.alpha.iter()) {
            *current = (a * *current + (1.0 - a) * prev).clamp(0.0, 1.0);
        }
    }
}

/// Median depth over a small cross around the face centre
fn face_depth(face: &FaceGeometry, depth: &DepthHint) -> Option<f32> {
    let bbox = face.bounding_box()?;
    let (cx, cy) = bbox.center();
    let dx = bbox.width() * 0.2;
    let dy = bbox.height() * 0.2;
    let mut samples: Vec<f32> = [(0.0, 0.0), (-dx, 0.0), (dx, 0.0), (0.0, -dy), (0.0, dy)]
        .iter()
        .filter_map(|(ox, oy)| depth.sample(cx + ox, cy + oy))
        .collect();
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(samples[samples.len() / 2])
}

/// Mean of |2p - 1| inside the search region: 1 when every pixel is a
/// confident yes/no, 0 when everything is a coin flip
fn certainty(mask: &HairMask, roi: (u32, u32, u32, u32)) -> f32 {
    let (mx0, my0, mx1, my1) = roi;
    let count = (mx1.saturating_sub(mx0) * my1.saturating_sub(my0)) as f32;
    if count == 0.0 {
        return 0.0;
    }
    let mut total = 0.0;
    for y in my0..my1 {
        for x in mx0..mx1 {
            total += (2.0 * mask.get(x, y) - 1.0).abs();
        }
    }
    (total / count).clamp(0.0, 1.0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tracking::tests::centred_face;

    /// Model that reports a constant probability everywhere
    pub(crate) struct ConstantModel(pub f32);

    impl SegmentationModel for ConstantModel {
        fn infer(&mut self, input: &SegmentationInput<'_>) -> Result<Vec<f32>> {
            Ok(vec![self.0; (input.width * input.height) as usize])
        }
    }

    /// Model that replays a sequence of constant probabilities
    struct SequenceModel(Vec<f32>);

    impl SegmentationModel for SequenceModel {
        fn infer(&mut self, input: &SegmentationInput<'_>) -> Result<Vec<f32>> {
            let p = self.0.remove(0);
            Ok(vec![p; (input.width * input.height) as usize])
        }
    }

    /// Model that is never available
    pub(crate) struct FailingModel;

    impl SegmentationModel for FailingModel {
        fn infer(&mut self, _input: &SegmentationInput<'_>) -> Result<Vec<f32>> {
            Err(PipelineError::Model("capability unavailable".into()))
        }
    }

    /// Model that records the regions it was asked to segment
    struct RecordingModel(std::sync::Arc<parking_lot::Mutex<Vec<(Region, u32, u32)>>>);

    impl SegmentationModel for RecordingModel {
        fn infer(&mut self, input: &SegmentationInput<'_>) -> Result<Vec<f32>> {
            self.0.lock().push((input.region, input.width, input.height));
            Ok(vec![1.0; (input.width * input.height) as usize])
        }
    }

    struct WrongSizeModel;

    impl SegmentationModel for WrongSizeModel {
        fn infer(&mut self, _input: &SegmentationInput<'_>) -> Result<Vec<f32>> {
            Ok(vec![1.0; 3])
        }
    }

    fn frame(width: u32, height: u32, sequence: u64) -> Frame {
        Frame::from_rgba(vec![0; (width * height * 4) as usize], width, height, sequence)
    }

    fn segmenter(model: impl SegmentationModel + 'static) -> HairSegmenter {
        HairSegmenter::new(Box::new(model), SegmentationConfig::default())
    }

    #[test]
    fn test_mask_restricted_to_search_region() {
        let mut seg = segmenter(ConstantModel(1.0));
        let face = centred_face(1.0);
        let mask = seg.segment(&frame(100, 100, 0), &face, None, 1).unwrap();

        assert!(mask.is_consistent());
        assert_eq!(mask.get(50, 50), 1.0);
        // Corners are outside the widened face box
        assert_eq!(mask.get(0, 0), 0.0);
        assert_eq!(mask.get(99, 99), 0.0);
        assert!(mask.region.is_some());
    }

    #[test]
    fn test_scale_relationship_holds_for_every_tier() {
        let face = centred_face(1.0);
        for scale in [1, 2, 4] {
            let mut seg = segmenter(ConstantModel(0.8));
            let f = frame(97, 61, 0);
            let mask = seg.segment(&f, &face, None, scale).unwrap();
            assert!(mask.matches_frame(&f), "scale {} broke dimensions", scale);
            assert_eq!(mask.scale, scale);
        }
    }

    #[test]
    fn test_temporal_smoothing() {
        let mut seg = segmenter(SequenceModel(vec![1.0, 0.0]));
        let face = centred_face(1.0);
        seg.segment(&frame(50, 50, 0), &face, None, 1).unwrap();
        let second = seg.segment(&frame(50, 50, 1), &face, None, 1).unwrap();

        // 0.7 * 0 + 0.3 * 1
        assert!((second.get(25, 25) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_smoothing_tolerates_tier_interval() {
        let mut seg = segmenter(SequenceModel(vec![1.0, 0.0]));
        let face = centred_face(1.0);
        seg.segment(&frame(50, 50, 0), &face, None, 4).unwrap();
        let second = seg.segment(&frame(50, 50, 4), &face, None, 4).unwrap();
        assert!((second.get(6, 6) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_stale_mask_not_blended() {
        let mut seg = segmenter(SequenceModel(vec![1.0, 1.0]));
        let shifted = |dx: f32| {
            let mut face = centred_face(1.0);
            for lm in &mut face.landmarks {
                lm.x += dx;
            }
            face
        };
        let first = seg.segment(&frame(200, 100, 0), &shifted(-0.35), None, 1).unwrap();
        assert_eq!(first.get(30, 45), 1.0);

        // Face reappears on the other side long after the last mask
        let second = seg.segment(&frame(200, 100, 500), &shifted(0.35), None, 1).unwrap();
        assert_eq!(second.get(30, 45), 0.0);
        assert_eq!(second.get(170, 45), 1.0);
    }

    #[test]
    fn test_model_region_snapped_to_mask_grid() {
        let regions = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let face = centred_face(1.0);
        let f = frame(97, 61, 0);
        let search = face.hair_search_region(f.width, f.height);
        assert_eq!(search.x % 2, 1);

        for scale in [2, 4] {
            let mut seg = segmenter(RecordingModel(regions.clone()));
            seg.segment(&f, &face, None, scale).unwrap();
            let (region, width, height) = regions.lock().pop().unwrap();

            assert_eq!(region.x % scale, 0);
            assert_eq!(region.y % scale, 0);
            assert!(region.x <= search.x && region.right() >= search.right());
            assert_eq!(region.right(), (region.x + width * scale).min(f.width));
            assert_eq!(region.bottom(), (region.y + height * scale).min(f.height));
        }
    }

    #[test]
    fn test_smoothing_across_scale_change() {
        let mut seg = segmenter(SequenceModel(vec![1.0, 1.0]));
        let face = centred_face(1.0);
        seg.segment(&frame(64, 64, 0), &face, None, 1).unwrap();
        let second = seg.segment(&frame(64, 64, 1), &face, None, 2).unwrap();
        assert!(second.is_consistent());
        assert!((second.get(16, 16) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_model_failure_is_segmentation_failed() {
        let mut seg = segmenter(FailingModel);
        let result = seg.segment(&frame(10, 10, 0), &centred_face(1.0), None, 1);
        assert!(matches!(result, Err(PipelineError::SegmentationFailed(_))));
    }

    #[test]
    fn test_wrong_output_size_rejected() {
        let mut seg = segmenter(WrongSizeModel);
        let result = seg.segment(&frame(10, 10, 0), &centred_face(1.0), None, 1);
        assert!(matches!(result, Err(PipelineError::SegmentationFailed(_))));
    }

    #[test]
    fn test_depth_gates_background() {
        let mut seg = segmenter(ConstantModel(1.0));
        let face = centred_face(1.0);
        // Face at 0.5 m on the left half, wall at 3 m on the right half
        let depth = DepthHint {
            width: 2,
            height: 1,
            depth: vec![0.5, 3.0],
        };
        let mut face_left = face.clone();
        for lm in &mut face_left.landmarks {
            lm.x -= 0.15;
        }
        let mask = seg.segment(&frame(100, 100, 0), &face_left, Some(&depth), 1).unwrap();
        assert_eq!(mask.get(30, 50), 1.0);
        assert_eq!(mask.get(52, 50), 0.0);
    }

    #[test]
    fn test_reuse_requires_matching_frame() {
        let mut seg = segmenter(ConstantModel(1.0));
        assert!(seg.reuse(&frame(20, 20, 0)).is_none());
        seg.segment(&frame(20, 20, 0), &centred_face(1.0), None, 2).unwrap();
        assert!(seg.reuse(&frame(20, 20, 1)).is_some());
        assert!(seg.reuse(&frame(40, 20, 2)).is_none());
        seg.reset();
        assert!(seg.reuse(&frame(20, 20, 3)).is_none());
    }

    #[test]
    fn test_confidence_reflects_certainty() {
        let mut sure = segmenter(ConstantModel(1.0));
        let mut unsure = segmenter(ConstantModel(0.5));
        let face = centred_face(1.0);
        let a = sure.segment(&frame(40, 40, 0), &face, None, 1).unwrap();
        let b = unsure.segment(&frame(40, 40, 0), &face, None, 1).unwrap();
        assert!((a.confidence - 1.0).abs() < 1e-6);
        assert!(b.confidence < 1e-6);
    }
}
