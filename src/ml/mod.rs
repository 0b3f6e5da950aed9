//! ONNX Runtime capabilities
//!
//! `OnnxFaceDetector` and `OnnxHairSegmentation` implement the pipeline's
//! capability traits on top of `ort`. When the runtime or the model files
//! cannot be found, `load_capabilities` falls back to `Unavailable`, which
//! reports every call as a model error so frames pass through.

pub mod face;
pub mod hair;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crate::segmentation::{SegmentationInput, SegmentationModel};
use crate::tracking::{FaceDetector, FaceGeometry};

pub use face::OnnxFaceDetector;
pub use hair::OnnxHairSegmentation;

static RUNTIME: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the ONNX Runtime environment once per process
pub fn init_runtime() -> Result<()> {
    RUNTIME
        .get_or_init(|| {
            ort::init()
                .with_name("HairRecolor")
                .commit()
                .map(|_| ())
                .map_err(|e| format!("Failed to initialize ONNX Runtime: {}", e))
        })
        .clone()
        .map_err(PipelineError::Model)
}

/// Locate the models directory.
///
/// An explicit `dir` wins; otherwise `models/` is searched next to the
/// executable and up to two levels above it (cargo target dirs), then in
/// the working directory.
pub fn find_model_dir(config: &ModelConfig) -> Result<PathBuf> {
    if let Some(dir) = &config.dir {
        if dir.is_dir() {
            return Ok(dir.clone());
        }
        return Err(PipelineError::Model(format!(
            "Configured model directory does not exist: {:?}",
            dir
        )));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        for ancestor in exe_path.ancestors().skip(1).take(3) {
            let model_dir = ancestor.join("models");
            if model_dir.is_dir() {
                return Ok(model_dir);
            }
        }
    }

    let cwd = std::env::current_dir().map_err(|e| PipelineError::Model(e.to_string()))?;
    let model_dir = cwd.join("models");
    if model_dir.is_dir() {
        return Ok(model_dir);
    }

    Err(PipelineError::Model(
        "Models directory not found. Create a 'models' directory with ONNX models.".to_string(),
    ))
}

/// Build a session for one model file
pub(crate) fn load_session(path: &Path, intra_threads: usize) -> Result<ort::session::Session> {
    if !path.exists() {
        return Err(PipelineError::Model(format!("Model not found: {:?}", path)));
    }
    init_runtime()?;

    let session = ort::session::Session::builder()
        .map_err(|e| PipelineError::Model(format!("Failed to create session builder: {}", e)))?
        .with_intra_threads(intra_threads.max(1))
        .map_err(|e| PipelineError::Model(format!("Failed to set threads: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| PipelineError::Model(format!("Failed to load {:?}: {}", path, e)))?;

    tracing::info!(target: "hair_recolor::ml", "Loaded model from {:?}", path);
    Ok(session)
}

/// Load both capabilities, substituting `Unavailable` for any that fail
pub fn load_capabilities(config: &ModelConfig) -> (Box<dyn FaceDetector>, Box<dyn SegmentationModel>) {
    let model_dir = match find_model_dir(config) {
        Ok(dir) => {
            tracing::info!(target: "hair_recolor::ml", "Model directory: {:?}", dir);
            dir
        }
        Err(e) => {
            tracing::warn!(target: "hair_recolor::ml", "{}. Recoloring disabled.", e);
            let reason = e.to_string();
            return (
                Box::new(Unavailable::new(reason.clone())),
                Box::new(Unavailable::new(reason)),
            );
        }
    };

    let detector: Box<dyn FaceDetector> =
        match OnnxFaceDetector::load(&model_dir.join(&config.face_model), config.intra_threads) {
            Ok(detector) => Box::new(detector),
            Err(e) => {
                tracing::warn!(target: "hair_recolor::ml", "Face detector unavailable: {}", e);
                Box::new(Unavailable::new(e.to_string()))
            }
        };

    let segmentation: Box<dyn SegmentationModel> =
        match OnnxHairSegmentation::load(&model_dir.join(&config.hair_model), config.intra_threads) {
            Ok(model) => Box::new(model),
            Err(e) => {
                tracing::warn!(target: "hair_recolor::ml", "Hair segmentation unavailable: {}", e);
                Box::new(Unavailable::new(e.to_string()))
            }
        };

    (detector, segmentation)
}

/// Capability that always fails with the reason it could not be loaded
#[derive(Debug, Clone)]
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl FaceDetector for Unavailable {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<FaceGeometry>> {
        Err(PipelineError::Model(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

impl SegmentationModel for Unavailable {
    fn infer(&mut self, _input: &SegmentationInput<'_>) -> Result<Vec<f32>> {
        Err(PipelineError::Model(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Bilinear resample of a single-channel `src_w x src_h` map
pub(crate) fn resample_bilinear(src: &[f32], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<f32> {
    let mut out = vec![0.0f32; (dst_w * dst_h) as usize];
    if src_w == 0 || src_h == 0 || src.len() < (src_w * src_h) as usize {
        return out;
    }
    let x_ratio = src_w as f32 / dst_w.max(1) as f32;
    let y_ratio = src_h as f32 / dst_h.max(1) as f32;
    let at = |x: u32, y: u32| src[(y * src_w + x) as usize];

    for y in 0..dst_h {
        let fy = ((y as f32 + 0.5) * y_ratio - 0.5).clamp(0.0, (src_h - 1) as f32);
        let y0 = fy.floor() as u32;
        let y1 = (y0 + 1).min(src_h - 1);
        let ty = fy - y0 as f32;
        for x in 0..dst_w {
            let fx = ((x as f32 + 0.5) * x_ratio - 0.5).clamp(0.0, (src_w - 1) as f32);
            let x0 = fx.floor() as u32;
            let x1 = (x0 + 1).min(src_w - 1);
            let tx = fx - x0 as f32;

            let top = at(x0, y0) * (1.0 - tx) + at(x1, y0) * tx;
            let bottom = at(x0, y1) * (1.0 - tx) + at(x1, y1) * tx;
            out[(y * dst_w + x) as usize] = top * (1.0 - ty) + bottom * ty;
        }
    }
    out
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentationConfig;
    use crate::frame::Region;
    use crate::segmentation::HairSegmenter;
    use crate::tracking::tests::centred_face;

    #[test]
    fn test_unavailable_reports_model_error() {
        let mut unavailable = Unavailable::new("no models");
        let frame = Frame::from_rgba(vec![0; 16], 2, 2, 0);
        assert_eq!(
            FaceDetector::detect(&mut unavailable, &frame),
            Err(PipelineError::Model("no models".into()))
        );

        // The segmenter maps model errors to a recoverable segmentation failure
        let mut segmenter = HairSegmenter::new(Box::new(unavailable), SegmentationConfig::default());
        let frame = Frame::from_rgba(vec![0; 32 * 32 * 4], 32, 32, 0);
        let err = segmenter.segment(&frame, &centred_face(0.9), None, 1).unwrap_err();
        assert!(matches!(err, PipelineError::SegmentationFailed(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unavailable_segmentation_model() {
        let mut unavailable = Unavailable::new("missing");
        let frame = Frame::from_rgba(vec![0; 16], 2, 2, 0);
        let input = SegmentationInput {
            frame: &frame,
            region: Region::new(0, 0, 2, 2),
            width: 2,
            height: 2,
        };
        assert!(unavailable.infer(&input).is_err());
        assert_eq!(SegmentationModel::name(&unavailable), "unavailable");
    }

    #[test]
    fn test_missing_configured_dir() {
        let config = ModelConfig {
            dir: Some(PathBuf::from("/definitely/not/a/model/dir")),
            ..ModelConfig::default()
        };
        assert!(matches!(find_model_dir(&config), Err(PipelineError::Model(_))));
    }

    #[test]
    fn test_missing_model_file() {
        let err = load_session(Path::new("/definitely/not/a/model.onnx"), 1).unwrap_err();
        assert!(matches!(err, PipelineError::Model(_)));
    }

    #[test]
    fn test_resample_identity_and_upscale() {
        let src = vec![0.0, 1.0, 0.0, 1.0];
        assert_eq!(resample_bilinear(&src, 2, 2, 2, 2), src);

        let up = resample_bilinear(&src, 2, 2, 4, 1);
        assert_eq!(up.len(), 4);
        assert_eq!(up[0], 0.0);
        assert_eq!(up[3], 1.0);
        assert!(up[1] > 0.0 && up[1] < up[2]);
    }

    #[test]
    fn test_resample_degenerate_source() {
        assert_eq!(resample_bilinear(&[], 0, 0, 3, 2), vec![0.0; 6]);
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }
}
