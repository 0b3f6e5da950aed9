//! Hair segmentation model
//!
//! Expects a square NHWC input of `HAIR_INPUT_SIZE` with either 3 channels
//! (RGB) or 4 (RGB plus the previous mask, as in MediaPipe's hair model).
//! The output is either one probability channel or two softmax logits
//! (background, hair), in NHWC or NCHW layout.

use std::path::Path;

use ndarray::Array4;

use super::{load_session, resample_bilinear};
use crate::error::{PipelineError, Result};
use crate::segmentation::{SegmentationInput, SegmentationModel};

/// Model input edge length
pub const HAIR_INPUT_SIZE: u32 = 512;

/// ONNX hair segmentation
pub struct OnnxHairSegmentation {
    session: ort::session::Session,
    channels: usize,
    /// Whether the channel count has been confirmed by a successful run
    probed: bool,
    previous: Option<Vec<f32>>,
}

impl OnnxHairSegmentation {
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self> {
        Ok(Self::from_session(load_session(path, intra_threads)?))
    }

    /// Wrap a loaded session. The input layout is probed on the first
    /// frame: RGB plus previous mask first, then plain RGB.
    pub fn from_session(session: ort::session::Session) -> Self {
        Self {
            session,
            channels: 4,
            probed: false,
            previous: None,
        }
    }

    fn run(&mut self, input: &SegmentationInput<'_>, channels: usize) -> Result<Vec<f32>> {
        let size = HAIR_INPUT_SIZE as usize;
        let region = input.region;
        let rgb = input
            .frame
            .sample_rgb((region.x, region.y, region.width, region.height), HAIR_INPUT_SIZE, HAIR_INPUT_SIZE)?;
        let tensor_data = pack_input(&rgb, self.previous.as_deref(), channels, size * size);

        let input_array = Array4::from_shape_vec((1, size, size, channels), tensor_data)
            .map_err(|e| PipelineError::Model(format!("Failed to create input array: {}", e)))?;
        let input_tensor = ort::value::Tensor::from_array(input_array)
            .map_err(|e| PipelineError::Model(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| PipelineError::Model(format!("Hair inference failed: {}", e)))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| PipelineError::Model("No output from segmentation model".into()))?;
        let (shape, data) = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Model(format!("Failed to extract output: {}", e)))?;

        let channels_last = shape.last().copied() == Some(2);
        decode_probabilities(data, size * size, channels_last)
    }
}

impl SegmentationModel for OnnxHairSegmentation {
    fn infer(&mut self, input: &SegmentationInput<'_>) -> Result<Vec<f32>> {
        if input.region.is_empty() || input.width == 0 || input.height == 0 {
            return Ok(vec![0.0; (input.width * input.height) as usize]);
        }

        let probabilities = match self.run(input, self.channels) {
            Ok(probabilities) => probabilities,
            Err(e) if !self.probed && self.channels == 4 => {
                tracing::debug!(target: "hair_recolor::ml", "Retrying hair model with RGB input: {}", e);
                self.channels = 3;
                self.run(input, 3)?
            }
            Err(e) => return Err(e),
        };
        if !self.probed {
            tracing::info!(target: "hair_recolor::ml", channels = self.channels, "Hair model input layout");
            self.probed = true;
        }

        let resampled = resample_bilinear(
            &probabilities,
            HAIR_INPUT_SIZE,
            HAIR_INPUT_SIZE,
            input.width,
            input.height,
        );
        self.previous = Some(probabilities);
        Ok(resampled)
    }

    fn name(&self) -> &str {
        "onnx-hair-segmentation"
    }
}

/// Interleave RGB with the previous mask when the model takes 4 channels
pub(crate) fn pack_input(rgb: &[f32], previous: Option<&[f32]>, channels: usize, pixels: usize) -> Vec<f32> {
    if channels == 3 {
        return rgb.to_vec();
    }
    let mut out = Vec::with_capacity(pixels * 4);
    for i in 0..pixels {
        out.extend_from_slice(&rgb[i * 3..i * 3 + 3]);
        out.push(previous.and_then(|p| p.get(i).copied()).unwrap_or(0.0));
    }
    out
}

/// Reduce model output to one hair probability per pixel
pub(crate) fn decode_probabilities(data: &[f32], pixels: usize, channels_last: bool) -> Result<Vec<f32>> {
    if data.len() == pixels {
        return Ok(data.iter().map(|&v| v.clamp(0.0, 1.0)).collect());
    }
    if data.len() != pixels * 2 {
        return Err(PipelineError::Model(format!(
            "Unexpected hair model output size: {} (expected {} or {})",
            data.len(),
            pixels,
            pixels * 2
        )));
    }

    let logits = |i: usize| {
        if channels_last {
            (data[i * 2], data[i * 2 + 1])
        } else {
            (data[i], data[pixels + i])
        }
    };
    Ok((0..pixels)
        .map(|i| {
            let (background, hair) = logits(i);
            // Softmax over two classes
            1.0 / (1.0 + (background - hair).exp())
        })
        .collect())
}
