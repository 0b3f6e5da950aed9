//! Hair compositing
//!
//! Blends the resolved hair color into the frame through a feathered hair
//! mask. The output goes into one pooled buffer; feathering scratch space
//! belongs to the compositor and is reused between frames.

pub mod blend;

use crate::color::ColorLut;
use crate::config::CompositorConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{Frame, FrameBufferPool};
use crate::segmentation::HairMask;

pub use blend::BlendMode;

/// Mask-driven color compositor
pub struct Compositor {
    pool: FrameBufferPool,
    config: CompositorConfig,
    /// Feathered copy of the current mask
    feathered: HairMask,
    /// Horizontal pass of the box blur
    scratch: Vec<f32>,
}

impl Compositor {
    pub fn new(pool: FrameBufferPool, config: CompositorConfig) -> Self {
        Self {
            pool,
            config,
            feathered: HairMask::empty(0, 0, 1, 0),
            scratch: Vec::new(),
        }
    }

    pub fn feather_radius(&self) -> u32 {
        self.config.feather_radius
    }

    /// Blend `lut` into `frame` wherever `mask` says there is hair.
    ///
    /// The result is written to a buffer taken from the pool; the input is
    /// left untouched so the caller can still pass it through on failure.
    pub fn composite(&mut self, frame: &Frame, mask: &HairMask, lut: &ColorLut, mode: BlendMode) -> Result<Frame> {
        frame.validate()?;
        if !mask.matches_frame(frame) {
            return Err(PipelineError::InvalidFrame(format!(
                "mask {}x{} (scale {}) does not cover frame {}x{}",
                mask.width, mask.height, mask.scale, frame.width, frame.height
            )));
        }

        let bpp = frame.bytes_per_pixel()?;
        let offsets = frame.rgb_offsets()?;
        let mut output = self.pool.acquire(frame.data.len())?;
        output.copy_from_slice(&frame.data);

        self.feather(mask);
        let feathered = &self.feathered;
        let region = mask.region;

        for y in 0..frame.height {
            let color = lut.color_at(y, region.as_ref(), frame.height);
            let row_start = y as usize * frame.width as usize * bpp;
            for x in 0..frame.width {
                let a = feathered.sample_frame(x, y);
                if a <= 0.0 {
                    continue;
                }
                let idx = row_start + x as usize * bpp;
                for (channel, &offset) in offsets.iter().enumerate() {
                    let o = frame.data[idx + offset] as f32 / 255.0;
                    let v = mode.apply(o, color[channel], a);
                    output[idx + offset] = (v * 255.0).round() as u8;
                }
            }
        }

        Ok(Frame {
            data: output,
            width: frame.width,
            height: frame.height,
            format: frame.format,
            timestamp: frame.timestamp,
            sequence: frame.sequence,
        })
    }

    /// Separable box blur of `mask` into `self.feathered`
    fn feather(&mut self, mask: &HairMask) {
        let out = &mut self.feathered;
        out.width = mask.width;
        out.height = mask.height;
        out.scale = mask.scale;
        out.frame_width = mask.frame_width;
        out.frame_height = mask.frame_height;
        out.region = mask.region;
        out.confidence = mask.confidence;
        out.sequence = mask.sequence;
        out.alpha.clear();
        out.alpha.resize(mask.alpha.len(), 0.0);

        let radius = self.config.feather_radius as usize;
        if radius == 0 {
            out.alpha.copy_from_slice(&mask.alpha);
            return;
        }

        let (w, h) = (mask.width as usize, mask.height as usize);
        self.scratch.clear();
        self.scratch.resize(mask.alpha.len(), 0.0);

        for y in 0..h {
            let row = &mask.alpha[y * w..(y + 1) * w];
            for x in 0..w {
                let lo = x.saturating_sub(radius);
                let hi = (x + radius).min(w - 1);
                let sum: f32 = row[lo..=hi].iter().sum();
                self.scratch[y * w + x] = sum / (hi - lo + 1) as f32;
            }
        }

        for x in 0..w {
            for y in 0..h {
                let lo = y.saturating_sub(radius);
                let hi = (y + radius).min(h - 1);
                let sum: f32 = (lo..=hi).map(|yy| self.scratch[yy * w + x]).sum();
                out.alpha[y * w + x] = (sum / (hi - lo + 1) as f32).clamp(0.0, 1.0);
            }
        }
    }
}
