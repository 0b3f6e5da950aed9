//! Post-processing
//!
//! Smoothing blends each pixel toward its 3x3 box-blurred neighbourhood.
//! Edge enhancement is an unsharp mask: `px + strength * (px - blur)`.
//! Both work in place on the frame; the snapshot they read from is a
//! scratch buffer owned by the processor.

use crate::error::Result;
use crate::frame::Frame;
use crate::quality::QualityTier;
use crate::settings::ProcessingSettings;

/// Frame smoothing and sharpening
#[derive(Debug, Default)]
pub struct PostProcessor {
    scratch: Vec<u8>,
}

impl PostProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply smoothing then edge enhancement.
    ///
    /// Passes with zero strength are skipped, and nothing runs at the
    /// minimal quality tier.
    pub fn enhance(&mut self, frame: &mut Frame, settings: &ProcessingSettings) -> Result<()> {
        if settings.quality == QualityTier::Minimal {
            return Ok(());
        }
        let smoothing = settings.smoothing.clamp(0.0, 1.0);
        let edge = settings.edge_enhancement.clamp(0.0, 1.0);
        if smoothing <= 0.0 && edge <= 0.0 {
            return Ok(());
        }
        frame.validate()?;

        if smoothing > 0.0 {
            self.pass(frame, |px, blur| px + (blur - px) * smoothing)?;
        }
        if edge > 0.0 {
            self.pass(frame, |px, blur| px + edge * (px - blur))?;
        }
        Ok(())
    }

    /// Run one 3x3 neighbourhood pass over the color channels
    fn pass(&mut self, frame: &mut Frame, combine: impl Fn(f32, f32) -> f32) -> Result<()> {
        let bpp = frame.bytes_per_pixel()?;
        let offsets = frame.rgb_offsets()?;
        let (w, h) = (frame.width as usize, frame.height as usize);

        self.scratch.clear();
        self.scratch.extend_from_slice(&frame.data);
        let src = &self.scratch;

        for y in 0..h {
            let y0 = y.saturating_sub(1);
            let y1 = (y + 1).min(h - 1);
            for x in 0..w {
                let x0 = x.saturating_sub(1);
                let x1 = (x + 1).min(w - 1);
                let count = ((y1 - y0 + 1) * (x1 - x0 + 1)) as f32;
                let idx = (y * w + x) * bpp;

                for &offset in &offsets {
                    let mut sum = 0u32;
                    for ny in y0..=y1 {
                        for nx in x0..=x1 {
                            sum += src[(ny * w + nx) * bpp + offset] as u32;
                        }
                    }
                    let blur = sum as f32 / count;
                    let px = src[idx + offset] as f32;
                    frame.data[idx + offset] = combine(px, blur).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        Ok(())
    }
}
