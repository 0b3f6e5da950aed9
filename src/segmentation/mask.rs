//! Hair probability mask

use crate::frame::{Frame, Region};

/// Per-pixel hair alpha, possibly at a lower resolution than its frame.
///
/// Mask dimensions are always `ceil(frame_dim / scale)`.
#[derive(Clone, Debug, PartialEq)]
pub struct HairMask {
    /// Row-major alpha values in `[0, 1]`
    pub alpha: Vec<f32>,
    /// Mask width
    pub width: u32,
    /// Mask height
    pub height: u32,
    /// Integer downsample factor relative to the source frame
    pub scale: u32,
    /// Source frame width
    pub frame_width: u32,
    /// Source frame height
    pub frame_height: u32,
    /// Bounding box of confident hair pixels, in frame pixels
    pub region: Option<Region>,
    /// Mean certainty of the mask inside the search region, in `[0, 1]`
    pub confidence: f32,
    /// Sequence number of the frame the mask was computed from
    pub sequence: u64,
}

impl HairMask {
    /// Mask dimensions for a frame at the given downsample factor
    pub fn dims_for(frame_width: u32, frame_height: u32, scale: u32) -> (u32, u32) {
        let scale = scale.max(1);
        (frame_width.div_ceil(scale), frame_height.div_ceil(scale))
    }

    /// All-zero mask for a frame
    pub fn empty(frame_width: u32, frame_height: u32, scale: u32, sequence: u64) -> Self {
        let scale = scale.max(1);
        let (width, height) = Self::dims_for(frame_width, frame_height, scale);
        Self {
            alpha: vec![0.0; (width * height) as usize],
            width,
            height,
            scale,
            frame_width,
            frame_height,
            region: None,
            confidence: 0.0,
            sequence,
        }
    }

    /// Whether the mask keeps the declared scale relationship to `frame`
    pub fn matches_frame(&self, frame: &Frame) -> bool {
        self.frame_width == frame.width
            && self.frame_height == frame.height
            && self.is_consistent()
    }

    /// Whether dimensions, scale and buffer length agree
    pub fn is_consistent(&self) -> bool {
        self.scale >= 1
            && (self.width, self.height) == Self::dims_for(self.frame_width, self.frame_height, self.scale)
            && self.alpha.len() == (self.width * self.height) as usize
    }

    /// Alpha at mask coordinates (0 outside)
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.alpha[(y * self.width + x) as usize]
    }

    /// Bilinear alpha at fractional mask coordinates, clamped to the edges
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let u = u.clamp(0.0, (self.width - 1) as f32);
        let v = v.clamp(0.0, (self.height - 1) as f32);
        let x0 = u.floor() as u32;
        let y0 = v.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = u - x0 as f32;
        let fy = v - y0 as f32;

        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x1, y0) * fx;
        let bottom = self.get(x0, y1) * (1.0 - fx) + self.get(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Alpha at a frame pixel, upsampling through the scale factor
    #[inline]
    pub fn sample_frame(&self, x: u32, y: u32) -> f32 {
        if self.scale == 1 {
            return self.get(x, y);
        }
        let s = self.scale as f32;
        self.sample((x as f32 + 0.5) / s - 0.5, (y as f32 + 0.5) / s - 0.5)
    }

    /// Resample onto another scale factor for the same frame size
    pub fn rescaled(&self, scale: u32) -> HairMask {
        let mut out = HairMask::empty(self.frame_width, self.frame_height, scale, self.sequence);
        let ratio = out.scale as f32 / self.scale.max(1) as f32;
        for y in 0..out.height {
            for x in 0..out.width {
                let u = (x as f32 + 0.5) * ratio - 0.5;
                let v = (y as f32 + 0.5) * ratio - 0.5;
                out.alpha[(y * out.width + x) as usize] = self.sample(u, v);
            }
        }
        out.region = self.region;
        out.confidence = self.confidence;
        out
    }

    /// Bounding box (frame pixels) of mask pixels at or above `threshold`
    pub fn bounding_region(&self, threshold: f32) -> Option<Region> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for y in 0..self.height {
            let row = &self.alpha[(y * self.width) as usize..((y + 1) * self.width) as usize];
            for (x, &a) in row.iter().enumerate() {
                if a >= threshold {
                    let x = x as u32;
                    bounds = Some(match bounds {
                        None => (x, y, x, y),
                        Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                    });
                }
            }
        }

        bounds.map(|(x0, y0, x1, y1)| {
            let fx0 = x0 * self.scale;
            let fy0 = y0 * self.scale;
            let fx1 = ((x1 + 1) * self.scale).min(self.frame_width);
            let fy1 = ((y1 + 1) * self.scale).min(self.frame_height);
            Region::new(fx0, fy0, fx1 - fx0, fy1 - fy0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims_follow_scale() {
        assert_eq!(HairMask::dims_for(640, 480, 1), (640, 480));
        assert_eq!(HairMask::dims_for(641, 481, 2), (321, 241));
        assert_eq!(HairMask::dims_for(640, 480, 4), (160, 120));
    }

    #[test]
    fn test_matches_frame() {
        let frame = Frame::from_rgba(vec![0; 5 * 3 * 4], 5, 3, 0);
        let mask = HairMask::empty(5, 3, 2, 0);
        assert!(mask.matches_frame(&frame));

        let mut broken = mask.clone();
        broken.width = 5;
        assert!(!broken.matches_frame(&frame));
    }

    #[test]
    fn test_sample_frame_upsamples() {
        let mut mask = HairMask::empty(4, 4, 2, 0);
        mask.alpha = vec![1.0, 0.0, 1.0, 0.0];
        // Frame pixel (0,0) maps inside mask pixel (0,0)
        assert_eq!(mask.sample_frame(0, 0), 1.0);
        assert_eq!(mask.sample_frame(3, 0), 0.0);
        let between = mask.sample_frame(1, 0);
        assert!(between > 0.0 && between < 1.0);
    }

    #[test]
    fn test_bounding_region_in_frame_pixels() {
        let mut mask = HairMask::empty(8, 8, 2, 0);
        mask.alpha[(1 * mask.width + 2) as usize] = 0.9;
        let region = mask.bounding_region(0.5).unwrap();
        assert_eq!(region, Region::new(4, 2, 2, 2));
        assert!(HairMask::empty(8, 8, 2, 0).bounding_region(0.5).is_none());
    }

    #[test]
    fn test_rescaled_keeps_relationship() {
        let mut mask = HairMask::empty(9, 7, 1, 3);
        mask.alpha.fill(0.5);
        let half = mask.rescaled(2);
        assert!(half.is_consistent());
        assert_eq!((half.width, half.height), (5, 4));
        assert!(half.alpha.iter().all(|&a| (a - 0.5).abs() < 1e-6));
    }
}
