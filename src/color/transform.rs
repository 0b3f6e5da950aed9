//! Color resolution
//!
//! Turns a `ColorSpec` plus adjustments into a `ColorLut`, the per-pixel
//! color function used by the compositor. Resolution is pure: the same
//! inputs always produce the same table, which is what makes caching safe.

use std::sync::Arc;

use super::cache::{ColorCache, ColorKey};
use super::{ColorAdjustments, ColorSpec, Hsb};
use crate::frame::Region;

/// Number of entries in a gradient lookup table
pub const GRADIENT_LUT_SIZE: usize = 256;

/// Precomputed pixel color function
#[derive(Debug, Clone, PartialEq)]
pub enum ColorLut {
    /// Same color for every pixel
    Solid { hsb: Hsb, rgb: [f32; 3] },
    /// Colors indexed by vertical position within the hair region,
    /// top (index 0) to bottom
    Gradient { hsb: Vec<Hsb>, rgb: Vec<[f32; 3]> },
}

impl ColorLut {
    /// HSB color at normalized vertical position `t`
    pub fn hsb_at(&self, t: f32) -> Hsb {
        match self {
            ColorLut::Solid { hsb, .. } => *hsb,
            ColorLut::Gradient { hsb, .. } => hsb[Self::index(t, hsb.len())],
        }
    }

    /// RGB color at normalized vertical position `t`
    #[inline]
    pub fn rgb_at(&self, t: f32) -> [f32; 3] {
        match self {
            ColorLut::Solid { rgb, .. } => *rgb,
            ColorLut::Gradient { rgb, .. } => rgb[Self::index(t, rgb.len())],
        }
    }

    /// RGB color for pixel row `y`, positioned within the hair `region`.
    /// Without a region the stops span all `frame_height` rows.
    #[inline]
    pub fn color_at(&self, y: u32, region: Option<&Region>, frame_height: u32) -> [f32; 3] {
        match (self, region) {
            (ColorLut::Solid { rgb, .. }, _) => *rgb,
            (ColorLut::Gradient { .. }, Some(region)) => self.rgb_at(region.vertical_t(y)),
            (ColorLut::Gradient { .. }, None) => self.rgb_at(Region::new(0, 0, 1, frame_height).vertical_t(y)),
        }
    }

    pub fn is_gradient(&self) -> bool {
        matches!(self, ColorLut::Gradient { .. })
    }

    fn index(t: f32, len: usize) -> usize {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        ((t * (len - 1) as f32).round() as usize).min(len - 1)
    }
}

/// Resolves color specs, optionally through a shared cache
#[derive(Clone, Default)]
pub struct ColorTransform {
    cache: Option<Arc<ColorCache>>,
}

impl ColorTransform {
    /// Create a transform backed by `cache` (`None` disables caching)
    pub fn new(cache: Option<Arc<ColorCache>>) -> Self {
        Self { cache }
    }

    /// Transform without caching
    pub fn uncached() -> Self {
        Self { cache: None }
    }

    /// Shared cache, if any
    pub fn cache(&self) -> Option<&Arc<ColorCache>> {
        self.cache.as_ref()
    }

    /// Resolve a color to its lookup table, consulting the cache first
    pub fn resolve(&self, spec: &ColorSpec, adjustments: &ColorAdjustments) -> Arc<ColorLut> {
        let Some(cache) = self.cache.as_ref().filter(|c| c.capacity() > 0) else {
            return Arc::new(Self::compute(spec, adjustments));
        };

        let key = ColorKey::new(spec, adjustments);
        if let Some(lut) = cache.get(&key) {
            return lut;
        }

        let lut = Arc::new(Self::compute(spec, adjustments));
        cache.put(key, lut.clone());
        lut
    }

    /// Build the lookup table; no caching
    pub fn compute(spec: &ColorSpec, adjustments: &ColorAdjustments) -> ColorLut {
        if !spec.is_gradient() {
            let hsb = adjustments.apply(spec.hsb());
            return ColorLut::Solid { hsb, rgb: hsb.to_rgb() };
        }

        let stops = spec.gradient_stops();
        let segments = (stops.len() - 1) as f32;
        let mut hsb = Vec::with_capacity(GRADIENT_LUT_SIZE);
        let mut rgb = Vec::with_capacity(GRADIENT_LUT_SIZE);

        for i in 0..GRADIENT_LUT_SIZE {
            let t = i as f32 / (GRADIENT_LUT_SIZE - 1) as f32;
            let position = t * segments;
            let segment = (position.floor() as usize).min(stops.len() - 2);
            let local = position - segment as f32;

            let color = adjustments.apply(stops[segment].lerp(stops[segment + 1], local));
            hsb.push(color);
            rgb.push(color.to_rgb());
        }

        ColorLut::Gradient { hsb, rgb }
    }
}
