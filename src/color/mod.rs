//! Hair color definitions
//!
//! Colors are specified in HSB with every channel in `[0, 1]`. A
//! `ColorSpec` validates its channels on construction, so anything that
//! reaches the pipeline is already in range.

pub mod cache;
pub mod palette;
pub mod transform;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub use cache::{CacheStats, ColorCache, ColorKey};
pub use transform::{ColorLut, ColorTransform, GRADIENT_LUT_SIZE};

/// How far outside `[0, 1]` a channel may stray (rounding noise) before
/// it is rejected rather than clamped
const CHANNEL_TOLERANCE: f32 = 1e-3;

/// Clamp to `[0, 1]`, mapping `-0.0` to `0.0`
#[inline]
pub fn clamp_unit(value: f32) -> f32 {
    if value <= 0.0 {
        0.0
    } else if value >= 1.0 {
        1.0
    } else {
        value
    }
}

fn validate_channel(name: &str, value: f32) -> Result<f32> {
    if !value.is_finite() || value < -CHANNEL_TOLERANCE || value > 1.0 + CHANNEL_TOLERANCE {
        return Err(PipelineError::InvalidColorSpec(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(clamp_unit(value))
}

/// Color in hue/saturation/brightness space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Hsb {
    /// Hue as a fraction of the color wheel (0.0 = red)
    pub h: f32,
    /// Saturation
    pub s: f32,
    /// Brightness (value)
    pub b: f32,
}

impl Hsb {
    /// Create with every channel clamped to `[0, 1]`
    pub fn new(h: f32, s: f32, b: f32) -> Self {
        Self {
            h: clamp_unit(h),
            s: clamp_unit(s),
            b: clamp_unit(b),
        }
    }

    /// Create, rejecting non-finite or out-of-range channels
    pub fn try_new(h: f32, s: f32, b: f32) -> Result<Self> {
        Ok(Self {
            h: validate_channel("hue", h)?,
            s: validate_channel("saturation", s)?,
            b: validate_channel("brightness", b)?,
        })
    }

    /// Whether all channels lie in `[0, 1]`
    pub fn is_normalized(&self) -> bool {
        [self.h, self.s, self.b]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    /// Convert to RGB with channels in `[0, 1]`
    pub fn to_rgb(self) -> [f32; 3] {
        let h = self.h.rem_euclid(1.0) * 6.0;
        let c = self.b * self.s;
        let x = c * (1.0 - ((h % 2.0) - 1.0).abs());
        let m = self.b - c;

        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        [clamp_unit(r + m), clamp_unit(g + m), clamp_unit(b + m)]
    }

    /// Convert from RGB with channels in `[0, 1]`
    pub fn from_rgb(rgb: [f32; 3]) -> Self {
        let [r, g, b] = rgb;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let h = if delta <= f32::EPSILON {
            0.0
        } else if max == r {
            ((g - b) / delta).rem_euclid(6.0) / 6.0
        } else if max == g {
            ((b - r) / delta + 2.0) / 6.0
        } else {
            ((r - g) / delta + 4.0) / 6.0
        };
        let s = if max <= f32::EPSILON { 0.0 } else { delta / max };

        Self::new(h, s, max)
    }

    /// Interpolate toward `other`; hue takes the shorter way around the wheel
    pub fn lerp(self, other: Hsb, t: f32) -> Hsb {
        let t = clamp_unit(t);
        let mut dh = other.h - self.h;
        if dh > 0.5 {
            dh -= 1.0;
        } else if dh < -0.5 {
            dh += 1.0;
        }
        let h = (self.h + dh * t).rem_euclid(1.0);
        Hsb::new(
            h,
            self.s + (other.s - self.s) * t,
            self.b + (other.b - self.b) * t,
        )
    }
}

/// Circular distance between two hues, in `[0, 0.5]`
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(1.0);
    d.min(1.0 - d)
}

/// Color family, used for catalogue grouping and saturation/brightness bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorCategory {
    #[default]
    Natural,
    Fashion,
    Pastel,
    Vivid,
    Gradient,
}

impl ColorCategory {
    /// Get a human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            ColorCategory::Natural => "Natural",
            ColorCategory::Fashion => "Fashion",
            ColorCategory::Pastel => "Pastel",
            ColorCategory::Vivid => "Vivid",
            ColorCategory::Gradient => "Gradient",
        }
    }

    /// Get all categories
    pub fn all() -> &'static [ColorCategory] {
        &[
            ColorCategory::Natural,
            ColorCategory::Fashion,
            ColorCategory::Pastel,
            ColorCategory::Vivid,
            ColorCategory::Gradient,
        ]
    }

    /// Pull saturation/brightness into the band that characterises the category
    pub fn constrain(self, saturation: f32, brightness: f32) -> (f32, f32) {
        let (s, b) = (clamp_unit(saturation), clamp_unit(brightness));
        match self {
            ColorCategory::Natural => (s.min(0.6), b),
            ColorCategory::Fashion => (s.max(0.6), b),
            ColorCategory::Pastel => (s.min(0.45), b.max(0.75)),
            ColorCategory::Vivid => (s.max(0.8), b.max(0.6)),
            ColorCategory::Gradient => (s, b),
        }
    }
}

impl std::fmt::Display for ColorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Serialized form of a `ColorSpec`, validated on conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ColorSpecRepr {
    id: String,
    hue: f32,
    saturation: f32,
    brightness: f32,
    category: ColorCategory,
    #[serde(default, rename = "gradientStops")]
    gradient_stops: Vec<Hsb>,
}

/// A selectable hair color
///
/// For gradient colors the base channels mirror the first stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColorSpecRepr", into = "ColorSpecRepr")]
pub struct ColorSpec {
    id: String,
    base: Hsb,
    category: ColorCategory,
    gradient_stops: Vec<Hsb>,
}

impl ColorSpec {
    /// Create a solid (non-gradient) color
    pub fn new(id: impl Into<String>, hue: f32, saturation: f32, brightness: f32, category: ColorCategory) -> Result<Self> {
        if category == ColorCategory::Gradient {
            return Err(PipelineError::InvalidColorSpec(
                "gradient colors need stops; use ColorSpec::gradient".into(),
            ));
        }
        Ok(Self {
            id: id.into(),
            base: Hsb::try_new(hue, saturation, brightness)?,
            category,
            gradient_stops: Vec::new(),
        })
    }

    /// Create a gradient color from ordered top-to-bottom stops
    pub fn gradient(id: impl Into<String>, stops: Vec<Hsb>) -> Result<Self> {
        if stops.len() < 2 {
            return Err(PipelineError::InvalidColorSpec(format!(
                "gradient needs at least 2 stops, got {}",
                stops.len()
            )));
        }
        let stops = stops
            .into_iter()
            .map(|stop| Hsb::try_new(stop.h, stop.s, stop.b))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: id.into(),
            base: stops[0],
            category: ColorCategory::Gradient,
            gradient_stops: stops,
        })
    }

    /// Build from values already known to be valid (built-in presets)
    pub(crate) fn clamped(id: &str, base: Hsb, category: ColorCategory, stops: &[Hsb]) -> Self {
        let gradient_stops: Vec<Hsb> = if category == ColorCategory::Gradient {
            stops.iter().map(|s| Hsb::new(s.h, s.s, s.b)).collect()
        } else {
            Vec::new()
        };
        let base = gradient_stops.first().copied().unwrap_or(base);
        Self {
            id: id.to_string(),
            base: Hsb::new(base.h, base.s, base.b),
            category,
            gradient_stops,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hue(&self) -> f32 {
        self.base.h
    }

    pub fn saturation(&self) -> f32 {
        self.base.s
    }

    pub fn brightness(&self) -> f32 {
        self.base.b
    }

    pub fn hsb(&self) -> Hsb {
        self.base
    }

    pub fn category(&self) -> ColorCategory {
        self.category
    }

    /// Ordered gradient stops (empty unless the category is gradient)
    pub fn gradient_stops(&self) -> &[Hsb] {
        &self.gradient_stops
    }

    pub fn is_gradient(&self) -> bool {
        self.category == ColorCategory::Gradient
    }

    /// Move this color to another category and hue, keeping its
    /// saturation and brightness within the new category's band
    pub fn retarget(&self, id: impl Into<String>, category: ColorCategory, hue: f32) -> Result<ColorSpec> {
        let hue = validate_channel("hue", hue)?;
        let (s, b) = category.constrain(self.base.s, self.base.b);
        ColorSpec::new(id, hue, s, b, category)
    }

    /// Convert this color toward `target`: solid targets lend their
    /// category and hue, gradient targets replace the color outright
    pub fn convert_to(&self, target: &ColorSpec) -> Result<ColorSpec> {
        if target.is_gradient() {
            return Ok(target.clone());
        }
        self.retarget(target.id.clone(), target.category, target.base.h)
    }
}

impl TryFrom<ColorSpecRepr> for ColorSpec {
    type Error = PipelineError;

    fn try_from(repr: ColorSpecRepr) -> Result<Self> {
        if repr.category == ColorCategory::Gradient {
            ColorSpec::gradient(repr.id, repr.gradient_stops)
        } else if !repr.gradient_stops.is_empty() {
            Err(PipelineError::InvalidColorSpec(format!(
                "{} color {} must not carry gradient stops",
                repr.category, repr.id
            )))
        } else {
            ColorSpec::new(repr.id, repr.hue, repr.saturation, repr.brightness, repr.category)
        }
    }
}

impl From<ColorSpec> for ColorSpecRepr {
    fn from(spec: ColorSpec) -> Self {
        Self {
            id: spec.id,
            hue: spec.base.h,
            saturation: spec.base.s,
            brightness: spec.base.b,
            category: spec.category,
            gradient_stops: spec.gradient_stops,
        }
    }
}

/// Brightness/saturation deltas applied after color resolution
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorAdjustments {
    /// Brightness delta (-1.0 to 1.0, 0.0 = no change)
    pub brightness: f32,
    /// Saturation delta (-1.0 to 1.0, 0.0 = no change)
    pub saturation: f32,
}

impl ColorAdjustments {
    /// Create with deltas clamped to `[-1, 1]` (non-finite values become 0)
    pub fn new(brightness: f32, saturation: f32) -> Self {
        let sanitize = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        Self {
            brightness: sanitize(brightness),
            saturation: sanitize(saturation),
        }
    }

    /// No adjustment
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.brightness == 0.0 && self.saturation == 0.0
    }

    /// Apply to a color. Each delta touches only its own channel.
    pub fn apply(&self, color: Hsb) -> Hsb {
        let mut out = color;
        if self.brightness != 0.0 {
            out.b = clamp_unit(color.b + self.brightness);
        }
        if self.saturation != 0.0 {
            out.s = clamp_unit(color.s + self.saturation);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_rejected() {
        assert!(ColorSpec::new("x", 1.2, 0.5, 0.5, ColorCategory::Natural).is_err());
        assert!(ColorSpec::new("x", 0.5, f32::NAN, 0.5, ColorCategory::Natural).is_err());
        assert!(ColorSpec::new("x", 0.5, 0.5, -0.5, ColorCategory::Natural).is_err());
    }

    #[test]
    fn test_rounding_noise_is_clamped() {
        let spec = ColorSpec::new("x", 1.0004, -0.0002, 0.5, ColorCategory::Natural).unwrap();
        assert_eq!(spec.hue(), 1.0);
        assert_eq!(spec.saturation(), 0.0);
        assert!(spec.saturation().is_sign_positive());
    }

    #[test]
    fn test_boundaries_accepted() {
        for v in [0.0, 1.0] {
            let spec = ColorSpec::new("edge", v, v, v, ColorCategory::Vivid).unwrap();
            assert!(spec.hsb().is_normalized());
        }
    }

    #[test]
    fn test_gradient_rules() {
        assert!(ColorSpec::new("g", 0.1, 0.1, 0.1, ColorCategory::Gradient).is_err());
        assert!(ColorSpec::gradient("g", vec![Hsb::new(0.1, 0.5, 0.5)]).is_err());

        let spec = ColorSpec::gradient("g", vec![Hsb::new(0.1, 0.5, 0.5), Hsb::new(0.7, 0.5, 0.5)]).unwrap();
        assert_eq!(spec.category(), ColorCategory::Gradient);
        assert_eq!(spec.gradient_stops().len(), 2);
        assert_eq!(spec.hsb(), spec.gradient_stops()[0]);
    }

    #[test]
    fn test_solid_spec_has_no_stops() {
        let spec = ColorSpec::new("s", 0.1, 0.5, 0.5, ColorCategory::Fashion).unwrap();
        assert!(spec.gradient_stops().is_empty());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok = r#"{"id":"red","hue":0.0,"saturation":0.9,"brightness":0.8,"category":"fashion"}"#;
        let spec: ColorSpec = serde_json::from_str(ok).unwrap();
        assert_eq!(spec.category(), ColorCategory::Fashion);

        let bad = r#"{"id":"red","hue":3.0,"saturation":0.9,"brightness":0.8,"category":"fashion"}"#;
        assert!(serde_json::from_str::<ColorSpec>(bad).is_err());

        let stray_stops = r#"{"id":"red","hue":0.0,"saturation":0.9,"brightness":0.8,"category":"vivid",
            "gradientStops":[{"h":0.1,"s":0.1,"b":0.1}]}"#;
        assert!(serde_json::from_str::<ColorSpec>(stray_stops).is_err());
    }

    #[test]
    fn test_hsb_rgb_primaries() {
        assert_eq!(Hsb::new(0.0, 1.0, 1.0).to_rgb(), [1.0, 0.0, 0.0]);
        assert_eq!(Hsb::new(0.0, 0.0, 1.0).to_rgb(), [1.0, 1.0, 1.0]);
        assert_eq!(Hsb::new(0.5, 1.0, 0.0).to_rgb(), [0.0, 0.0, 0.0]);

        let blue = Hsb::from_rgb([0.0, 0.0, 1.0]);
        assert!((blue.h - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(blue.s, 1.0);
    }

    #[test]
    fn test_lerp_takes_short_arc() {
        let a = Hsb::new(0.95, 1.0, 1.0);
        let b = Hsb::new(0.05, 1.0, 1.0);
        let mid = a.lerp(b, 0.5);
        assert!(hue_distance(mid.h, 0.0) < 1e-5);
    }

    #[test]
    fn test_hue_distance_wraps() {
        assert!((hue_distance(0.99, 0.01) - 0.02).abs() < 1e-6);
        assert!((hue_distance(0.25, 0.75) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_retarget_applies_category_band() {
        let brown = ColorSpec::new("brown", 0.07, 0.55, 0.35, ColorCategory::Natural).unwrap();
        let pastel = brown.retarget("pink", ColorCategory::Pastel, 0.93).unwrap();
        assert_eq!(pastel.saturation(), 0.45);
        assert_eq!(pastel.brightness(), 0.75);
        assert!(brown.retarget("g", ColorCategory::Gradient, 0.1).is_err());
    }

    #[test]
    fn test_adjustments_touch_single_channel() {
        let color = Hsb::new(0.3, 0.4, 0.5);
        let brighter = ColorAdjustments::new(0.2, 0.0).apply(color);
        assert_eq!(brighter.h.to_bits(), color.h.to_bits());
        assert_eq!(brighter.s.to_bits(), color.s.to_bits());
        assert!((brighter.b - 0.7).abs() < 1e-6);

        let duller = ColorAdjustments::new(0.0, -1.0).apply(color);
        assert_eq!(duller.b.to_bits(), color.b.to_bits());
        assert_eq!(duller.s, 0.0);
    }

    #[test]
    fn test_adjustments_sanitized() {
        let adj = ColorAdjustments::new(f32::INFINITY, -4.0);
        assert_eq!(adj.brightness, 0.0);
        assert_eq!(adj.saturation, -1.0);
    }
}
