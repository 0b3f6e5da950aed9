//! Per-look processing settings
//!
//! A look is the color the user picked plus how it should be rendered.
//! Both travel together so that a frame never sees half of an update.

use serde::{Deserialize, Serialize};

use crate::color::{ColorAdjustments, ColorSpec};
use crate::compositor::BlendMode;
use crate::quality::QualityTier;

/// How the selected color is rendered
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub blend_mode: BlendMode,
    /// Skin/hair smoothing strength (0.0 - 1.0, 0.0 = off)
    pub smoothing: f32,
    /// Edge enhancement strength (0.0 - 1.0, 0.0 = off)
    pub edge_enhancement: f32,
    /// Highest fidelity this look may use; the pipeline may go lower
    pub quality: QualityTier,
    /// Brightness/saturation deltas applied to the resolved color
    pub adjustments: ColorAdjustments,
}

impl ProcessingSettings {
    pub fn new(blend_mode: BlendMode) -> Self {
        Self {
            blend_mode,
            ..Self::default()
        }
    }

    /// Set smoothing strength (clamped to 0.0 - 1.0)
    pub fn with_smoothing(mut self, strength: f32) -> Self {
        self.smoothing = unit(strength);
        self
    }

    /// Set edge enhancement strength (clamped to 0.0 - 1.0)
    pub fn with_edge_enhancement(mut self, strength: f32) -> Self {
        self.edge_enhancement = unit(strength);
        self
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_adjustments(mut self, adjustments: ColorAdjustments) -> Self {
        self.adjustments = ColorAdjustments::new(adjustments.brightness, adjustments.saturation);
        self
    }

    /// Pull every value back into range (used after deserializing)
    pub fn normalized(self) -> Self {
        Self {
            smoothing: unit(self.smoothing),
            edge_enhancement: unit(self.edge_enhancement),
            adjustments: ColorAdjustments::new(self.adjustments.brightness, self.adjustments.saturation),
            ..self
        }
    }
}

fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// The color and settings currently applied to the stream
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Look {
    /// `None` until a color is selected; frames pass through unchanged
    pub color: Option<ColorSpec>,
    pub settings: ProcessingSettings,
}

impl Look {
    pub fn new(color: ColorSpec, settings: ProcessingSettings) -> Self {
        Self {
            color: Some(color),
            settings: settings.normalized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_clamp() {
        let settings = ProcessingSettings::new(BlendMode::Overlay)
            .with_smoothing(3.0)
            .with_edge_enhancement(f32::NAN)
            .with_adjustments(ColorAdjustments {
                brightness: -4.0,
                saturation: 0.25,
            });
        assert_eq!(settings.blend_mode, BlendMode::Overlay);
        assert_eq!(settings.smoothing, 1.0);
        assert_eq!(settings.edge_enhancement, 0.0);
        assert_eq!(settings.adjustments.brightness, -1.0);
        assert_eq!(settings.adjustments.saturation, 0.25);
    }

    #[test]
    fn test_deserialize_partial() {
        let settings: ProcessingSettings =
            serde_json::from_str(r#"{"blend_mode": "multiply", "smoothing": 7.5, "quality": "reduced"}"#).unwrap();
        let settings = settings.normalized();
        assert_eq!(settings.blend_mode, BlendMode::Multiply);
        assert_eq!(settings.smoothing, 1.0);
        assert_eq!(settings.quality, QualityTier::Reduced);
        assert!(settings.adjustments.is_identity());
    }

    #[test]
    fn test_default_look_has_no_color() {
        let look = Look::default();
        assert!(look.color.is_none());
        assert_eq!(look.settings.quality, QualityTier::Full);
    }
}
