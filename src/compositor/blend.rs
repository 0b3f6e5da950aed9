//! Blend mode definitions
//!
//! Defines how the hair color is combined with the original pixels. All
//! channels are normalized to `[0, 1]`; `a` is the feathered mask alpha.

use serde::{Deserialize, Serialize};

/// Blend modes for hair recoloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Replace the color
    /// Result = Original × (1 - a) + Color × a
    #[default]
    Normal,

    /// Tint, keeps the original shading
    /// Result = Original × (1 - a) + (Original × Color) × a
    Multiply,

    /// Contrast-preserving tint
    /// Overlay = 2·O·C if O < 0.5, else 1 - 2·(1 - O)·(1 - C)
    /// Result = Original × (1 - a) + Overlay × a
    Overlay,
}

impl BlendMode {
    /// Blend one channel
    #[inline]
    pub fn apply(self, original: f32, color: f32, alpha: f32) -> f32 {
        let blended = match self {
            BlendMode::Normal => color,
            BlendMode::Multiply => original * color,
            BlendMode::Overlay => {
                if original < 0.5 {
                    2.0 * original * color
                } else {
                    1.0 - 2.0 * (1.0 - original) * (1.0 - color)
                }
            }
        };
        (original * (1.0 - alpha) + blended * alpha).clamp(0.0, 1.0)
    }

    /// Get a human-readable name for the blend mode
    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Overlay => "Overlay",
        }
    }

    /// Get all available blend modes
    pub fn all() -> &'static [BlendMode] {
        &[BlendMode::Normal, BlendMode::Multiply, BlendMode::Overlay]
    }

    /// Parse a case-insensitive mode name
    pub fn from_name(name: &str) -> Option<BlendMode> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for BlendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
