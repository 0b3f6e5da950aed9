//! Built-in hair color presets

use super::{ColorCategory, ColorSpec, Hsb};

/// Hue of the canonical fashion red
pub const CANONICAL_RED_HUE: f32 = 0.0;

/// Preset table: (id, category, stops). Solid colors have a single stop.
const PRESETS: &[(&str, ColorCategory, &[(f32, f32, f32)])] = &[
    ("natural-black", ColorCategory::Natural, &[(0.07, 0.25, 0.10)]),
    ("natural-brown", ColorCategory::Natural, &[(0.07, 0.55, 0.35)]),
    ("natural-blonde", ColorCategory::Natural, &[(0.11, 0.45, 0.80)]),
    ("natural-auburn", ColorCategory::Natural, &[(0.03, 0.60, 0.45)]),
    ("fashion-red", ColorCategory::Fashion, &[(CANONICAL_RED_HUE, 0.85, 0.75)]),
    ("fashion-violet", ColorCategory::Fashion, &[(0.78, 0.70, 0.60)]),
    ("pastel-pink", ColorCategory::Pastel, &[(0.93, 0.35, 0.95)]),
    ("pastel-lavender", ColorCategory::Pastel, &[(0.75, 0.30, 0.90)]),
    ("vivid-blue", ColorCategory::Vivid, &[(0.60, 0.95, 0.85)]),
    ("vivid-green", ColorCategory::Vivid, &[(0.36, 0.90, 0.75)]),
    (
        "gradient-sunset",
        ColorCategory::Gradient,
        &[(0.08, 0.80, 0.90), (0.97, 0.80, 0.80), (0.78, 0.70, 0.50)],
    ),
];

fn build(id: &str, category: ColorCategory, stops: &[(f32, f32, f32)]) -> ColorSpec {
    let stops: Vec<Hsb> = stops.iter().map(|&(h, s, b)| Hsb::new(h, s, b)).collect();
    let base = stops.first().copied().unwrap_or_default();
    ColorSpec::clamped(id, base, category, &stops)
}

/// All presets, in catalogue order
pub fn presets() -> Vec<ColorSpec> {
    PRESETS
        .iter()
        .map(|(id, category, stops)| build(id, *category, stops))
        .collect()
}

/// Look up a preset by id
pub fn preset(id: &str) -> Option<ColorSpec> {
    PRESETS
        .iter()
        .find(|(preset_id, _, _)| *preset_id == id)
        .map(|(id, category, stops)| build(id, *category, stops))
}

/// Presets belonging to one category
pub fn presets_in(category: ColorCategory) -> Vec<ColorSpec> {
    presets()
        .into_iter()
        .filter(|spec| spec.category() == category)
        .collect()
}
