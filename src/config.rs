//! Pipeline configuration
//!
//! Loaded from a JSON file; every field has a default so partial files are
//! fine. `validate` pulls out-of-range values back into range.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::quality::QualityTier;
use crate::telemetry::LogConfig;

/// Buffer pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum buffers alive at once (input + output frames)
    pub max_buffers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_buffers: 24 }
    }
}

/// Face tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections below this confidence are treated as misses (0.0 - 1.0)
    pub confidence_threshold: f32,
    /// How many frames old a held geometry may be before it is stale
    pub staleness_window: u64,
    /// Consecutive misses that escalate to `FaceDetectionFailed`
    pub max_consecutive_misses: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            staleness_window: 5,
            max_consecutive_misses: 3,
        }
    }
}

/// Hair segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Weight of the newest raw mask in the temporal average (0.0 - 1.0)
    pub ema_alpha: f32,
    /// Pixels farther than face depth + margin (meters) are not hair
    pub depth_margin_m: f32,
    /// Alpha at which a pixel counts toward the hair bounding region
    pub region_threshold: f32,
    /// Largest frame-sequence gap across which the previous mask is still
    /// blended in. Must cover the minimal tier's segmentation interval.
    pub max_history_gap: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.7,
            depth_margin_m: 0.35,
            region_threshold: 0.5,
            max_history_gap: 8,
        }
    }
}

/// Adaptive quality settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Trailing window length in frames
    pub window: usize,
    /// Consecutive over-budget frames before demoting a tier
    pub demote_after: u32,
    /// Consecutive comfortable frames before promoting a tier
    pub promote_after: u32,
    /// Fraction of the budget considered comfortable (0.0 - 1.0)
    pub promote_headroom: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window: 8,
            demote_after: 5,
            promote_after: 30,
            promote_headroom: 0.7,
        }
    }
}

/// Compositing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Box blur radius applied to the mask before blending, in mask pixels
    pub feather_radius: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self { feather_radius: 2 }
    }
}

/// Color cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of color tables kept (0 disables the cache)
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// ONNX model locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model directory; searched for next to the executable when unset
    pub dir: Option<PathBuf>,
    /// Face landmark model file name
    pub face_model: String,
    /// Hair segmentation model file name
    pub hair_model: String,
    /// Intra-op threads per ONNX session
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: None,
            face_model: "face_landmark.onnx".to_string(),
            hair_model: "hair_segmentation.onnx".to_string(),
            intra_threads: 2,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame-rate target (15-120)
    pub target_fps: u32,
    /// Render worker threads (color, composite, post-process)
    pub worker_threads: usize,
    /// Frames waiting for the tracker before the oldest is dropped
    pub ingress_capacity: usize,
    /// Processed frames buffered for the output stream
    pub output_capacity: usize,
    pub pool: PoolConfig,
    pub tracker: TrackerConfig,
    pub segmentation: SegmentationConfig,
    pub quality: QualityConfig,
    pub compositor: CompositorConfig,
    pub cache: CacheConfig,
    pub models: ModelConfig,
    pub logging: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            worker_threads: 2,
            ingress_capacity: 2,
            output_capacity: 4,
            pool: PoolConfig::default(),
            tracker: TrackerConfig::default(),
            segmentation: SegmentationConfig::default(),
            quality: QualityConfig::default(),
            compositor: CompositorConfig::default(),
            cache: CacheConfig::default(),
            models: ModelConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let mut config: PipelineConfig = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate();
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Parse)?;
        fs::write(path, content).map_err(ConfigError::Io)
    }

    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("hair-recolor").join("config.json"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Ok(path) if path.exists() => match Self::load(&path) {
                Ok(config) => {
                    tracing::info!(target: "hair_recolor::config", path = %path.display(), "Loaded configuration");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Clamp every value into its supported range
    pub fn validate(&mut self) {
        self.target_fps = self.target_fps.clamp(15, 120);
        self.worker_threads = self.worker_threads.clamp(1, 16);
        self.ingress_capacity = self.ingress_capacity.clamp(1, 8);
        self.output_capacity = self.output_capacity.max(1);
        // Each in-flight frame may hold an input and an output buffer
        let min_buffers = 2 * (self.ingress_capacity + self.worker_threads + 4) + self.output_capacity + 1;
        self.pool.max_buffers = self.pool.max_buffers.max(min_buffers);

        let unit = |v: f32, fallback: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { fallback };
        self.tracker.confidence_threshold = unit(self.tracker.confidence_threshold, 0.5);
        self.tracker.max_consecutive_misses = self.tracker.max_consecutive_misses.max(1);
        self.segmentation.ema_alpha = unit(self.segmentation.ema_alpha, 0.7).max(0.05);
        self.segmentation.region_threshold = unit(self.segmentation.region_threshold, 0.5);
        if !self.segmentation.depth_margin_m.is_finite() || self.segmentation.depth_margin_m < 0.0 {
            self.segmentation.depth_margin_m = SegmentationConfig::default().depth_margin_m;
        }
        let min_gap = QualityTier::Minimal.plan().segmentation_interval;
        self.segmentation.max_history_gap = self.segmentation.max_history_gap.max(min_gap);

        self.quality.window = self.quality.window.max(1);
        self.quality.demote_after = self.quality.demote_after.max(1);
        self.quality.promote_after = self.quality.promote_after.max(1);
        self.quality.promote_headroom = unit(self.quality.promote_headroom, 0.7);

        self.compositor.feather_radius = self.compositor.feather_radius.min(8);
        self.models.intra_threads = self.models.intra_threads.max(1);
    }

    /// Per-frame latency budget
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    NoConfigDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "JSON error: {}", e),
            ConfigError::NoConfigDir => write!(f, "Could not find config directory"),
        }
    }
}

impl std::error::Error for ConfigError {}
