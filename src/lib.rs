//! Hair Recolor - real-time hair color try-on pipeline
//!
//! Turns camera frames into recolored frames: face tracking, hair
//! segmentation, color transformation, alpha compositing and
//! post-processing, under a per-frame latency budget. ML models and the
//! camera are pluggable capabilities; ONNX Runtime and nokhwa adapters are
//! included.

#[cfg(feature = "camera")]
pub mod camera;
pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod frame;
pub mod ml;
pub mod pipeline;
pub mod postprocess;
pub mod quality;
pub mod segmentation;
pub mod settings;
pub mod telemetry;
pub mod tracking;

pub use color::{ColorAdjustments, ColorCache, ColorCategory, ColorSpec, ColorTransform, Hsb};
pub use compositor::{BlendMode, Compositor};
pub use config::{ConfigError, PipelineConfig};
pub use error::{PipelineError, Result};
pub use frame::{DepthHint, Frame, FrameBufferPool, PixelFormat};
pub use pipeline::{
    CancellationToken, CapturedFrame, DiagnosticsSink, FrameDiagnostics, FramePipeline, FrameSource, Guidance,
    ProcessedFrame, Session,
};
pub use postprocess::PostProcessor;
pub use quality::{QualityController, QualityTier};
pub use segmentation::{HairMask, HairSegmenter, SegmentationModel};
pub use settings::{Look, ProcessingSettings};
pub use tracking::{FaceDetector, FaceGeometry, FaceTracker};
