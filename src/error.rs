//! Error taxonomy for the frame pipeline
//!
//! Per-frame errors are carried in `ProcessedFrame::status` and never cross
//! a frame boundary. Only `Capture` is fatal to a running session.

/// Pipeline error type.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Malformed input frame (empty, wrong size, unsupported format).
    InvalidFrame(String),
    /// Face tracking lost for several consecutive frames.
    FaceDetectionFailed {
        /// Number of consecutive frames without a usable face
        consecutive_misses: u32,
    },
    /// Segmentation capability unavailable or model error.
    SegmentationFailed(String),
    /// Color specification out of range.
    InvalidColorSpec(String),
    /// Buffer pool or cache over capacity.
    ResourceExhausted(String),
    /// Work discarded because the session was stopped.
    Cancelled,
    /// Camera/session-level failure reported by the capture source.
    Capture(String),
    /// ML capability could not be loaded.
    Model(String),
}

impl PipelineError {
    /// Whether the error only affects the frame it occurred on.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PipelineError::Capture(_))
    }

    /// Short machine-friendly name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidFrame(_) => "invalid_frame",
            PipelineError::FaceDetectionFailed { .. } => "face_detection_failed",
            PipelineError::SegmentationFailed(_) => "segmentation_failed",
            PipelineError::InvalidColorSpec(_) => "invalid_color_spec",
            PipelineError::ResourceExhausted(_) => "resource_exhausted",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Capture(_) => "capture",
            PipelineError::Model(_) => "model",
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            PipelineError::FaceDetectionFailed { consecutive_misses } => write!(
                f,
                "Face detection failed for {} consecutive frames",
                consecutive_misses
            ),
            PipelineError::SegmentationFailed(msg) => write!(f, "Segmentation failed: {}", msg),
            PipelineError::InvalidColorSpec(msg) => write!(f, "Invalid color spec: {}", msg),
            PipelineError::ResourceExhausted(msg) => write!(f, "Resource exhausted: {}", msg),
            PipelineError::Cancelled => write!(f, "Session cancelled"),
            PipelineError::Capture(msg) => write!(f, "Capture error: {}", msg),
            PipelineError::Model(msg) => write!(f, "Model error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
