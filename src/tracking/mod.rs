//! Face tracking
//!
//! Wraps a `FaceDetector` capability with a smoothing policy: a
//! low-confidence frame reuses the last confident geometry while it is
//! still fresh, and repeated misses escalate to `FaceDetectionFailed`.

use crate::config::TrackerConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{Frame, Region};

/// Face landmark in normalized image coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Relative depth, model-specific scale
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Head orientation in radians
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Normalized bounding box `[x0, y0] - [x1, y1]`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FaceBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }
}

/// Face location for one frame
#[derive(Clone, Debug, PartialEq)]
pub struct FaceGeometry {
    /// Ordered landmarks (model-defined order)
    pub landmarks: Vec<Landmark>,
    pub pose: HeadPose,
    /// Detector confidence in `[0, 1]`
    pub confidence: f32,
    /// Sequence number of the frame the geometry was detected on
    pub sequence: u64,
}

impl FaceGeometry {
    /// Create, clamping confidence to `[0, 1]`
    pub fn new(landmarks: Vec<Landmark>, pose: HeadPose, confidence: f32, sequence: u64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            landmarks,
            pose,
            confidence,
            sequence,
        }
    }

    /// Bounding box of the landmarks, clamped to the image
    pub fn bounding_box(&self) -> Option<FaceBox> {
        let first = self.landmarks.first()?;
        let mut bbox = FaceBox {
            x0: first.x,
            y0: first.y,
            x1: first.x,
            y1: first.y,
        };
        for lm in &self.landmarks[1..] {
            bbox.x0 = bbox.x0.min(lm.x);
            bbox.y0 = bbox.y0.min(lm.y);
            bbox.x1 = bbox.x1.max(lm.x);
            bbox.y1 = bbox.y1.max(lm.y);
        }
        bbox.x0 = bbox.x0.clamp(0.0, 1.0);
        bbox.y0 = bbox.y0.clamp(0.0, 1.0);
        bbox.x1 = bbox.x1.clamp(0.0, 1.0);
        bbox.y1 = bbox.y1.clamp(0.0, 1.0);
        Some(bbox)
    }

    /// Whether the geometry is too old to stand in for frame `current`
    pub fn is_stale(&self, current: u64, window: u64) -> bool {
        current.saturating_sub(self.sequence) > window
    }

    /// Pixel region where hair can plausibly be: the face box widened and
    /// extended above (crown) and below (long hair) the face
    pub fn hair_search_region(&self, width: u32, height: u32) -> Region {
        let Some(face) = self.bounding_box() else {
            return Region::new(0, 0, width, height);
        };
        let (cx, _) = face.center();
        let fw = face.width().max(0.05);
        let fh = face.height().max(0.05);

        let x0 = (cx - fw * 1.1).clamp(0.0, 1.0);
        let x1 = (cx + fw * 1.1).clamp(0.0, 1.0);
        let y0 = (face.y0 - fh * 0.9).clamp(0.0, 1.0);
        let y1 = (face.y1 + fh * 1.5).clamp(0.0, 1.0);

        let px0 = (x0 * width as f32).floor() as u32;
        let py0 = (y0 * height as f32).floor() as u32;
        let px1 = ((x1 * width as f32).ceil() as u32).min(width);
        let py1 = ((y1 * height as f32).ceil() as u32).min(height);
        Region::new(px0, py0, px1.saturating_sub(px0), py1.saturating_sub(py0))
    }
}

/// Face detection capability (ML model or test double)
pub trait FaceDetector: Send {
    /// Detect the most prominent face. Returning `Ok(None)` means no face;
    /// a low-confidence face should still be returned with its confidence.
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceGeometry>>;

    /// Name for logging
    fn name(&self) -> &str {
        "face-detector"
    }
}

/// Outcome of tracking one frame
#[derive(Clone, Debug, PartialEq)]
pub enum Tracking {
    /// Confident detection on this frame
    Detected(FaceGeometry),
    /// Recent confident geometry reused for a low-confidence frame
    Held {
        geometry: FaceGeometry,
        /// What the detector reported on this frame (0 when nothing)
        observed_confidence: f32,
    },
    /// No usable face
    NotDetected,
}

impl Tracking {
    pub fn geometry(&self) -> Option<&FaceGeometry> {
        match self {
            Tracking::Detected(geometry) | Tracking::Held { geometry, .. } => Some(geometry),
            Tracking::NotDetected => None,
        }
    }

    /// Confidence reported by the detector on this frame
    pub fn confidence(&self) -> Option<f32> {
        match self {
            Tracking::Detected(geometry) => Some(geometry.confidence),
            Tracking::Held {
                observed_confidence, ..
            } => Some(*observed_confidence),
            Tracking::NotDetected => None,
        }
    }
}

/// Face tracker with temporal hold and miss escalation
pub struct FaceTracker {
    detector: Box<dyn FaceDetector>,
    config: TrackerConfig,
    last_confident: Option<FaceGeometry>,
    consecutive_misses: u32,
}

impl FaceTracker {
    pub fn new(detector: Box<dyn FaceDetector>, config: TrackerConfig) -> Self {
        Self {
            detector,
            config,
            last_confident: None,
            consecutive_misses: 0,
        }
    }

    /// Track the face in `frame`.
    ///
    /// Fails with `InvalidFrame` for malformed frames and with
    /// `FaceDetectionFailed` once misses reach the configured limit.
    pub fn track(&mut self, frame: &Frame) -> Result<Tracking> {
        frame.validate()?;

        let detection = match self.detector.detect(frame) {
            Ok(detection) => detection,
            Err(e) => {
                tracing::warn!(
                    target: "hair_recolor::tracking",
                    detector = self.detector.name(),
                    sequence = frame.sequence,
                    "Face detector error: {}",
                    e
                );
                None
            }
        };

        let observed_confidence = detection.as_ref().map(|g| g.confidence).unwrap_or(0.0);

        if let Some(mut geometry) = detection {
            if geometry.confidence >= self.config.confidence_threshold {
                geometry.sequence = frame.sequence;
                self.consecutive_misses = 0;
                self.last_confident = Some(geometry.clone());
                return Ok(Tracking::Detected(geometry));
            }
        }

        if let Some(held) = &self.last_confident {
            if !held.is_stale(frame.sequence, self.config.staleness_window) {
                self.consecutive_misses = 0;
                return Ok(Tracking::Held {
                    geometry: held.clone(),
                    observed_confidence,
                });
            }
        }

        self.consecutive_misses = self.consecutive_misses.saturating_add(1);
        tracing::debug!(
            target: "hair_recolor::tracking",
            sequence = frame.sequence,
            misses = self.consecutive_misses,
            observed_confidence,
            "No usable face"
        );

        if self.consecutive_misses >= self.config.max_consecutive_misses {
            return Err(PipelineError::FaceDetectionFailed {
                consecutive_misses: self.consecutive_misses,
            });
        }
        Ok(Tracking::NotDetected)
    }

    /// Consecutive frames without a usable face
    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    /// Forget held geometry and miss count
    pub fn reset(&mut self) {
        self.last_confident = None;
        self.consecutive_misses = 0;
    }
}
