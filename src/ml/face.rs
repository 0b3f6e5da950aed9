//! Face landmark detection
//!
//! Runs a 468-point face-mesh model (192x192 NHWC RGB input; outputs a
//! `1404` landmark tensor in input pixels and a single face-presence
//! logit). The crop for the next frame follows the last confident face;
//! without one the central square of the frame is used.

use std::path::Path;

use ndarray::Array4;

use super::{load_session, sigmoid};
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crate::tracking::{FaceBox, FaceDetector, FaceGeometry, HeadPose, Landmark};

/// Model input edge length
pub const FACE_INPUT_SIZE: u32 = 192;

/// Landmarks produced by the face mesh
pub const FACE_LANDMARK_COUNT: usize = 468;

/// Below this presence score the crop is reset to the full frame
const REACQUIRE_BELOW: f32 = 0.5;

// Face-mesh topology
const NOSE_TIP: usize = 1;
const FOREHEAD: usize = 10;
const RIGHT_EYE_OUTER: usize = 33;
const CHIN: usize = 152;
const RIGHT_CHEEK: usize = 234;
const LEFT_EYE_OUTER: usize = 263;
const LEFT_CHEEK: usize = 454;

/// ONNX face-mesh detector
pub struct OnnxFaceDetector {
    session: ort::session::Session,
    roi: Option<FaceBox>,
}

impl OnnxFaceDetector {
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self> {
        Ok(Self::from_session(load_session(path, intra_threads)?))
    }

    pub fn from_session(session: ort::session::Session) -> Self {
        Self { session, roi: None }
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceGeometry>> {
        frame.validate()?;
        let crop = crop_region(self.roi, frame.width, frame.height);
        let size = FACE_INPUT_SIZE as usize;

        let input = frame.sample_rgb(crop, FACE_INPUT_SIZE, FACE_INPUT_SIZE)?;
        let input_array = Array4::from_shape_vec((1, size, size, 3), input)
            .map_err(|e| PipelineError::Model(format!("Failed to create input array: {}", e)))?;
        let input_tensor = ort::value::Tensor::from_array(input_array)
            .map_err(|e| PipelineError::Model(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| PipelineError::Model(format!("Face inference failed: {}", e)))?;

        let mut raw_landmarks = None;
        let mut score = None;
        for output in outputs.iter() {
            let (_shape, data) = output
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Model(format!("Failed to extract output: {}", e)))?;
            if data.len() >= FACE_LANDMARK_COUNT * 3 {
                raw_landmarks = Some(data.to_vec());
            } else if data.len() == 1 {
                score = Some(data[0]);
            }
        }
        drop(outputs);

        let raw = raw_landmarks.ok_or_else(|| PipelineError::Model("face model produced no landmarks".into()))?;
        let logit = score.ok_or_else(|| PipelineError::Model("face model produced no presence score".into()))?;
        let confidence = sigmoid(logit);

        let landmarks = decode_landmarks(&raw, crop, frame.width, frame.height);
        let pose = estimate_pose(&landmarks);
        let geometry = FaceGeometry::new(landmarks, pose, confidence, frame.sequence);

        self.roi = if confidence >= REACQUIRE_BELOW {
            geometry.bounding_box()
        } else {
            None
        };
        Ok(Some(geometry))
    }

    fn name(&self) -> &str {
        "onnx-face-mesh"
    }
}

/// Square crop in frame pixels `(x, y, width, height)` around the previous
/// face, or the central square of the frame
pub(crate) fn crop_region(roi: Option<FaceBox>, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let (w, h) = (width as f32, height as f32);
    let (cx, cy, side) = match roi {
        Some(face) => {
            let (cx, cy) = face.center();
            let side = (face.width() * w).max(face.height() * h) * 1.6;
            (cx * w, cy * h, side)
        }
        None => (w * 0.5, h * 0.5, w.min(h)),
    };
    let side = side.clamp(1.0, w.min(h));

    let x = (cx - side * 0.5).clamp(0.0, w - side);
    let y = (cy - side * 0.5).clamp(0.0, h - side);
    (x as u32, y as u32, side as u32, side as u32)
}

/// Map model-space landmarks back to normalized frame coordinates
pub(crate) fn decode_landmarks(raw: &[f32], crop: (u32, u32, u32, u32), width: u32, height: u32) -> Vec<Landmark> {
    let (cx, cy, cw, ch) = crop;
    let size = FACE_INPUT_SIZE as f32;
    raw.chunks_exact(3)
        .take(FACE_LANDMARK_COUNT)
        .map(|p| {
            let x = (cx as f32 + p[0] / size * cw as f32) / width as f32;
            let y = (cy as f32 + p[1] / size * ch as f32) / height as f32;
            Landmark::new(x, y, p[2] / size)
        })
        .collect()
}

/// Approximate head pose from mesh landmarks
pub fn estimate_pose(landmarks: &[Landmark]) -> HeadPose {
    if landmarks.len() < FACE_LANDMARK_COUNT {
        return HeadPose::default();
    }
    let nose = landmarks[NOSE_TIP];
    let right_eye = landmarks[RIGHT_EYE_OUTER];
    let left_eye = landmarks[LEFT_EYE_OUTER];
    let right_cheek = landmarks[RIGHT_CHEEK];
    let left_cheek = landmarks[LEFT_CHEEK];
    let forehead = landmarks[FOREHEAD];
    let chin = landmarks[CHIN];

    let roll = (left_eye.y - right_eye.y).atan2(left_eye.x - right_eye.x);

    let half_width = ((left_cheek.x - right_cheek.x) * 0.5).abs().max(1e-4);
    let mid_x = (left_cheek.x + right_cheek.x) * 0.5;
    let yaw = ((nose.x - mid_x) / half_width).clamp(-1.0, 1.0).asin();

    let half_height = ((chin.y - forehead.y) * 0.5).abs().max(1e-4);
    let mid_y = (chin.y + forehead.y) * 0.5;
    let pitch = ((nose.y - mid_y) / half_height).clamp(-1.0, 1.0).asin();

    HeadPose { yaw, pitch, roll }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontal_mesh() -> Vec<Landmark> {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.0); FACE_LANDMARK_COUNT];
        landmarks[RIGHT_EYE_OUTER] = Landmark::new(0.4, 0.4, 0.0);
        landmarks[LEFT_EYE_OUTER] = Landmark::new(0.6, 0.4, 0.0);
        landmarks[RIGHT_CHEEK] = Landmark::new(0.35, 0.5, 0.0);
        landmarks[LEFT_CHEEK] = Landmark::new(0.65, 0.5, 0.0);
        landmarks[FOREHEAD] = Landmark::new(0.5, 0.3, 0.0);
        landmarks[CHIN] = Landmark::new(0.5, 0.7, 0.0);
        landmarks[NOSE_TIP] = Landmark::new(0.5, 0.5, 0.0);
        landmarks
    }

    #[test]
    fn test_frontal_pose() {
        let pose = estimate_pose(&frontal_mesh());
        assert!(pose.yaw.abs() < 1e-5);
        assert!(pose.pitch.abs() < 1e-5);
        assert!(pose.roll.abs() < 1e-5);
    }

    #[test]
    fn test_turned_and_tilted_pose() {
        let mut mesh = frontal_mesh();
        mesh[NOSE_TIP].x = 0.6;
        mesh[LEFT_EYE_OUTER].y = 0.5;
        let pose = estimate_pose(&mesh);
        assert!(pose.yaw > 0.5);
        assert!(pose.roll > 0.3);
    }

    #[test]
    fn test_short_mesh_has_default_pose() {
        assert_eq!(estimate_pose(&[Landmark::default(); 3]), HeadPose::default());
    }

    #[test]
    fn test_crop_without_roi_is_central_square() {
        assert_eq!(crop_region(None, 640, 480), (80, 0, 480, 480));
    }

    #[test]
    fn test_crop_follows_face_and_stays_inside() {
        let face = FaceBox {
            x0: 0.0,
            y0: 0.0,
            x1: 0.2,
            y1: 0.2,
        };
        let (x, y, w, h) = crop_region(Some(face), 100, 100);
        assert_eq!((x, y), (0, 0));
        assert_eq!(w, h);
        assert_eq!(w, 32);
    }

    #[test]
    fn test_decode_landmarks_into_frame_space() {
        // Centre and corner of a crop covering the right half of a 200x100 frame
        let raw = [96.0, 96.0, 19.2, 192.0, 0.0, 0.0];
        let landmarks = decode_landmarks(&raw, (100, 0, 100, 100), 200, 100);
        assert_eq!(landmarks.len(), 2);
        assert!((landmarks[0].x - 0.75).abs() < 1e-6);
        assert!((landmarks[0].y - 0.5).abs() < 1e-6);
        assert!((landmarks[0].z - 0.1).abs() < 1e-6);
        assert!((landmarks[1].x - 1.0).abs() < 1e-6);
        assert_eq!(landmarks[1].y, 0.0);
    }
}
