//! Camera capture
//!
//! `CameraSource` opens a camera with nokhwa on its own thread (the camera
//! handle is not `Send` on every platform) and hands decoded RGBA frames to
//! the session through a small channel. Frames the session has not picked
//! up yet are replaced rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use crate::error::{PipelineError, Result};
use crate::frame::{Frame, FrameBufferPool, PixelFormat};
use crate::pipeline::{CapturedFrame, FrameSource};

/// Consecutive read failures before the camera is considered gone
const MAX_READ_FAILURES: u32 = 50;

/// Longest wait for a frame before the camera is considered stalled
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
}

/// List available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(cameras) => cameras
            .iter()
            .enumerate()
            .map(|(idx, info)| CameraInfo {
                index: idx as u32,
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::warn!(target: "hair_recolor::camera", "Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

struct RawFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

type CameraMessage = std::result::Result<RawFrame, String>;

/// Live camera as a `FrameSource`
pub struct CameraSource {
    frames: Receiver<CameraMessage>,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    resolution: (u32, u32),
    name: String,
    sequence: u64,
}

impl CameraSource {
    /// Open camera `index` and wait until its stream is running
    pub fn open(index: u32) -> Result<Self> {
        let (frame_tx, frames) = crossbeam_channel::bounded::<CameraMessage>(2);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<(u32, u32, String), String>>(1);
        let running = Arc::new(AtomicBool::new(true));

        let running_clone = running.clone();
        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_thread(index, frame_tx, ready_tx, running_clone))
            .map_err(|e| PipelineError::Capture(format!("Failed to spawn capture thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| PipelineError::Capture("camera thread exited during startup".into()))
            .and_then(|ready| ready.map_err(PipelineError::Capture));
        let (width, height, name) = match ready {
            Ok(opened) => opened,
            Err(e) => {
                running.store(false, Ordering::Release);
                let _ = thread_handle.join();
                return Err(e);
            }
        };

        Ok(Self {
            frames,
            running,
            thread_handle: Some(thread_handle),
            resolution: (width, height),
            name,
            sequence: 0,
        })
    }

    /// Negotiated stream resolution
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self, pool: &FrameBufferPool) -> Result<Option<CapturedFrame>> {
        match self.frames.recv_timeout(FRAME_TIMEOUT) {
            Ok(Ok(raw)) => {
                let data = pool.acquire_copy(&raw.data)?;
                let frame = Frame::new(data, raw.width, raw.height, PixelFormat::Rgba8, self.sequence);
                self.sequence += 1;
                Ok(Some(CapturedFrame::new(frame)))
            }
            Ok(Err(message)) => Err(PipelineError::Capture(message)),
            Err(RecvTimeoutError::Timeout) => Err(PipelineError::Capture(format!(
                "no frame from camera within {:?}",
                FRAME_TIMEOUT
            ))),
            // Capture thread finished
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_camera(index: u32) -> std::result::Result<Camera, String> {
    let camera_index = CameraIndex::Index(index);
    let attempts = [
        RequestedFormatType::HighestResolution(Resolution::new(1280, 720)),
        RequestedFormatType::HighestResolution(Resolution::new(640, 480)),
        RequestedFormatType::None,
    ];

    let mut last_error = String::from("no format attempted");
    for attempt in attempts {
        let label = format!("{:?}", attempt);
        let requested = RequestedFormat::new::<RgbAFormat>(attempt);
        match Camera::new(camera_index.clone(), requested) {
            Ok(camera) => return Ok(camera),
            Err(e) => {
                tracing::warn!(target: "hair_recolor::camera", "Failed to open camera with {}: {:?}", label, e);
                last_error = format!("{:?}", e);
            }
        }
    }
    Err(format!("Failed to open camera {}: {}", index, last_error))
}

fn capture_thread(
    index: u32,
    frames: Sender<CameraMessage>,
    ready: Sender<std::result::Result<(u32, u32, String), String>>,
    running: Arc<AtomicBool>,
) {
    let mut camera = match open_camera(index) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(format!("Failed to open camera stream: {:?}", e)));
        return;
    }

    let resolution = camera.resolution();
    let name = camera.info().human_name().to_string();
    tracing::info!(
        target: "hair_recolor::camera",
        "Camera opened: {} ({}x{})",
        name,
        resolution.width(),
        resolution.height()
    );
    let _ = ready.send(Ok((resolution.width(), resolution.height(), name)));

    let mut failures = 0u32;
    while running.load(Ordering::Acquire) {
        let buffer = match camera.frame() {
            Ok(buffer) => {
                failures = 0;
                buffer
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_READ_FAILURES {
                    let _ = frames.try_send(Err(format!("Camera stopped delivering frames: {:?}", e)));
                    break;
                }
                tracing::warn!(target: "hair_recolor::camera", "Failed to capture frame: {:?}", e);
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        let image = match buffer.decode_image::<RgbAFormat>() {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(target: "hair_recolor::camera", "Failed to decode frame: {:?}", e);
                continue;
            }
        };
        let raw = RawFrame {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
        };
        match frames.try_send(Ok(raw)) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!(target: "hair_recolor::camera", "Failed to stop camera stream: {:?}", e);
    }
    tracing::info!(target: "hair_recolor::camera", "Camera capture thread stopped");
}
