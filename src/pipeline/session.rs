//! Live processing session
//!
//! Thread layout:
//!
//! ```text
//! capture ──► [ingress, drop-oldest] ──► tracking ──► segmentation ──► render-0..N ──► emitter
//! ```
//!
//! Tracking of frame N+1 overlaps segmentation of frame N, and render
//! workers run in parallel. Every frame gets a contiguous ticket when the
//! tracking thread dequeues it; the emitter reorders by ticket, so output
//! order always matches capture order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::diagnostics::{DiagnosticsSink, FrameDiagnostics};
use super::stages::{Renderer, Work};
use super::ProcessedFrame;
use crate::color::{CacheStats, ColorCache, ColorSpec, ColorTransform};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{DepthHint, Frame, FrameBufferPool};
use crate::quality::{QualityController, QualityTier};
use crate::segmentation::{HairSegmenter, SegmentationModel};
use crate::settings::{Look, ProcessingSettings};
use crate::tracking::{FaceDetector, FaceTracker};

/// Shared stop flag for every thread of a session
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A frame as delivered by the camera, with optional depth
#[derive(Debug)]
pub struct CapturedFrame {
    pub frame: Frame,
    pub depth: Option<DepthHint>,
}

impl CapturedFrame {
    pub fn new(frame: Frame) -> Self {
        Self { frame, depth: None }
    }

    pub fn with_depth(mut self, depth: DepthHint) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// Camera (or any other producer of frames)
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    ///
    /// `Ok(None)` ends the stream. A `Capture` error is fatal to the
    /// session; any other error only skips the frame.
    fn next_frame(&mut self, pool: &FrameBufferPool) -> Result<Option<CapturedFrame>>;

    /// Name for logging
    fn name(&self) -> &str {
        "frame-source"
    }
}

/// Bounded queue whose producers never block: when full, the oldest entry
/// is discarded to make room
struct DropOldest<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for DropOldest<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<T> DropOldest<T> {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn push(&self, item: T) {
        let mut item = item;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    item = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }

    fn drain(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// State read by the caller while threads write it
struct Shared {
    latest: Mutex<Option<Arc<ProcessedFrame>>>,
    quality: Mutex<QualityController>,
    fatal: Mutex<Option<PipelineError>>,
    cache: Option<Arc<ColorCache>>,
}

/// Running pipeline over a live frame stream
pub struct Session {
    ingress: Option<DropOldest<CapturedFrame>>,
    ingress_dropped: Arc<AtomicU64>,
    look: watch::Sender<Arc<Look>>,
    output: Receiver<Arc<ProcessedFrame>>,
    shared: Arc<Shared>,
    pool: FrameBufferPool,
    cancel: CancellationToken,
    capture: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Spawn the pipeline threads. Frames come from `submit` or from a
    /// source attached with `attach_source`.
    pub fn start(
        config: &PipelineConfig,
        pool: FrameBufferPool,
        detector: Box<dyn FaceDetector>,
        model: Box<dyn SegmentationModel>,
        sinks: Vec<Box<dyn DiagnosticsSink>>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let cache = (config.cache.capacity > 0).then(|| Arc::new(ColorCache::new(config.cache.capacity)));
        let shared = Arc::new(Shared {
            latest: Mutex::new(None),
            quality: Mutex::new(QualityController::new(config.quality.clone(), config.frame_budget())),
            fatal: Mutex::new(None),
            cache: cache.clone(),
        });

        let ingress = DropOldest::<CapturedFrame>::new(config.ingress_capacity);
        let outputs = DropOldest::<Arc<ProcessedFrame>>::new(config.output_capacity);
        let (look_tx, look_rx) = watch::channel(Arc::new(Look::default()));
        let (segment_tx, segment_rx) = crossbeam_channel::bounded::<Work>(1);
        let workers = config.worker_threads.max(1);
        let (render_tx, render_rx) = crossbeam_channel::bounded::<Work>(workers);
        let (emit_tx, emit_rx) = crossbeam_channel::bounded::<(u64, ProcessedFrame)>(workers * 2);

        let mut session = Self {
            ingress: Some(ingress.clone()),
            ingress_dropped: ingress.dropped.clone(),
            look: look_tx,
            output: outputs.receiver(),
            shared: shared.clone(),
            pool: pool.clone(),
            cancel: cancel.clone(),
            capture: None,
            workers: Vec::new(),
        };

        let tracker = FaceTracker::new(detector, config.tracker.clone());
        let thread = {
            let rx = ingress.receiver();
            let shared = shared.clone();
            let cancel = cancel.clone();
            spawn("tracking", move || tracking_loop(rx, segment_tx, look_rx, tracker, shared, cancel))?
        };
        session.workers.push(thread);

        let segmenter = HairSegmenter::new(model, config.segmentation.clone());
        let thread = {
            let cancel = cancel.clone();
            spawn("segmentation", move || segmentation_loop(segment_rx, render_tx, segmenter, cancel))?
        };
        session.workers.push(thread);

        let colors = ColorTransform::new(cache);
        for index in 0..workers {
            let renderer = Renderer::new(pool.clone(), colors.clone(), config);
            let rx = render_rx.clone();
            let tx = emit_tx.clone();
            let cancel = cancel.clone();
            let thread = spawn(&format!("render-{}", index), move || render_loop(rx, tx, renderer, cancel))?;
            session.workers.push(thread);
        }
        drop(render_rx);
        drop(emit_tx);

        let thread = {
            let emitter = Emitter {
                shared,
                outputs,
                sinks,
                pool,
                ingress_dropped: ingress.dropped.clone(),
                cancel,
            };
            spawn("emitter", move || emitter.run(emit_rx))?
        };
        session.workers.push(thread);

        tracing::info!(
            target: "hair_recolor::session",
            workers,
            target_fps = config.target_fps,
            "Session started"
        );
        Ok(session)
    }

    /// Run `source` on its own capture thread
    pub fn attach_source(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        let ingress = match &self.ingress {
            Some(ingress) if !self.cancel.is_cancelled() => ingress.clone(),
            _ => return Err(PipelineError::Cancelled),
        };
        if self.capture.is_some() {
            return Err(PipelineError::Capture("a frame source is already attached".into()));
        }

        let pool = self.pool.clone();
        let shared = self.shared.clone();
        let cancel = self.cancel.clone();
        self.capture = Some(spawn("capture", move || {
            capture_loop(source, ingress, pool, shared, cancel)
        })?);
        Ok(())
    }

    /// Queue a frame without blocking; the oldest queued frame is dropped
    /// when the pipeline is behind
    pub fn submit(&self, frame: Frame, depth: Option<DepthHint>) -> Result<()> {
        match &self.ingress {
            Some(ingress) if !self.cancel.is_cancelled() => {
                ingress.push(CapturedFrame { frame, depth });
                Ok(())
            }
            _ => Err(PipelineError::Cancelled),
        }
    }

    /// Select a color; takes effect at the next frame boundary
    pub fn apply_color(&self, color: ColorSpec, settings: ProcessingSettings) {
        self.look.send_replace(Arc::new(Look::new(color, settings)));
    }

    /// Stop recoloring; frames pass through
    pub fn clear_color(&self) {
        self.look.send_replace(Arc::new(Look::default()));
    }

    /// Look applied to newly dequeued frames
    pub fn look(&self) -> Arc<Look> {
        self.look.borrow().clone()
    }

    /// Most recently emitted frame (for still capture)
    pub fn latest_processed(&self) -> Option<Arc<ProcessedFrame>> {
        self.shared.latest.lock().clone()
    }

    /// Stream of emitted frames in capture order. The stream is bounded:
    /// a consumer that falls behind loses the oldest frames.
    pub fn output(&self) -> Receiver<Arc<ProcessedFrame>> {
        self.output.clone()
    }

    pub fn quality_tier(&self) -> QualityTier {
        self.shared.quality.lock().tier()
    }

    /// Error that ended the session, if any
    pub fn fatal_error(&self) -> Option<PipelineError> {
        self.shared.fatal.lock().clone()
    }

    /// Frames discarded at ingress
    pub fn dropped_frames(&self) -> u64 {
        self.ingress_dropped.load(Ordering::Relaxed)
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.shared.cache.as_ref().map(|cache| cache.stats())
    }

    pub fn pool(&self) -> &FrameBufferPool {
        &self.pool
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.ingress.is_some() && !self.cancel.is_cancelled()
    }

    /// Cancel, drain and join every thread. Nothing is emitted afterwards.
    pub fn stop(&mut self) {
        if self.ingress.is_none() {
            return;
        }
        self.cancel.cancel();

        if let Some(handle) = self.capture.take() {
            let _ = handle.join();
        }
        if let Some(ingress) = self.ingress.take() {
            ingress.drain();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        // Undelivered frames hold pool buffers; only `latest` is kept
        while self.output.try_recv().is_ok() {}

        if let Some(cache) = &self.shared.cache {
            cache.clear();
        }
        tracing::info!(
            target: "hair_recolor::session",
            dropped = self.dropped_frames(),
            "Session stopped"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn<F>(name: &str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| PipelineError::ResourceExhausted(format!("failed to spawn {} thread: {}", name, e)))
}

fn capture_loop(
    mut source: Box<dyn FrameSource>,
    ingress: DropOldest<CapturedFrame>,
    pool: FrameBufferPool,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    tracing::info!(target: "hair_recolor::session", source = source.name(), "Capture thread started");

    while !cancel.is_cancelled() {
        match source.next_frame(&pool) {
            Ok(Some(captured)) => ingress.push(captured),
            Ok(None) => {
                tracing::info!(target: "hair_recolor::session", "Frame source finished");
                break;
            }
            Err(e) if e.is_recoverable() => {
                tracing::debug!(target: "hair_recolor::session", "Skipping frame: {}", e);
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(e) => {
                tracing::error!(target: "hair_recolor::session", "Capture failed, stopping session: {}", e);
                *shared.fatal.lock() = Some(e);
                cancel.cancel();
                break;
            }
        }
    }

    tracing::info!(target: "hair_recolor::session", "Capture thread stopped");
}

fn tracking_loop(
    ingress: Receiver<CapturedFrame>,
    next: Sender<Work>,
    look: watch::Receiver<Arc<Look>>,
    mut tracker: FaceTracker,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let mut ticket = 0u64;
    for captured in ingress.iter() {
        if cancel.is_cancelled() {
            continue;
        }
        let look = look.borrow().clone();
        let plan = shared.quality.lock().plan(look.settings.quality);

        let mut work = Work::new(captured.frame, captured.depth, ticket, look, plan);
        ticket += 1;
        work.track(&mut tracker);
        if next.send(work).is_err() {
            break;
        }
    }
    tracing::debug!(target: "hair_recolor::session", "Tracking thread stopped");
}

fn segmentation_loop(rx: Receiver<Work>, next: Sender<Work>, mut segmenter: HairSegmenter, cancel: CancellationToken) {
    for mut work in rx.iter() {
        if cancel.is_cancelled() {
            continue;
        }
        work.segment(&mut segmenter);
        if next.send(work).is_err() {
            break;
        }
    }
    tracing::debug!(target: "hair_recolor::session", "Segmentation thread stopped");
}

fn render_loop(rx: Receiver<Work>, next: Sender<(u64, ProcessedFrame)>, mut renderer: Renderer, cancel: CancellationToken) {
    for work in rx.iter() {
        if cancel.is_cancelled() {
            continue;
        }
        let ticket = work.ticket;
        let processed = renderer.render(work);
        if next.send((ticket, processed)).is_err() {
            break;
        }
    }
}

/// Restores capture order and publishes frames
struct Emitter {
    shared: Arc<Shared>,
    outputs: DropOldest<Arc<ProcessedFrame>>,
    sinks: Vec<Box<dyn DiagnosticsSink>>,
    pool: FrameBufferPool,
    ingress_dropped: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Emitter {
    fn run(mut self, rx: Receiver<(u64, ProcessedFrame)>) {
        let mut pending: BTreeMap<u64, ProcessedFrame> = BTreeMap::new();
        let mut next_ticket = 0u64;

        for (ticket, processed) in rx.iter() {
            if self.cancel.is_cancelled() {
                pending.clear();
                continue;
            }
            pending.insert(ticket, processed);

            while let Some(processed) = pending.remove(&next_ticket) {
                next_ticket += 1;
                if self.cancel.is_cancelled() {
                    break;
                }
                self.emit(processed);
            }
        }
        tracing::debug!(target: "hair_recolor::session", "Emitter thread stopped");
    }

    fn emit(&mut self, mut processed: ProcessedFrame) {
        if let Some(frame) = &processed.output {
            processed.timings.end_to_end = frame.timestamp.elapsed();
        }
        self.shared.quality.lock().observe(processed.timings.end_to_end);

        let processed = Arc::new(processed);
        if !self.sinks.is_empty() {
            let diagnostics = FrameDiagnostics::from_frame(
                &processed,
                self.ingress_dropped.load(Ordering::Relaxed),
                self.pool.stats(),
                self.shared.cache.as_ref().map(|cache| cache.stats()),
            );
            for sink in self.sinks.iter_mut() {
                if let Err(e) = sink.record(&diagnostics) {
                    tracing::warn!(target: "hair_recolor::session", "Diagnostics sink error: {}", e);
                }
            }
        }

        *self.shared.latest.lock() = Some(processed.clone());
        self.outputs.push(processed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{palette, ColorCategory};
    use crate::pipeline::diagnostics::{ChannelSink, SinkError};
    use crate::pipeline::tests::brown_frame;
    use crate::segmentation::tests::ConstantModel;
    use crate::tracking::tests::FixedDetector;
    use crossbeam_channel::RecvTimeoutError;
    use std::collections::VecDeque;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.worker_threads = 3;
        config.ingress_capacity = 8;
        config.output_capacity = 64;
        config
    }

    fn start(config: &PipelineConfig, pool: &FrameBufferPool, sinks: Vec<Box<dyn DiagnosticsSink>>) -> Session {
        Session::start(
            config,
            pool.clone(),
            Box::new(FixedDetector(0.9)),
            Box::new(ConstantModel(1.0)),
            sinks,
        )
        .unwrap()
    }

    fn red() -> ColorSpec {
        palette::preset("natural-brown")
            .unwrap()
            .retarget("red", ColorCategory::Fashion, 0.0)
            .unwrap()
    }

    fn collect(rx: &Receiver<Arc<ProcessedFrame>>, count: usize) -> Vec<Arc<ProcessedFrame>> {
        let mut frames = Vec::new();
        while frames.len() < count {
            match rx.recv_timeout(WAIT) {
                Ok(frame) => frames.push(frame),
                Err(_) => break,
            }
        }
        frames
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    struct VecSource(VecDeque<(u32, u64)>);

    impl FrameSource for VecSource {
        fn next_frame(&mut self, pool: &FrameBufferPool) -> Result<Option<CapturedFrame>> {
            Ok(self
                .0
                .pop_front()
                .map(|(size, seq)| CapturedFrame::new(brown_frame(pool, size, size, seq))))
        }
    }

    struct UnpluggedSource;

    impl FrameSource for UnpluggedSource {
        fn next_frame(&mut self, _pool: &FrameBufferPool) -> Result<Option<CapturedFrame>> {
            Err(PipelineError::Capture("device unplugged".into()))
        }
    }

    struct BrokenSink;

    impl DiagnosticsSink for BrokenSink {
        fn record(&mut self, _diagnostics: &FrameDiagnostics) -> std::result::Result<(), SinkError> {
            Err("sink offline".into())
        }
    }

    #[test]
    fn test_drop_oldest_queue() {
        let queue = DropOldest::new(2);
        queue.push(1u32);
        queue.push(2);
        queue.push(3);
        let rx = queue.receiver();
        assert_eq!(rx.try_recv(), Ok(2));
        assert_eq!(rx.try_recv(), Ok(3));
        assert_eq!(queue.dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_dropped_frame_returns_buffer() {
        let pool = FrameBufferPool::for_resolution(4, 4, 2);
        let queue = DropOldest::new(1);
        queue.push(brown_frame(&pool, 4, 4, 0));
        queue.push(brown_frame(&pool, 4, 4, 1));
        assert_eq!(pool.stats().outstanding, 1);
        assert_eq!(queue.receiver().try_recv().unwrap().sequence, 1);
    }

    #[test]
    fn test_output_in_capture_order() {
        let config = config();
        let pool = FrameBufferPool::for_resolution(48, 48, 96);
        let session = start(&config, &pool, Vec::new());
        session.apply_color(red(), ProcessingSettings::default());
        let rx = session.output();

        // Alternate large and small frames so render workers finish out of order
        for seq in 0..30u64 {
            let size = if seq % 2 == 0 { 48 } else { 6 };
            session.submit(brown_frame(&pool, size, size, seq), None).unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }

        let frames = collect(&rx, 30);
        assert!(!frames.is_empty());
        assert!(frames.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(frames.len() as u64 + session.dropped_frames(), 30);
        assert!(frames.iter().all(|f| f.is_ok() && !f.passthrough));
    }

    #[test]
    fn test_apply_color_at_frame_boundary() {
        let config = config();
        let pool = FrameBufferPool::for_resolution(16, 16, 64);
        let session = start(&config, &pool, Vec::new());
        let rx = session.output();

        session.submit(brown_frame(&pool, 16, 16, 0), None).unwrap();
        let before = collect(&rx, 1);
        assert!(before[0].passthrough);

        session.apply_color(red(), ProcessingSettings::default());
        assert!(session.look().color.is_some());
        session.submit(brown_frame(&pool, 16, 16, 1), None).unwrap();
        let after = collect(&rx, 1);
        assert_eq!(after[0].sequence, 1);
        assert!(!after[0].passthrough);

        let latest = session.latest_processed().unwrap();
        assert_eq!(latest.sequence, 1);
    }

    #[test]
    fn test_stop_cancels_everything() {
        let config = config();
        let pool = FrameBufferPool::for_resolution(32, 32, 64);
        let mut session = start(&config, &pool, Vec::new());
        session.apply_color(red(), ProcessingSettings::default());
        let rx = session.output();

        for seq in 0..10 {
            session.submit(brown_frame(&pool, 32, 32, seq), None).unwrap();
        }
        session.stop();
        assert!(!session.is_running());
        assert_eq!(
            session.submit(brown_frame(&pool, 32, 32, 10), None),
            Err(PipelineError::Cancelled)
        );

        // Undelivered frames are released and the stream ends
        loop {
            match rx.recv_timeout(WAIT) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => panic!("output stream still open after stop"),
            }
        }

        drop(session);
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_stopped_session_releases_undelivered_frames() {
        let config = config();
        let pool = FrameBufferPool::for_resolution(32, 32, 64);
        let mut session = start(&config, &pool, Vec::new());
        session.apply_color(red(), ProcessingSettings::default());

        for seq in 0..6 {
            session.submit(brown_frame(&pool, 32, 32, seq), None).unwrap();
        }
        assert!(wait_until(|| session.latest_processed().is_some()));
        session.stop();

        // Still alive: only the latest output may hold a buffer
        assert!(session.latest_processed().is_some());
        assert!(pool.stats().outstanding <= 1, "{:?}", pool.stats());
    }

    #[test]
    fn test_source_runs_to_completion() {
        let config = config();
        let pool = FrameBufferPool::for_resolution(16, 16, 64);
        let mut session = start(&config, &pool, Vec::new());
        session.apply_color(red(), ProcessingSettings::default());
        let rx = session.output();

        let frames: VecDeque<(u32, u64)> = (0..5).map(|seq| (16, seq)).collect();
        session.attach_source(Box::new(VecSource(frames))).unwrap();
        assert!(session.attach_source(Box::new(UnpluggedSource)).is_err());

        let out = collect(&rx, 5);
        let sequences: Vec<u64> = out.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        assert!(session.fatal_error().is_none());
    }

    #[test]
    fn test_capture_error_is_fatal() {
        let config = config();
        let pool = FrameBufferPool::for_resolution(16, 16, 64);
        let mut session = start(&config, &pool, Vec::new());
        session.attach_source(Box::new(UnpluggedSource)).unwrap();

        assert!(wait_until(|| session.fatal_error().is_some()));
        assert!(matches!(session.fatal_error(), Some(PipelineError::Capture(_))));
        assert!(!session.is_running());
        assert!(session.submit(brown_frame(&pool, 16, 16, 0), None).is_err());
    }

    #[test]
    fn test_diagnostics_sinks() {
        let config = config();
        let pool = FrameBufferPool::for_resolution(16, 16, 64);
        let (tx, diagnostics) = crossbeam_channel::bounded(64);
        let sinks: Vec<Box<dyn DiagnosticsSink>> = vec![Box::new(BrokenSink), Box::new(ChannelSink::new(tx))];
        let session = start(&config, &pool, sinks);
        session.apply_color(red(), ProcessingSettings::default());
        let rx = session.output();

        for seq in 0..5 {
            session.submit(brown_frame(&pool, 16, 16, seq), None).unwrap();
        }
        let out = collect(&rx, 5);
        assert_eq!(out.len(), 5);

        let records: Vec<FrameDiagnostics> = (0..5).filter_map(|_| diagnostics.recv_timeout(WAIT).ok()).collect();
        let sequences: Vec<u64> = records.iter().map(|d| d.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        assert!(records.iter().all(|d| d.error.is_none() && d.cache.is_some()));
        assert_eq!(session.quality_tier(), QualityTier::Full);
    }
}
