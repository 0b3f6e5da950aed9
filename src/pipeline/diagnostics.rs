//! Per-frame diagnostics
//!
//! The session hands a `FrameDiagnostics` record to every registered sink
//! after each emitted frame. Sinks must not block; a failing sink is logged
//! and otherwise ignored.

use crossbeam_channel::{Sender, TrySendError};

use super::{Guidance, ProcessedFrame};
use crate::color::CacheStats;
use crate::frame::PoolStats;
use crate::quality::QualityTier;
use crate::telemetry::{LatencyWindow, StageTimings};

/// What happened to one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDiagnostics {
    pub sequence: u64,
    pub timings: StageTimings,
    /// `PipelineError::kind()` of the frame's error, if any
    pub error: Option<&'static str>,
    pub passthrough: bool,
    pub guidance: Option<Guidance>,
    pub tier: QualityTier,
    pub face_confidence: Option<f32>,
    /// Frames discarded at ingress since the session started
    pub dropped_frames: u64,
    pub pool: PoolStats,
    pub cache: Option<CacheStats>,
}

impl FrameDiagnostics {
    pub fn from_frame(frame: &ProcessedFrame, dropped_frames: u64, pool: PoolStats, cache: Option<CacheStats>) -> Self {
        Self {
            sequence: frame.sequence,
            timings: frame.timings,
            error: frame.error().map(|e| e.kind()),
            passthrough: frame.passthrough,
            guidance: frame.guidance,
            tier: frame.tier,
            face_confidence: frame.face_confidence,
            dropped_frames,
            pool,
            cache,
        }
    }
}

/// Error type returned by sinks
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Receiver of per-frame diagnostics
pub trait DiagnosticsSink: Send {
    fn record(&mut self, diagnostics: &FrameDiagnostics) -> Result<(), SinkError>;
}

/// Forwards diagnostics over a channel without blocking
pub struct ChannelSink {
    sender: Sender<FrameDiagnostics>,
}

impl ChannelSink {
    pub fn new(sender: Sender<FrameDiagnostics>) -> Self {
        Self { sender }
    }
}

impl DiagnosticsSink for ChannelSink {
    fn record(&mut self, diagnostics: &FrameDiagnostics) -> Result<(), SinkError> {
        match self.sender.try_send(diagnostics.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err("diagnostics channel full".into()),
            Err(TrySendError::Disconnected(_)) => Err("diagnostics channel closed".into()),
        }
    }
}

/// Logs failures as they happen and a latency summary every `interval` frames
pub struct LogSink {
    window: LatencyWindow,
    interval: u64,
    seen: u64,
}

impl LogSink {
    pub fn new(interval: u64) -> Self {
        let interval = interval.max(1);
        Self {
            window: LatencyWindow::new(interval as usize),
            interval,
            seen: 0,
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(120)
    }
}

impl DiagnosticsSink for LogSink {
    fn record(&mut self, d: &FrameDiagnostics) -> Result<(), SinkError> {
        self.window.push(d.timings.end_to_end);
        self.seen += 1;

        if let Some(error) = d.error {
            tracing::debug!(
                target: "hair_recolor::diagnostics",
                sequence = d.sequence,
                error,
                passthrough = d.passthrough,
                "Frame error"
            );
        }

        if self.seen % self.interval == 0 {
            let stats = self.window.stats();
            tracing::info!(
                target: "hair_recolor::diagnostics",
                frames = self.seen,
                tier = %d.tier,
                avg_ms = format!("{:.2}", stats.avg_ms),
                p95_ms = format!("{:.2}", stats.p95_ms),
                max_ms = format!("{:.2}", stats.max_ms),
                dropped = d.dropped_frames,
                pool_outstanding = d.pool.outstanding,
                "Pipeline latency"
            );
        }
        Ok(())
    }
}
