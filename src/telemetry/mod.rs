//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing and per-stage latency metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogGuard};
pub use metrics::{LatencyStats, LatencyWindow, Stage, StageTimings};
