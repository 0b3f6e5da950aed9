//! Per-frame timing and latency statistics

use std::collections::VecDeque;
use std::time::Duration;

/// Pipeline stages that are timed individually
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Tracking,
    Segmentation,
    ColorTransform,
    Composite,
    PostProcess,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Tracking => "tracking",
            Stage::Segmentation => "segmentation",
            Stage::ColorTransform => "color_transform",
            Stage::Composite => "composite",
            Stage::PostProcess => "post_process",
        }
    }

    pub fn all() -> &'static [Stage] {
        &[
            Stage::Tracking,
            Stage::Segmentation,
            Stage::ColorTransform,
            Stage::Composite,
            Stage::PostProcess,
        ]
    }
}

/// Time spent in each stage for one frame. A stage that did not run is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub tracking: Option<Duration>,
    pub segmentation: Option<Duration>,
    pub color_transform: Option<Duration>,
    pub composite: Option<Duration>,
    pub post_process: Option<Duration>,
    /// Capture to emission
    pub end_to_end: Duration,
}

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let slot = match stage {
            Stage::Tracking => &mut self.tracking,
            Stage::Segmentation => &mut self.segmentation,
            Stage::ColorTransform => &mut self.color_transform,
            Stage::Composite => &mut self.composite,
            Stage::PostProcess => &mut self.post_process,
        };
        *slot = Some(elapsed);
    }

    pub fn get(&self, stage: Stage) -> Option<Duration> {
        match stage {
            Stage::Tracking => self.tracking,
            Stage::Segmentation => self.segmentation,
            Stage::ColorTransform => self.color_transform,
            Stage::Composite => self.composite,
            Stage::PostProcess => self.post_process,
        }
    }

    /// Sum of the stages that ran
    pub fn processing_total(&self) -> Duration {
        Stage::all().iter().filter_map(|s| self.get(*s)).sum()
    }
}

/// Summary of a latency window
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    /// Average latency in milliseconds
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// 50th percentile (median)
    pub p50_ms: f64,
    pub p95_ms: f64,
    /// Number of samples in the statistics
    pub sample_count: usize,
}

/// Trailing window of latency samples
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl LatencyWindow {
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Add a sample, discarding the oldest when full
    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the samples, zero when empty
    pub fn mean(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    pub fn stats(&self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats::default();
        }

        let mut times: Vec<f64> = self
            .samples
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let sum: f64 = times.iter().sum();
        LatencyStats {
            avg_ms: sum / times.len() as f64,
            min_ms: times.first().copied().unwrap_or(0.0),
            max_ms: times.last().copied().unwrap_or(0.0),
            p50_ms: percentile(&times, 0.50),
            p95_ms: percentile(&times, 0.95),
            sample_count: times.len(),
        }
    }
}

/// Calculate percentile from sorted array
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx]
}
