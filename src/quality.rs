//! Adaptive quality control
//!
//! Watches end-to-end latency against the frame budget and moves between
//! tiers. A tier decides the segmentation downsample factor, how often the
//! mask is recomputed, and whether post-processing runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::telemetry::LatencyWindow;

/// Processing fidelity, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Full,
    Reduced,
    Minimal,
}

impl QualityTier {
    pub fn name(&self) -> &'static str {
        match self {
            QualityTier::Full => "full",
            QualityTier::Reduced => "reduced",
            QualityTier::Minimal => "minimal",
        }
    }

    pub fn all() -> &'static [QualityTier] {
        &[QualityTier::Full, QualityTier::Reduced, QualityTier::Minimal]
    }

    /// Next tier down, if any
    pub fn lower(self) -> Option<QualityTier> {
        match self {
            QualityTier::Full => Some(QualityTier::Reduced),
            QualityTier::Reduced => Some(QualityTier::Minimal),
            QualityTier::Minimal => None,
        }
    }

    /// Next tier up, if any
    pub fn higher(self) -> Option<QualityTier> {
        match self {
            QualityTier::Full => None,
            QualityTier::Reduced => Some(QualityTier::Full),
            QualityTier::Minimal => Some(QualityTier::Reduced),
        }
    }

    /// The lower-fidelity of two tiers
    pub fn min_fidelity(self, other: QualityTier) -> QualityTier {
        self.max(other)
    }

    /// Work plan for this tier
    pub fn plan(self) -> StagePlan {
        match self {
            QualityTier::Full => StagePlan {
                tier: self,
                segmentation_scale: 1,
                segmentation_interval: 1,
                run_post_process: true,
            },
            QualityTier::Reduced => StagePlan {
                tier: self,
                segmentation_scale: 2,
                segmentation_interval: 2,
                run_post_process: true,
            },
            QualityTier::Minimal => StagePlan {
                tier: self,
                segmentation_scale: 4,
                segmentation_interval: 4,
                run_post_process: false,
            },
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What the pipeline does for one frame at a given tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub tier: QualityTier,
    /// Integer downsample factor for segmentation
    pub segmentation_scale: u32,
    /// Segment every Nth frame; frames in between reuse the prior mask
    pub segmentation_interval: u64,
    pub run_post_process: bool,
}

impl StagePlan {
    /// Whether the mask must be recomputed for pipeline ticket `ticket`
    pub fn recompute_segmentation(&self, ticket: u64) -> bool {
        self.segmentation_interval <= 1 || ticket % self.segmentation_interval == 0
    }
}

/// Latency-driven tier selection with hysteresis
#[derive(Debug)]
pub struct QualityController {
    config: QualityConfig,
    budget: Duration,
    tier: QualityTier,
    window: LatencyWindow,
    over_budget: u32,
    under_budget: u32,
    transitions: u64,
}

impl QualityController {
    pub fn new(config: QualityConfig, budget: Duration) -> Self {
        let window = LatencyWindow::new(config.window);
        Self {
            config,
            budget,
            tier: QualityTier::Full,
            window,
            over_budget: 0,
            under_budget: 0,
            transitions: 0,
        }
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Number of tier changes so far
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Plan for the current tier, further limited by a pinned tier
    pub fn plan(&self, pinned: QualityTier) -> StagePlan {
        self.tier.min_fidelity(pinned).plan()
    }

    /// Record one end-to-end latency; returns the new tier on a transition
    pub fn observe(&mut self, latency: Duration) -> Option<QualityTier> {
        self.window.push(latency);
        let mean = self.window.mean();

        if mean > self.budget {
            self.over_budget += 1;
            self.under_budget = 0;
        } else if mean.as_secs_f64() < self.budget.as_secs_f64() * self.config.promote_headroom as f64 {
            self.under_budget += 1;
            self.over_budget = 0;
        } else {
            self.over_budget = 0;
            self.under_budget = 0;
        }

        let next = if self.over_budget >= self.config.demote_after {
            self.tier.lower()
        } else if self.under_budget >= self.config.promote_after {
            self.tier.higher()
        } else {
            None
        };

        match next {
            Some(tier) => {
                tracing::info!(
                    target: "hair_recolor::quality",
                    from = %self.tier,
                    to = %tier,
                    mean_ms = mean.as_secs_f64() * 1000.0,
                    budget_ms = self.budget.as_secs_f64() * 1000.0,
                    "Quality tier changed"
                );
                self.tier = tier;
                self.transitions += 1;
                self.reset_window();
                Some(tier)
            }
            None => {
                // Saturated at the top or bottom tier
                if self.over_budget >= self.config.demote_after || self.under_budget >= self.config.promote_after {
                    self.over_budget = 0;
                    self.under_budget = 0;
                }
                None
            }
        }
    }

    /// Return to the full tier with an empty history
    pub fn reset(&mut self) {
        self.tier = QualityTier::Full;
        self.reset_window();
    }

    fn reset_window(&mut self) {
        self.window.clear();
        self.over_budget = 0;
        self.under_budget = 0;
    }
}
