//! Stage steps shared by `FramePipeline` and `Session`
//!
//! A `Work` item carries one frame through tracking, segmentation and
//! rendering. Each step only acts when the previous one left the item in
//! the state it expects, so a failed frame simply falls through to render
//! as passthrough or invalid.

use std::sync::Arc;
use std::time::Instant;

use super::{Guidance, ProcessedFrame};
use crate::color::{ColorSpec, ColorTransform};
use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{DepthHint, Frame, FrameBufferPool};
use crate::postprocess::PostProcessor;
use crate::quality::StagePlan;
use crate::segmentation::{HairMask, HairSegmenter};
use crate::settings::{Look, ProcessingSettings};
use crate::telemetry::{Stage, StageTimings};
use crate::tracking::{FaceGeometry, FaceTracker, Tracking};

pub(crate) enum WorkState {
    Fresh,
    Tracked(FaceGeometry),
    Masked(HairMask),
    Passthrough {
        status: Result<()>,
        guidance: Option<Guidance>,
    },
    Invalid(PipelineError),
}

pub(crate) struct Work {
    pub frame: Frame,
    pub depth: Option<DepthHint>,
    /// Contiguous processing order, assigned when the frame is dequeued
    pub ticket: u64,
    /// Look snapshot taken at dequeue
    pub look: Arc<Look>,
    pub plan: StagePlan,
    pub timings: StageTimings,
    pub face_confidence: Option<f32>,
    pub state: WorkState,
}

impl Work {
    pub fn new(frame: Frame, depth: Option<DepthHint>, ticket: u64, look: Arc<Look>, plan: StagePlan) -> Self {
        Self {
            frame,
            depth,
            ticket,
            look,
            plan,
            timings: StageTimings::default(),
            face_confidence: None,
            state: WorkState::Fresh,
        }
    }

    pub fn track(&mut self, tracker: &mut FaceTracker) {
        if !matches!(self.state, WorkState::Fresh) {
            return;
        }

        // Nothing selected: no reason to run the models
        if self.look.color.is_none() {
            self.state = match self.frame.validate() {
                Ok(()) => WorkState::Passthrough {
                    status: Ok(()),
                    guidance: None,
                },
                Err(e) => WorkState::Invalid(e),
            };
            return;
        }

        let start = Instant::now();
        let result = tracker.track(&self.frame);
        self.timings.record(Stage::Tracking, start.elapsed());

        self.state = match result {
            Ok(tracking) => {
                self.face_confidence = tracking.confidence();
                match tracking {
                    Tracking::Detected(geometry) | Tracking::Held { geometry, .. } => WorkState::Tracked(geometry),
                    Tracking::NotDetected => WorkState::Passthrough {
                        status: Ok(()),
                        guidance: Some(Guidance::NoFace),
                    },
                }
            }
            Err(e @ PipelineError::InvalidFrame(_)) => WorkState::Invalid(e),
            Err(PipelineError::FaceDetectionFailed { consecutive_misses }) => WorkState::Passthrough {
                status: Err(PipelineError::FaceDetectionFailed { consecutive_misses }),
                guidance: Some(Guidance::FaceLost { consecutive_misses }),
            },
            Err(e) => WorkState::Passthrough {
                status: Err(e),
                guidance: None,
            },
        };
    }

    pub fn segment(&mut self, segmenter: &mut HairSegmenter) {
        let geometry = match &self.state {
            WorkState::Tracked(geometry) => geometry,
            // Face gone: the next face must not inherit this hair position
            WorkState::Passthrough { guidance: Some(_), .. } => {
                segmenter.reset();
                return;
            }
            _ => return,
        };

        let reused = if self.plan.recompute_segmentation(self.ticket) {
            None
        } else {
            segmenter.reuse(&self.frame)
        };

        let result = match reused {
            Some(mask) => Ok(mask),
            None => {
                let start = Instant::now();
                let result = segmenter.segment(
                    &self.frame,
                    geometry,
                    self.depth.as_ref(),
                    self.plan.segmentation_scale,
                );
                self.timings.record(Stage::Segmentation, start.elapsed());
                result
            }
        };

        self.state = match result {
            Ok(mask) => WorkState::Masked(mask),
            Err(e) => {
                tracing::debug!(
                    target: "hair_recolor::pipeline",
                    sequence = self.frame.sequence,
                    "Segmentation failed, passing frame through: {}",
                    e
                );
                WorkState::Passthrough {
                    status: Err(e),
                    guidance: None,
                }
            }
        };
    }
}

/// Color, composite and post-process for one worker
pub(crate) struct Renderer {
    colors: ColorTransform,
    compositor: Compositor,
    post: PostProcessor,
}

impl Renderer {
    pub fn new(pool: FrameBufferPool, colors: ColorTransform, config: &PipelineConfig) -> Self {
        Self {
            colors,
            compositor: Compositor::new(pool, config.compositor.clone()),
            post: PostProcessor::new(),
        }
    }

    pub fn render(&mut self, work: Work) -> ProcessedFrame {
        let Work {
            frame,
            look,
            plan,
            mut timings,
            face_confidence,
            state,
            ..
        } = work;
        let sequence = frame.sequence;
        let captured = frame.timestamp;

        let (output, status, passthrough, guidance) = match state {
            WorkState::Masked(mask) => match look.color.as_ref() {
                Some(color) => match self.recolor(&frame, &mask, color, &look.settings, &plan, &mut timings) {
                    Ok(recolored) => (Some(recolored), Ok(()), false, None),
                    Err(e) => {
                        tracing::warn!(
                            target: "hair_recolor::pipeline",
                            sequence,
                            "Render failed, passing frame through: {}",
                            e
                        );
                        (Some(frame), Err(e), true, None)
                    }
                },
                None => (Some(frame), Ok(()), true, None),
            },
            WorkState::Passthrough { status, guidance } => (Some(frame), status, true, guidance),
            WorkState::Invalid(e) => (None, Err(e), false, None),
            WorkState::Fresh | WorkState::Tracked(_) => (Some(frame), Ok(()), true, None),
        };

        timings.end_to_end = captured.elapsed();
        ProcessedFrame {
            output,
            sequence,
            timings,
            status,
            passthrough,
            guidance,
            tier: plan.tier,
            face_confidence,
        }
    }

    fn recolor(
        &mut self,
        frame: &Frame,
        mask: &HairMask,
        color: &ColorSpec,
        settings: &ProcessingSettings,
        plan: &StagePlan,
        timings: &mut StageTimings,
    ) -> Result<Frame> {
        let start = Instant::now();
        let lut = self.colors.resolve(color, &settings.adjustments);
        timings.record(Stage::ColorTransform, start.elapsed());

        let start = Instant::now();
        let mut output = self.compositor.composite(frame, mask, &lut, settings.blend_mode)?;
        timings.record(Stage::Composite, start.elapsed());

        if plan.run_post_process {
            let start = Instant::now();
            self.post.enhance(&mut output, settings)?;
            timings.record(Stage::PostProcess, start.elapsed());
        }
        Ok(output)
    }
}
