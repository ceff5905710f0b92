use std::{sync::Arc, time::Duration};

use log::{debug, warn};
use mask_trace_core::{
    Accuracy, Bitmap, DisplayMapping, Event, InstanceState, Money, Point, Polygon, RewardConfig,
    ScoringStrategy, TaskIndex, TaskSpec, TimerState,
};
use mask_trace_system_progression::early_bonus;
use mask_trace_system_rasterizer::Rasterizer;
use mask_trace_system_scoring::score;

/// Availability of the ground-truth mask for an instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaskState {
    /// Still being loaded by the host.
    Pending,
    /// Decoded and ready for scoring.
    Ready(Arc<Bitmap>),
    /// Could not be loaded; the instance scores zero.
    Unavailable,
}

/// One timed annotation attempt.
///
/// The first vertex starts the countdown. The instance becomes
/// [`InstanceState::Scored`] exactly once, either when the countdown reaches
/// zero or when the worker submits early.
#[derive(Debug)]
pub struct Instance {
    task: TaskIndex,
    spec: TaskSpec,
    strategy: ScoringStrategy,
    reward: RewardConfig,
    polygon: Polygon,
    state: InstanceState,
    timer: TimerState,
    remaining: Duration,
    accuracy: Option<Accuracy>,
    bonus: Money,
    mask: MaskState,
    mapping: DisplayMapping,
    rasterizer: Rasterizer,
}

impl Instance {
    /// Creates an idle instance for the provided task.
    #[must_use]
    pub fn new(
        task: TaskIndex,
        spec: TaskSpec,
        strategy: ScoringStrategy,
        reward: RewardConfig,
    ) -> Self {
        let remaining = spec.duration;
        Self {
            task,
            spec,
            strategy,
            reward,
            polygon: Polygon::new(),
            state: InstanceState::Idle,
            timer: TimerState::NotStarted,
            remaining,
            accuracy: None,
            bonus: Money::ZERO,
            mask: MaskState::Pending,
            mapping: DisplayMapping::default(),
            rasterizer: Rasterizer::new(),
        }
    }

    /// Position of the task within the schedule.
    #[must_use]
    pub fn task(&self) -> TaskIndex {
        self.task
    }

    /// Image, mask and duration of the task.
    #[must_use]
    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Countdown state.
    #[must_use]
    pub fn timer(&self) -> TimerState {
        self.timer
    }

    /// Time left as of the latest tick.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Full duration granted to the task.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.spec.duration
    }

    /// Vertices traced so far.
    #[must_use]
    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    /// Accuracy, once scored.
    #[must_use]
    pub fn accuracy(&self) -> Option<Accuracy> {
        self.accuracy
    }

    /// Early completion bonus earned, before accuracy gating.
    #[must_use]
    pub fn bonus(&self) -> Money {
        self.bonus
    }

    /// Availability of the ground-truth mask.
    #[must_use]
    pub fn mask_state(&self) -> &MaskState {
        &self.mask
    }

    /// Rectangle the image was last drawn at.
    #[must_use]
    pub fn display_mapping(&self) -> DisplayMapping {
        self.mapping
    }

    /// Reports whether the instance still accepts vertices.
    #[must_use]
    pub fn interaction_allowed(&self) -> bool {
        self.state != InstanceState::Scored
    }

    /// Appends a vertex; the first one starts the countdown.
    pub fn add_point(&mut self, point: Point, out_events: &mut Vec<Event>) {
        if !self.interaction_allowed() {
            debug!("ignoring vertex for finished task {}", self.task);
            return;
        }

        self.polygon.push(point);
        if self.state == InstanceState::Idle {
            self.state = InstanceState::Armed;
            self.timer = TimerState::Running;
            self.remaining = self.spec.duration;
            out_events.push(Event::InstanceStarted {
                task: self.task,
                duration: self.spec.duration,
            });
        }
        out_events.push(Event::PointAdded {
            task: self.task,
            point,
        });
    }

    /// Removes every vertex without touching the countdown.
    pub fn clear_points(&mut self, out_events: &mut Vec<Event>) {
        if !self.interaction_allowed() || self.polygon.is_empty() {
            return;
        }
        self.polygon.clear();
        out_events.push(Event::PointsCleared { task: self.task });
    }

    /// Advances the countdown to `elapsed` since the first vertex.
    pub fn tick(&mut self, elapsed: Duration, out_events: &mut Vec<Event>) {
        if self.state != InstanceState::Armed || self.timer != TimerState::Running {
            return;
        }

        self.remaining = self.spec.duration.saturating_sub(elapsed);
        if self.remaining.is_zero() {
            self.timer = TimerState::Expired;
            self.finish(Money::ZERO, out_events);
        }
    }

    /// Submits before the countdown ends. Returns whether the call scored the
    /// instance.
    pub fn complete_early(&mut self, out_events: &mut Vec<Event>) -> bool {
        if self.state != InstanceState::Armed {
            debug!("submit ignored for task {} in state {:?}", self.task, self.state);
            return false;
        }

        self.timer = TimerState::Stopped;
        let bonus = early_bonus(&self.reward, self.remaining);
        self.finish(bonus, out_events);
        true
    }

    /// Settles an abandoned instance.
    ///
    /// An armed instance is scored as if its countdown ran out. An idle one is
    /// skipped and yields `None`.
    pub fn resolve(&mut self, out_events: &mut Vec<Event>) -> Option<Accuracy> {
        match self.state {
            InstanceState::Armed => {
                self.timer = TimerState::Stopped;
                self.finish(Money::ZERO, out_events);
                self.accuracy
            }
            InstanceState::Idle => {
                out_events.push(Event::InstanceSkipped { task: self.task });
                None
            }
            InstanceState::Scored => None,
        }
    }

    /// Hands over the decoded mask.
    pub fn deliver_mask(&mut self, mask: Arc<Bitmap>) {
        self.mask = MaskState::Ready(mask);
    }

    /// Records that the mask will never arrive.
    pub fn mask_failed(&mut self) {
        warn!("mask for task {} unavailable: {}", self.task, self.spec.mask.display());
        self.mask = MaskState::Unavailable;
    }

    /// Records where the image was drawn on the latest frame.
    pub fn set_display_mapping(&mut self, mapping: DisplayMapping) {
        self.mapping = mapping;
    }

    fn finish(&mut self, bonus: Money, out_events: &mut Vec<Event>) {
        let accuracy = self.measure();
        self.state = InstanceState::Scored;
        self.accuracy = Some(accuracy);
        self.bonus = bonus;
        out_events.push(Event::InstanceScored {
            task: self.task,
            accuracy,
            bonus,
        });
    }

    fn measure(&mut self) -> Accuracy {
        let MaskState::Ready(mask) = &self.mask else {
            warn!("scoring task {} without a mask, accuracy is zero", self.task);
            return Accuracy::ZERO;
        };

        let (width, height) = mask.dimensions();
        let drawn = match self
            .rasterizer
            .rasterize(&self.polygon, &self.mapping, width, height)
        {
            Ok(drawn) => drawn,
            Err(error) => {
                warn!("could not rasterize task {}: {error}", self.task);
                return Accuracy::ZERO;
            }
        };

        score(mask, &drawn, &self.strategy).unwrap_or_else(|error| {
            warn!("could not score task {}: {error}", self.task);
            Accuracy::ZERO
        })
    }
}
