#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative annotation session state.
//!
//! The [`SessionController`] owns the single active [`Instance`] and the
//! worker's [`PlayerProgress`]. Hosts mutate it exclusively through [`apply`]
//! and read it through [`query`].

mod instance;

use std::time::Duration;

use log::{debug, info};
use mask_trace_core::{
    Command, Event, InstanceState, PlayerId, PlayerProgress, RewardConfig, ScoredResult,
    ScoringStrategy, SessionPhase, SessionRecord, TaskIndex,
};
use mask_trace_system_progression::{LevelChange, Progression};
use mask_trace_system_schedule::TaskSchedule;

pub use instance::{Instance, MaskState};

/// How long a freshly unlocked level is presented before moving on.
pub const LEVEL_UNLOCK_DISPLAY: Duration = Duration::from_secs(5);

/// Rules a session is played under.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    /// Reward and levelling constants.
    pub reward: RewardConfig,
    /// Formula used to score traced polygons.
    pub strategy: ScoringStrategy,
    /// Presentation time of the level unlock phase.
    pub level_unlock_display: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reward: RewardConfig::default(),
            strategy: ScoringStrategy::default(),
            level_unlock_display: LEVEL_UNLOCK_DISPLAY,
        }
    }
}

/// One worker's walk through a task schedule.
#[derive(Debug)]
pub struct SessionController {
    player: PlayerId,
    schedule: TaskSchedule,
    progression: Progression,
    strategy: ScoringStrategy,
    level_unlock_display: Duration,
    phase: SessionPhase,
    instance: Option<Instance>,
    instance_settled: bool,
    armed_at: Option<Duration>,
    unlocked_at: Option<Duration>,
    now: Duration,
    progress: PlayerProgress,
    last_result: Option<ScoredResult>,
}

impl SessionController {
    /// Creates a session waiting in the lobby.
    #[must_use]
    pub fn new(player: PlayerId, schedule: TaskSchedule, settings: SessionSettings) -> Self {
        Self {
            player,
            schedule,
            progression: Progression::new(settings.reward),
            strategy: settings.strategy,
            level_unlock_display: settings.level_unlock_display,
            phase: SessionPhase::Lobby,
            instance: None,
            instance_settled: false,
            armed_at: None,
            unlocked_at: None,
            now: Duration::ZERO,
            progress: PlayerProgress::new(),
            last_result: None,
        }
    }

    fn set_phase(&mut self, phase: SessionPhase, out_events: &mut Vec<Event>) {
        if self.phase == phase {
            return;
        }
        self.phase = phase;
        out_events.push(Event::PhaseChanged { phase });
    }

    fn activate(&mut self, task: TaskIndex, out_events: &mut Vec<Event>) {
        let Some(spec) = self.schedule.get(task).cloned() else {
            self.finish(out_events);
            return;
        };

        self.instance = Some(Instance::new(
            task,
            spec.clone(),
            self.strategy,
            self.progression.config().clone(),
        ));
        self.instance_settled = false;
        self.armed_at = None;
        out_events.push(Event::InstanceActivated { task, spec });
        self.set_phase(SessionPhase::Annotating, out_events);
    }

    fn active_instance_mut(&mut self) -> Option<&mut Instance> {
        if self.phase == SessionPhase::Annotating {
            self.instance.as_mut()
        } else {
            None
        }
    }

    fn instance_for(&mut self, task: TaskIndex) -> Option<&mut Instance> {
        match self.instance.as_mut() {
            Some(instance) if instance.task() == task => Some(instance),
            _ => {
                debug!("ignoring asset for inactive task {task}");
                None
            }
        }
    }

    /// Hands a freshly scored instance to the progression engine.
    ///
    /// Returns the phase the result should be presented in.
    fn settle(&mut self, out_events: &mut Vec<Event>) -> Option<SessionPhase> {
        if self.instance_settled {
            return None;
        }
        let instance = self.instance.as_ref()?;
        if instance.state() != InstanceState::Scored {
            return None;
        }
        let accuracy = instance.accuracy()?;
        let task = instance.task();
        let bonus = instance.bonus();
        self.instance_settled = true;

        let outcome = self.progression.record(accuracy, bonus, &self.progress);
        self.progress = outcome.progress;
        self.last_result = Some(outcome.result);
        out_events.push(Event::RewardGranted {
            task,
            result: outcome.result,
        });

        match outcome.level_change {
            LevelChange::Unlocked { to, .. } => {
                out_events.push(Event::LevelUnlocked { level: to });
                Some(SessionPhase::LevelUnlock)
            }
            LevelChange::Unchanged { level } => {
                out_events.push(Event::ProgressUpdated {
                    level,
                    successful_instances: self.progress.successful_instances,
                });
                Some(SessionPhase::ShowingResult)
            }
        }
    }

    fn settle_and_present(&mut self, out_events: &mut Vec<Event>) {
        match self.settle(out_events) {
            Some(SessionPhase::LevelUnlock) => {
                self.unlocked_at = Some(self.now);
                self.set_phase(SessionPhase::LevelUnlock, out_events);
            }
            Some(phase) => self.set_phase(phase, out_events),
            None => {}
        }
    }

    fn finish(&mut self, out_events: &mut Vec<Event>) {
        if self.phase == SessionPhase::Finished {
            return;
        }
        self.set_phase(SessionPhase::Finished, out_events);
        info!(
            "session for {} finished with {} over {} instances",
            self.player,
            self.progress.money,
            self.progress.instances_completed()
        );
        out_events.push(Event::SessionFinished {
            record: self.record(),
        });
    }

    /// Snapshot of the worker's totals.
    #[must_use]
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            player: self.player.clone(),
            progress: self.progress.clone(),
        }
    }
}

/// Applies the provided command to the session.
pub fn apply(session: &mut SessionController, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::StartSession => {
            if session.phase != SessionPhase::Lobby {
                debug!("session already started");
                return;
            }
            info!("session started for {}", session.player);
            out_events.push(Event::SessionStarted {
                player: session.player.clone(),
            });
            session.activate(TaskIndex::new(0), out_events);
        }
        Command::SetDisplayMapping { mapping } => {
            if let Some(instance) = session.instance.as_mut() {
                instance.set_display_mapping(mapping);
            }
        }
        Command::MaskLoaded { task, mask } => {
            if let Some(instance) = session.instance_for(task) {
                instance.deliver_mask(mask);
            }
        }
        Command::MaskFailed { task } => {
            if let Some(instance) = session.instance_for(task) {
                instance.mask_failed();
            }
        }
        Command::AddPoint { point } => {
            let now = session.now;
            let Some(instance) = session.active_instance_mut() else {
                debug!("vertex ignored outside annotation");
                return;
            };
            let was_idle = instance.state() == InstanceState::Idle;
            instance.add_point(point, out_events);
            if was_idle && instance.state() == InstanceState::Armed {
                session.armed_at = Some(now);
            }
        }
        Command::ClearPoints => {
            if let Some(instance) = session.active_instance_mut() {
                instance.clear_points(out_events);
            }
        }
        Command::Submit => {
            let Some(instance) = session.active_instance_mut() else {
                debug!("submit ignored outside annotation");
                return;
            };
            if instance.complete_early(out_events) {
                session.settle_and_present(out_events);
            }
        }
        Command::Tick { now } => {
            session.now = session.now.max(now);
            match session.phase {
                SessionPhase::Annotating => {
                    let now = session.now;
                    let Some(armed_at) = session.armed_at else {
                        return;
                    };
                    if let Some(instance) = session.instance.as_mut() {
                        instance.tick(now.saturating_sub(armed_at), out_events);
                    }
                    session.settle_and_present(out_events);
                }
                SessionPhase::LevelUnlock => {
                    let shown_for = session
                        .unlocked_at
                        .map_or(Duration::ZERO, |since| session.now.saturating_sub(since));
                    if shown_for >= session.level_unlock_display {
                        session.set_phase(SessionPhase::ShowingResult, out_events);
                    }
                }
                SessionPhase::Lobby | SessionPhase::ShowingResult | SessionPhase::Finished => {}
            }
        }
        Command::SkipLevelUnlock => {
            if session.phase == SessionPhase::LevelUnlock {
                session.set_phase(SessionPhase::ShowingResult, out_events);
            }
        }
        Command::Continue => {
            if session.phase != SessionPhase::ShowingResult {
                debug!("continue ignored in phase {:?}", session.phase);
                return;
            }
            let next = session
                .instance
                .as_ref()
                .map_or(TaskIndex::new(0), |instance| instance.task().next());
            session.activate(next, out_events);
        }
        Command::ExitAndClaim => match session.phase {
            SessionPhase::Annotating => {
                let abandoned = session
                    .instance
                    .as_mut()
                    .and_then(|instance| instance.resolve(out_events));
                if let Some(accuracy) = abandoned {
                    info!("abandoned task scored {accuracy}");
                    let _ = session.settle(out_events);
                }
                session.finish(out_events);
            }
            SessionPhase::ShowingResult | SessionPhase::LevelUnlock => {
                session.finish(out_events);
            }
            SessionPhase::Lobby | SessionPhase::Finished => {
                debug!("exit ignored in phase {:?}", session.phase);
            }
        },
    }
}

/// Query functions that provide read-only access to the session state.
pub mod query {
    use std::time::Duration;

    use super::{Instance, SessionController};
    use mask_trace_core::{
        Edge, PlayerId, PlayerProgress, Polygon, ScoredResult, SessionPhase, TaskIndex,
    };

    /// Worker the session belongs to.
    #[must_use]
    pub fn player(session: &SessionController) -> &PlayerId {
        &session.player
    }

    /// Current phase.
    #[must_use]
    pub fn phase(session: &SessionController) -> SessionPhase {
        session.phase
    }

    /// Latest clock value seen by the session.
    #[must_use]
    pub fn now(session: &SessionController) -> Duration {
        session.now
    }

    /// Instance currently or most recently presented.
    #[must_use]
    pub fn instance(session: &SessionController) -> Option<&Instance> {
        session.instance.as_ref()
    }

    /// Task currently or most recently presented.
    #[must_use]
    pub fn current_task(session: &SessionController) -> Option<TaskIndex> {
        session.instance.as_ref().map(Instance::task)
    }

    /// Number of scheduled tasks.
    #[must_use]
    pub fn task_count(session: &SessionController) -> usize {
        session.schedule.len()
    }

    /// Countdown of the active instance as of the latest tick.
    #[must_use]
    pub fn remaining_time(session: &SessionController) -> Option<Duration> {
        session.instance.as_ref().map(Instance::remaining)
    }

    /// Reports whether clicks currently add vertices.
    #[must_use]
    pub fn interaction_allowed(session: &SessionController) -> bool {
        session.phase == SessionPhase::Annotating
            && session
                .instance
                .as_ref()
                .is_some_and(Instance::interaction_allowed)
    }

    /// Vertices of the active polygon.
    #[must_use]
    pub fn polygon(session: &SessionController) -> Option<&Polygon> {
        session.instance.as_ref().map(Instance::polygon)
    }

    /// Edges a renderer should stroke for the active polygon.
    #[must_use]
    pub fn edges(session: &SessionController) -> Vec<Edge> {
        session
            .instance
            .as_ref()
            .map(|instance| instance.polygon().edges())
            .unwrap_or_default()
    }

    /// Totals accumulated so far.
    #[must_use]
    pub fn progress(session: &SessionController) -> &PlayerProgress {
        &session.progress
    }

    /// Reward breakdown of the latest scored instance.
    #[must_use]
    pub fn last_result(session: &SessionController) -> Option<&ScoredResult> {
        session.last_result.as_ref()
    }

    /// Qualifying instances still needed for the next level.
    #[must_use]
    pub fn successes_to_next_level(session: &SessionController) -> Option<u32> {
        session
            .progression
            .successes_to_next_level(&session.progress)
    }
}
