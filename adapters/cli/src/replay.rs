use std::{collections::VecDeque, path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use log::{info, warn};
use mask_trace_core::{Bitmap, Command, DisplayMapping, Event, SessionPhase};
use mask_trace_session::{apply, query, SessionController};

use crate::{clock::Clock, script::Step};

/// Share of the viewport the task image fills.
const IMAGE_FILL_RATIO: f64 = 0.8;

/// Drives a session through scripted steps, loading masks as tasks activate.
///
/// Returns every event the session emitted. A session still running after the
/// last step is ended with an exit so its record is always produced.
pub(crate) fn replay<L>(
    session: &mut SessionController,
    steps: &[Step],
    viewport: Option<[f64; 2]>,
    clock: &mut dyn Clock,
    load_mask: L,
) -> Vec<Event>
where
    L: FnMut(&Path) -> Result<Bitmap>,
{
    let mut driver = Driver {
        session,
        viewport,
        load_mask,
        events: Vec::new(),
    };

    let start = clock.wait_until(Duration::ZERO);
    driver.dispatch(Command::Tick { now: start });
    driver.dispatch(Command::StartSession);

    for step in steps {
        let now = clock.wait_until(step.at);
        driver.dispatch(Command::Tick { now });
        if let Some(command) = &step.command {
            driver.dispatch(command.clone());
        }
    }

    if query::phase(driver.session) != SessionPhase::Finished {
        driver.dispatch(Command::ExitAndClaim);
    }
    info!(
        "session closed at {} ms on the replay clock",
        query::now(driver.session).as_millis()
    );
    driver.events
}

struct Driver<'a, L> {
    session: &'a mut SessionController,
    viewport: Option<[f64; 2]>,
    load_mask: L,
    events: Vec<Event>,
}

impl<L> Driver<'_, L>
where
    L: FnMut(&Path) -> Result<Bitmap>,
{
    fn dispatch(&mut self, command: Command) {
        let mut queue = VecDeque::from([command]);
        let mut batch = Vec::new();
        while let Some(command) = queue.pop_front() {
            apply(self.session, command, &mut batch);
            for event in &batch {
                if let Event::InstanceActivated { task, spec } = event {
                    match (self.load_mask)(&spec.mask) {
                        Ok(mask) => {
                            if let Some([width, height]) = self.viewport {
                                queue.push_back(Command::SetDisplayMapping {
                                    mapping: DisplayMapping::fit_centered(
                                        width,
                                        height,
                                        mask.width(),
                                        mask.height(),
                                        IMAGE_FILL_RATIO,
                                    ),
                                });
                            }
                            queue.push_back(Command::MaskLoaded {
                                task: *task,
                                mask: Arc::new(mask),
                            });
                        }
                        Err(error) => {
                            warn!("{error:#}");
                            queue.push_back(Command::MaskFailed { task: *task });
                        }
                    }
                }
            }
            self.events.append(&mut batch);
        }
    }
}

/// Human readable line for the events worth reporting.
pub(crate) fn describe(event: &Event) -> Option<String> {
    match event {
        Event::SessionStarted { player } => Some(format!("session started for {player}")),
        Event::InstanceActivated { task, spec } => Some(format!(
            "task {task}: {} ({} s)",
            spec.image.display(),
            spec.duration.as_secs()
        )),
        Event::InstanceSkipped { task } => Some(format!("task {task}: skipped")),
        Event::RewardGranted { task, result } => Some(format!(
            "task {task}: accuracy {}, reward {} (base {}, bonus {})",
            result.accuracy, result.total_reward, result.base_reward, result.time_bonus
        )),
        Event::LevelUnlocked { level } => Some(format!("level {level} unlocked")),
        Event::SessionFinished { record } => {
            let progress = &record.progress;
            let average = progress
                .average_accuracy()
                .map_or_else(|| "n/a".to_owned(), |accuracy| accuracy.to_string());
            Some(format!(
                "session finished: {} earned {} at level {} over {} instances, average accuracy {average}",
                record.player,
                progress.money,
                progress.level,
                progress.instances_completed()
            ))
        }
        Event::InstanceStarted { .. }
        | Event::PointAdded { .. }
        | Event::PointsCleared { .. }
        | Event::InstanceScored { .. }
        | Event::ProgressUpdated { .. }
        | Event::PhaseChanged { .. } => None,
    }
}
