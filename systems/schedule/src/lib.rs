#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic task schedule and worker identity generation.
//!
//! A session presents every image of the pool once, in a seeded random order,
//! with a time allowance that shrinks linearly as the session progresses.

use std::{path::PathBuf, time::Duration};

use mask_trace_core::{PlayerId, TaskIndex, TaskSpec};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const PLAYER_ID_PREFIX: char = '#';
const PLAYER_ID_LENGTH: usize = 8;
const PLAYER_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Parameters controlling schedule generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Number of tasks, and of images in the pool.
    pub total_instances: u32,
    /// Time granted to the first task, in seconds.
    pub time_seconds: u32,
    /// Seconds removed from the allowance over the course of the session.
    pub time_decay_seconds: u32,
    /// Directory holding `{n}.png` images and `{n}_mask.png` masks.
    pub image_dir: PathBuf,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            total_instances: 50,
            time_seconds: 30,
            time_decay_seconds: 30,
            image_dir: PathBuf::from("imgs"),
        }
    }
}

/// Ordered list of tasks presented during a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskSchedule {
    tasks: Vec<TaskSpec>,
}

impl TaskSchedule {
    /// Builds a schedule from explicit tasks.
    #[must_use]
    pub fn from_tasks(tasks: Vec<TaskSpec>) -> Self {
        Self { tasks }
    }

    /// Generates a schedule that visits each image of the pool once in an
    /// order derived from `seed`.
    #[must_use]
    pub fn generate(config: &ScheduleConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut order: Vec<u32> = (1..=config.total_instances).collect();
        order.shuffle(&mut rng);

        let tasks = order
            .into_iter()
            .enumerate()
            .map(|(position, image)| TaskSpec {
                image: config.image_dir.join(format!("{image}.png")),
                mask: config.image_dir.join(format!("{image}_mask.png")),
                duration: task_duration(config, position),
            })
            .collect();
        Self { tasks }
    }

    /// Task at the provided index.
    #[must_use]
    pub fn get(&self, index: TaskIndex) -> Option<&TaskSpec> {
        usize::try_from(index.get())
            .ok()
            .and_then(|index| self.tasks.get(index))
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Reports whether the schedule has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Iterates over the tasks in presentation order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskSpec> {
        self.tasks.iter()
    }
}

/// Time granted to the task at `position`, never less than one second.
#[must_use]
pub fn task_duration(config: &ScheduleConfig, position: usize) -> Duration {
    let total = f64::from(config.total_instances.max(1));
    let progress = position as f64 / total;
    let seconds =
        (f64::from(config.time_seconds) - progress * f64::from(config.time_decay_seconds)).ceil();
    Duration::from_secs(seconds.max(1.0) as u64)
}

/// Generates a worker identifier such as `#K3Z09QAB`.
pub fn generate_player_id<R: Rng + ?Sized>(rng: &mut R) -> PlayerId {
    let mut id = String::with_capacity(PLAYER_ID_LENGTH + 1);
    id.push(PLAYER_ID_PREFIX);
    for _ in 0..PLAYER_ID_LENGTH {
        let index = rng.gen_range(0..PLAYER_ID_ALPHABET.len());
        id.push(char::from(PLAYER_ID_ALPHABET[index]));
    }
    PlayerId::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn schedule_visits_each_image_once() {
        let config = ScheduleConfig::default();
        let schedule = TaskSchedule::generate(&config, 0x5eed);

        assert_eq!(schedule.len(), 50);
        let images: HashSet<PathBuf> = schedule.iter().map(|task| task.image.clone()).collect();
        assert_eq!(images.len(), 50);
        for task in schedule.iter() {
            let stem = task
                .image
                .file_stem()
                .and_then(|stem| stem.to_str())
                .expect("utf-8 stem");
            assert_eq!(task.mask, config.image_dir.join(format!("{stem}_mask.png")));
        }
    }

    #[test]
    fn schedule_is_deterministic_per_seed() {
        let config = ScheduleConfig::default();
        assert_eq!(
            TaskSchedule::generate(&config, 42),
            TaskSchedule::generate(&config, 42)
        );
        assert_ne!(
            TaskSchedule::generate(&config, 42),
            TaskSchedule::generate(&config, 43)
        );
    }

    #[test]
    fn durations_shrink_over_the_session() {
        let config = ScheduleConfig::default();
        assert_eq!(task_duration(&config, 0), Duration::from_secs(30));
        assert_eq!(task_duration(&config, 1), Duration::from_secs(30));
        assert_eq!(task_duration(&config, 25), Duration::from_secs(15));
        assert_eq!(task_duration(&config, 49), Duration::from_secs(1));

        let schedule = TaskSchedule::generate(&config, 9);
        let durations: Vec<Duration> = schedule.iter().map(|task| task.duration).collect();
        assert!(durations.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn durations_never_reach_zero() {
        let config = ScheduleConfig {
            total_instances: 4,
            time_seconds: 2,
            time_decay_seconds: 10,
            ..ScheduleConfig::default()
        };
        for position in 0..4 {
            assert!(task_duration(&config, position) >= Duration::from_secs(1));
        }
    }

    #[test]
    fn player_ids_use_prefix_and_alphabet() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let id = generate_player_id(&mut rng);
        let text = id.as_str();

        assert_eq!(text.len(), 9);
        assert!(text.starts_with('#'));
        assert!(text[1..]
            .bytes()
            .all(|byte| PLAYER_ID_ALPHABET.contains(&byte)));
        assert_ne!(id, generate_player_id(&mut rng));
    }

    #[test]
    fn out_of_range_index_yields_none() {
        let schedule = TaskSchedule::generate(&ScheduleConfig::default(), 1);
        assert!(schedule.get(TaskIndex::new(49)).is_some());
        assert!(schedule.get(TaskIndex::new(50)).is_none());
    }
}
