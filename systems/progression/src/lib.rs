#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure reward and levelling engine.
//!
//! The engine never mutates its inputs: each scored instance produces a new
//! [`PlayerProgress`] together with the [`ScoredResult`] that explains how the
//! totals changed and whether a level was unlocked.

use std::time::Duration;

use log::info;
use mask_trace_core::{Accuracy, Money, PlayerProgress, RewardConfig, ScoredResult};

/// Level transition caused by a scored instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LevelChange {
    /// The level stayed the same.
    Unchanged {
        /// Level after the update.
        level: u32,
    },
    /// The worker advanced to a higher level.
    Unlocked {
        /// Level before the update.
        from: u32,
        /// Level after the update.
        to: u32,
    },
}

impl LevelChange {
    /// Level after the update.
    #[must_use]
    pub const fn level(&self) -> u32 {
        match *self {
            Self::Unchanged { level } => level,
            Self::Unlocked { to, .. } => to,
        }
    }
}

/// Everything derived from recording one scored instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressionOutcome {
    /// Reward breakdown of the instance.
    pub result: ScoredResult,
    /// Totals after the instance.
    pub progress: PlayerProgress,
    /// Level transition caused by the instance.
    pub level_change: LevelChange,
}

/// Reward and levelling rules.
#[derive(Clone, Debug, Default)]
pub struct Progression {
    config: RewardConfig,
}

impl Progression {
    /// Creates an engine using the provided constants.
    #[must_use]
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    /// Constants the engine applies.
    #[must_use]
    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Reports whether an accuracy pays out.
    #[must_use]
    pub fn qualifies(&self, accuracy: Accuracy) -> bool {
        accuracy >= self.config.accuracy_threshold
    }

    /// Level reached after the provided number of qualifying instances.
    #[must_use]
    pub fn level_for(&self, successful_instances: u32) -> u32 {
        let per_level = self.config.images_per_level.max(1);
        let max_level = self.config.max_level.max(1);
        (successful_instances / per_level)
            .saturating_add(1)
            .min(max_level)
    }

    /// Qualifying instances still needed for the next level, or `None` at the
    /// maximum level.
    #[must_use]
    pub fn successes_to_next_level(&self, progress: &PlayerProgress) -> Option<u32> {
        if progress.level >= self.config.max_level.max(1) {
            return None;
        }
        let per_level = self.config.images_per_level.max(1);
        let next_at = progress.level.saturating_mul(per_level);
        Some(next_at.saturating_sub(progress.successful_instances))
    }

    /// Applies a scored instance to the worker's totals.
    ///
    /// The early bonus only pays out alongside a qualifying accuracy.
    #[must_use]
    pub fn record(
        &self,
        accuracy: Accuracy,
        early_bonus: Money,
        progress: &PlayerProgress,
    ) -> ProgressionOutcome {
        let qualifies = self.qualifies(accuracy);
        let (base_reward, time_bonus) = if qualifies {
            (self.config.reward_per_task, early_bonus)
        } else {
            (Money::ZERO, Money::ZERO)
        };
        let result = ScoredResult {
            accuracy,
            base_reward,
            time_bonus,
            total_reward: base_reward.saturating_add(time_bonus),
        };

        let mut next = progress.clone();
        if qualifies {
            next.successful_instances = next.successful_instances.saturating_add(1);
        }
        next.money = next.money.saturating_add(result.total_reward);
        next.accuracies.push(accuracy);

        let previous_level = progress.level;
        next.level = self.level_for(next.successful_instances).max(previous_level);
        let level_change = if next.level > previous_level {
            info!("level {} unlocked after {} qualifying instances", next.level, next.successful_instances);
            LevelChange::Unlocked {
                from: previous_level,
                to: next.level,
            }
        } else {
            LevelChange::Unchanged { level: next.level }
        };

        ProgressionOutcome {
            result,
            progress: next,
            level_change,
        }
    }
}

/// Bonus earned by submitting with `remaining` time left under `config`.
#[must_use]
pub fn early_bonus(config: &RewardConfig, remaining: Duration) -> Money {
    if remaining > config.time_bonus_threshold {
        config.time_bonus_reward
    } else {
        Money::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bonus_requires_strictly_more_than_threshold() {
        let config = RewardConfig::default();
        assert_eq!(early_bonus(&config, Duration::from_millis(5_001)), config.time_bonus_reward);
        assert_eq!(early_bonus(&config, Duration::from_millis(5_000)), Money::ZERO);
        assert_eq!(early_bonus(&config, Duration::ZERO), Money::ZERO);
    }

    #[test]
    fn degenerate_level_config_does_not_divide_by_zero() {
        let engine = Progression::new(RewardConfig {
            images_per_level: 0,
            max_level: 0,
            ..RewardConfig::default()
        });
        assert_eq!(engine.level_for(0), 1);
        assert_eq!(engine.level_for(50), 1);
    }

    #[test]
    fn level_change_exposes_resulting_level() {
        assert_eq!(LevelChange::Unchanged { level: 2 }.level(), 2);
        assert_eq!(LevelChange::Unlocked { from: 2, to: 3 }.level(), 3);
    }
}
