use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use mask_trace_core::{Accuracy, Money, RewardConfig, ScoringStrategy};
use mask_trace_session::{SessionSettings, LEVEL_UNLOCK_DISPLAY};
use mask_trace_system_schedule::ScheduleConfig;
use mask_trace_system_scoring::{validate, ScoringError};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_STORE: &str = "leaderboard.json";
const DEFAULT_TOP: usize = 5;

/// Problems found while reading the configuration file.
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file is not valid configuration TOML.
    #[error("failed to parse config toml")]
    Parse(#[from] toml::de::Error),
    /// A dollar amount is negative or not finite.
    #[error("reward.{field} must be a finite non-negative dollar amount, got {value}")]
    InvalidMoney { field: &'static str, value: f64 },
    /// The accuracy threshold lies outside the percentage range.
    #[error("reward.accuracy_threshold must lie within 0..=100, got {0}")]
    InvalidThreshold(f64),
    /// A count that drives division or iteration is zero.
    #[error("{0} must be at least one")]
    Zero(&'static str),
    /// The scoring weights are unusable.
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Validated settings shared by every subcommand.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AppConfig {
    pub(crate) reward: RewardConfig,
    pub(crate) strategy: ScoringStrategy,
    pub(crate) schedule: ScheduleConfig,
    pub(crate) level_unlock_display: Duration,
    pub(crate) store: PathBuf,
    pub(crate) top: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reward: RewardConfig::default(),
            strategy: ScoringStrategy::default(),
            schedule: ScheduleConfig::default(),
            level_unlock_display: LEVEL_UNLOCK_DISPLAY,
            store: PathBuf::from(DEFAULT_STORE),
            top: DEFAULT_TOP,
        }
    }
}

impl AppConfig {
    /// Reads `path`, or falls back to defaults when no file is given.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub(crate) fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;
        file.validate()
    }

    pub(crate) fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            reward: self.reward.clone(),
            strategy: self.strategy,
            level_unlock_display: self.level_unlock_display,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    reward: RewardSection,
    scoring: Option<ScoringStrategy>,
    schedule: ScheduleSection,
    session: SessionSection,
    leaderboard: LeaderboardSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RewardSection {
    reward_per_task: f64,
    accuracy_threshold: f64,
    time_bonus_reward: f64,
    time_bonus_threshold_ms: u64,
    images_per_level: u32,
    max_level: u32,
}

impl Default for RewardSection {
    fn default() -> Self {
        let defaults = RewardConfig::default();
        Self {
            reward_per_task: defaults.reward_per_task.as_dollars(),
            accuracy_threshold: defaults.accuracy_threshold.get(),
            time_bonus_reward: defaults.time_bonus_reward.as_dollars(),
            time_bonus_threshold_ms: 5_000,
            images_per_level: defaults.images_per_level,
            max_level: defaults.max_level,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ScheduleSection {
    total_instances: u32,
    time_seconds: u32,
    time_decay_seconds: u32,
    image_dir: PathBuf,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        let defaults = ScheduleConfig::default();
        Self {
            total_instances: defaults.total_instances,
            time_seconds: defaults.time_seconds,
            time_decay_seconds: defaults.time_decay_seconds,
            image_dir: defaults.image_dir,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SessionSection {
    level_unlock_display_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            level_unlock_display_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LeaderboardSection {
    store: PathBuf,
    top: usize,
}

impl Default for LeaderboardSection {
    fn default() -> Self {
        Self {
            store: PathBuf::from(DEFAULT_STORE),
            top: DEFAULT_TOP,
        }
    }
}

impl ConfigFile {
    fn validate(self) -> Result<AppConfig, ConfigError> {
        let reward = self.reward;
        if !(0.0..=100.0).contains(&reward.accuracy_threshold) {
            return Err(ConfigError::InvalidThreshold(reward.accuracy_threshold));
        }
        if reward.images_per_level == 0 {
            return Err(ConfigError::Zero("reward.images_per_level"));
        }
        if reward.max_level == 0 {
            return Err(ConfigError::Zero("reward.max_level"));
        }
        if self.schedule.total_instances == 0 {
            return Err(ConfigError::Zero("schedule.total_instances"));
        }

        let strategy = self.scoring.unwrap_or_default();
        validate(&strategy)?;

        Ok(AppConfig {
            reward: RewardConfig {
                reward_per_task: dollars("reward_per_task", reward.reward_per_task)?,
                accuracy_threshold: Accuracy::new(reward.accuracy_threshold),
                time_bonus_reward: dollars("time_bonus_reward", reward.time_bonus_reward)?,
                time_bonus_threshold: Duration::from_millis(reward.time_bonus_threshold_ms),
                images_per_level: reward.images_per_level,
                max_level: reward.max_level,
            },
            strategy,
            schedule: ScheduleConfig {
                total_instances: self.schedule.total_instances,
                time_seconds: self.schedule.time_seconds,
                time_decay_seconds: self.schedule.time_decay_seconds,
                image_dir: self.schedule.image_dir,
            },
            level_unlock_display: Duration::from_millis(self.session.level_unlock_display_ms),
            store: self.leaderboard.store,
            top: self.leaderboard.top,
        })
    }
}

fn dollars(field: &'static str, value: f64) -> Result<Money, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(Money::from_dollars(value))
    } else {
        Err(ConfigError::InvalidMoney { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").expect("empty config parses");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [reward]
            reward_per_task = 0.02
            images_per_level = 3

            [scoring]
            kind = "precision_penalized"

            [schedule]
            total_instances = 10
            image_dir = "data/tasks"

            [leaderboard]
            top = 10
            "#,
        )
        .expect("config parses");

        assert_eq!(config.reward.reward_per_task, Money::from_micros(20_000));
        assert_eq!(config.reward.images_per_level, 3);
        assert_eq!(config.reward.max_level, 5, "unset fields keep defaults");
        assert_eq!(config.strategy, ScoringStrategy::PrecisionPenalized);
        assert_eq!(config.schedule.total_instances, 10);
        assert_eq!(config.schedule.image_dir, PathBuf::from("data/tasks"));
        assert_eq!(config.top, 10);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[reward]\naccuracy_threshold = 120.0"),
            Err(ConfigError::InvalidThreshold(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[reward]\nreward_per_task = -1.0"),
            Err(ConfigError::InvalidMoney { field: "reward_per_task", .. })
        ));
        assert!(matches!(
            AppConfig::from_toml("[reward]\nimages_per_level = 0"),
            Err(ConfigError::Zero("reward.images_per_level"))
        ));
        assert!(matches!(
            AppConfig::from_toml(
                "[scoring]\nkind = \"weighted_overlap\"\nfalse_negative_weight = -1.0\nfalse_positive_weight = 0.8"
            ),
            Err(ConfigError::Scoring(ScoringError::InvalidWeights))
        ));
        assert!(matches!(
            AppConfig::from_toml("[rewards]\nmax_level = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = AppConfig::load(Some(Path::new("does/not/exist.toml")))
            .expect_err("file is missing");
        assert!(error.to_string().contains("does/not/exist.toml"));
    }
}
