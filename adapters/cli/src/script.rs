use std::time::Duration;

use anyhow::{bail, Context, Result};
use mask_trace_core::{Command, Point};
use serde::Deserialize;

/// Scripted worker behaviour replayed against a session.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ReplayScript {
    /// Worker identifier; generated when absent.
    pub(crate) player: Option<String>,
    /// Seed of the task order; random when absent.
    pub(crate) seed: Option<u64>,
    /// Viewport the images are fitted into, as `[width, height]`.
    pub(crate) viewport: Option<[f64; 2]>,
    #[serde(default, rename = "step")]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    at_ms: u64,
    action: Action,
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Action {
    Wait,
    Point,
    Clear,
    Submit,
    Continue,
    SkipLevelUnlock,
    Exit,
}

/// One timed input of the replay.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Step {
    pub(crate) at: Duration,
    /// Input to apply after the clock reached `at`; `None` only advances time.
    pub(crate) command: Option<Command>,
}

impl ReplayScript {
    pub(crate) fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse replay script toml")
    }

    /// Validated steps in chronological order.
    pub(crate) fn steps(&self) -> Result<Vec<Step>> {
        let mut previous = 0;
        let mut steps = Vec::with_capacity(self.steps.len());
        for (index, raw) in self.steps.iter().enumerate() {
            if raw.at_ms < previous {
                bail!(
                    "step {} at {} ms runs before the previous step at {} ms",
                    index + 1,
                    raw.at_ms,
                    previous
                );
            }
            previous = raw.at_ms;
            let command = raw
                .command()
                .with_context(|| format!("invalid step {}", index + 1))?;
            steps.push(Step {
                at: Duration::from_millis(raw.at_ms),
                command,
            });
        }
        Ok(steps)
    }
}

impl RawStep {
    fn command(&self) -> Result<Option<Command>> {
        if self.action != Action::Point && (self.x.is_some() || self.y.is_some()) {
            bail!("coordinates are only valid for point steps");
        }
        let command = match self.action {
            Action::Wait => return Ok(None),
            Action::Point => {
                let (Some(x), Some(y)) = (self.x, self.y) else {
                    bail!("point steps need both x and y");
                };
                Command::AddPoint {
                    point: Point::new(x, y),
                }
            }
            Action::Clear => Command::ClearPoints,
            Action::Submit => Command::Submit,
            Action::Continue => Command::Continue,
            Action::SkipLevelUnlock => Command::SkipLevelUnlock,
            Action::Exit => Command::ExitAndClaim,
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_steps_in_order() {
        let script = ReplayScript::parse(
            r##"
            player = "#REPLAY01"
            seed = 4
            viewport = [800.0, 600.0]

            [[step]]
            at_ms = 0
            action = "point"
            x = 10.0
            y = 12.5

            [[step]]
            at_ms = 2500
            action = "submit"

            [[step]]
            at_ms = 9000
            action = "wait"
            "##,
        )
        .expect("script parses");

        assert_eq!(script.player.as_deref(), Some("#REPLAY01"));
        assert_eq!(script.seed, Some(4));
        assert_eq!(script.viewport, Some([800.0, 600.0]));
        assert_eq!(
            script.steps().expect("steps are valid"),
            vec![
                Step {
                    at: Duration::ZERO,
                    command: Some(Command::AddPoint {
                        point: Point::new(10.0, 12.5),
                    }),
                },
                Step {
                    at: Duration::from_millis(2_500),
                    command: Some(Command::Submit),
                },
                Step {
                    at: Duration::from_millis(9_000),
                    command: None,
                },
            ]
        );
    }

    #[test]
    fn rejects_steps_out_of_order() {
        let script = ReplayScript::parse(
            "[[step]]\nat_ms = 500\naction = \"clear\"\n[[step]]\nat_ms = 100\naction = \"exit\"",
        )
        .expect("script parses");
        assert!(script.steps().is_err());
    }

    #[test]
    fn rejects_points_without_coordinates() {
        let script = ReplayScript::parse("[[step]]\nat_ms = 0\naction = \"point\"\nx = 1.0")
            .expect("script parses");
        let error = script.steps().expect_err("y is missing");
        assert!(format!("{error:#}").contains("both x and y"));
    }

    #[test]
    fn unknown_actions_fail_to_parse() {
        assert!(ReplayScript::parse("[[step]]\nat_ms = 0\naction = \"jump\"").is_err());
    }
}
