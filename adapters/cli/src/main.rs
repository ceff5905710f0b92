#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter for the Mask Trace annotation engine.

mod assets;
mod clock;
mod config;
mod replay;
mod script;
mod store;

use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use mask_trace_core::{DisplayMapping, PlayerId, Point, Polygon, ScoringStrategy};
use mask_trace_session::{query, SessionController};
use mask_trace_system_leaderboard::Leaderboard;
use mask_trace_system_rasterizer::rasterize;
use mask_trace_system_schedule::{generate_player_id, TaskSchedule};
use mask_trace_system_scoring::{accuracy, validate, OverlapCounts};

use crate::{
    clock::{Clock, MonotonicClock, ScriptedClock},
    config::AppConfig,
    script::ReplayScript,
    store::FileStore,
};

#[derive(Debug, Parser)]
#[command(
    name = "mask-trace",
    version,
    about = "Scores traced polygons against ground-truth masks"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Scores a single polygon against a mask image.
    Score {
        /// Ground-truth mask image.
        #[arg(long)]
        mask: PathBuf,
        /// Vertices as space separated `x,y` pairs.
        #[arg(long, allow_hyphen_values = true)]
        points: String,
        /// Rectangle the image was drawn at, as `x,y,width,height`.
        #[arg(long)]
        display: Option<String>,
        /// Scoring formula; defaults to the configured one.
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Optional TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Replays a scripted session and records it on the leaderboard.
    Replay {
        /// TOML script of timed worker inputs.
        #[arg(long)]
        script: PathBuf,
        /// Optional TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Leaderboard store; overrides the configured path.
        #[arg(long)]
        store: Option<PathBuf>,
        /// Paces the replay in wall-clock time.
        #[arg(long)]
        realtime: bool,
    },
    /// Prints the leaderboard.
    Leaderboard {
        /// Leaderboard store; overrides the configured path.
        #[arg(long)]
        store: Option<PathBuf>,
        /// Number of entries to print.
        #[arg(long)]
        top: Option<usize>,
        /// Optional TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Prints the task schedule generated from a seed.
    Schedule {
        /// Seed of the task order; random when absent.
        #[arg(long)]
        seed: Option<u64>,
        /// Optional TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Weighted,
    Precision,
}

impl StrategyArg {
    fn resolve(self, configured: ScoringStrategy) -> ScoringStrategy {
        match (self, configured) {
            (Self::Weighted, weighted @ ScoringStrategy::WeightedOverlap { .. }) => weighted,
            (Self::Weighted, _) => ScoringStrategy::default(),
            (Self::Precision, _) => ScoringStrategy::PrecisionPenalized,
        }
    }
}

/// Entry point for the Mask Trace command-line interface.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match Cli::parse().command {
        CliCommand::Score {
            mask,
            points,
            display,
            strategy,
            config,
        } => {
            let config = AppConfig::load(config.as_deref())?;
            let strategy = strategy.map_or(config.strategy, |arg| arg.resolve(config.strategy));
            validate(&strategy)?;

            let polygon = parse_points(&points)?;
            let mapping = display
                .as_deref()
                .map(parse_display)
                .transpose()?
                .unwrap_or_default();
            let mask = assets::load_mask(&mask)?;
            let (width, height) = mask.dimensions();
            let drawn = rasterize(&polygon, &mapping, width, height)?;
            let counts = OverlapCounts::tally(&mask, &drawn)?;

            println!("mask pixels:    {}", counts.mask_white);
            println!("polygon pixels: {}", counts.poly_white);
            println!("overlap:        {}", counts.overlap);
            println!("accuracy:       {}", accuracy(&counts, &strategy));
        }
        CliCommand::Replay {
            script,
            config,
            store,
            realtime,
        } => {
            let config = AppConfig::load(config.as_deref())?;
            let contents = fs::read_to_string(&script)
                .with_context(|| format!("failed to read replay script {}", script.display()))?;
            let script = ReplayScript::parse(&contents)?;
            let steps = script.steps()?;
            let store_path = store.unwrap_or_else(|| config.store.clone());
            let mut store = FileStore::open(&store_path)
                .with_context(|| format!("failed to open leaderboard store {}", store_path.display()))?;

            let seed = script.seed.unwrap_or_else(rand::random);
            let player = script
                .player
                .clone()
                .map_or_else(|| generate_player_id(&mut rand::thread_rng()), |name| PlayerId::new(name));
            info!("replaying {} steps for {player} with seed {seed}", steps.len());

            let schedule = TaskSchedule::generate(&config.schedule, seed);
            let mut session = SessionController::new(player, schedule, config.session_settings());
            let mut clock: Box<dyn Clock> = if realtime {
                Box::new(MonotonicClock::start())
            } else {
                Box::new(ScriptedClock::default())
            };
            let events = replay::replay(
                &mut session,
                &steps,
                script.viewport,
                clock.as_mut(),
                assets::load_mask,
            );
            for line in events.iter().filter_map(replay::describe) {
                println!("{line}");
            }

            let player = query::player(&session);
            let mut leaderboard = Leaderboard::load(&store);
            leaderboard.handle(&events, unix_millis());
            leaderboard
                .save(&mut store)
                .context("failed to save leaderboard")?;
            if let Some(rank) = leaderboard.rank(player) {
                println!("{player} ranks #{rank} of {}", leaderboard.len());
            }
        }
        CliCommand::Leaderboard { store, top, config } => {
            let config = AppConfig::load(config.as_deref())?;
            let store_path = store.unwrap_or(config.store);
            let store = FileStore::open(&store_path)
                .with_context(|| format!("failed to open leaderboard store {}", store_path.display()))?;
            let leaderboard = Leaderboard::load(&store);
            if leaderboard.is_empty() {
                println!("leaderboard is empty");
            }
            for (index, entry) in leaderboard.top(top.unwrap_or(config.top)).iter().enumerate() {
                println!(
                    "{:>3}. {}  level {}  {}  avg {}  ({} instances)",
                    index + 1,
                    entry.id,
                    entry.level,
                    entry.total_money,
                    entry.average_accuracy,
                    entry.accuracy_history.len()
                );
            }
        }
        CliCommand::Schedule { seed, config } => {
            let config = AppConfig::load(config.as_deref())?;
            let seed = seed.unwrap_or_else(rand::random);
            let schedule = TaskSchedule::generate(&config.schedule, seed);
            println!("seed {seed}");
            for (index, task) in schedule.iter().enumerate() {
                println!(
                    "{:>3}. {}  {}  {} s",
                    index + 1,
                    task.image.display(),
                    task.mask.display(),
                    task.duration.as_secs()
                );
            }
        }
    }
    Ok(())
}

fn parse_points(value: &str) -> Result<Polygon> {
    value
        .split_whitespace()
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .with_context(|| format!("vertex `{pair}` is not an `x,y` pair"))?;
            Ok(Point::new(parse_coordinate(x)?, parse_coordinate(y)?))
        })
        .collect::<Result<Vec<_>>>()
        .map(Polygon::from_points)
}

fn parse_display(value: &str) -> Result<DisplayMapping> {
    let parts = value
        .split(',')
        .map(parse_coordinate)
        .collect::<Result<Vec<_>>>()?;
    let [x, y, width, height] = parts[..] else {
        bail!("display rectangle `{value}` needs exactly four values");
    };
    Ok(DisplayMapping::new(x, y, width, height))
}

fn parse_coordinate(value: &str) -> Result<f64> {
    let parsed: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("`{value}` is not a number"))?;
    if !parsed.is_finite() {
        bail!("`{value}` is not a finite number");
    }
    Ok(parsed)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
