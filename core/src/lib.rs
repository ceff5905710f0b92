#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Mask Trace annotation engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative session, and pure systems. Adapters submit [`Command`] values
//! describing worker input, clock ticks and asset arrivals; the session
//! executes those commands via its `apply` entry point and broadcasts
//! [`Event`] values that hosts render and persistence collaborators consume.
//! Systems (rasterizer, scorer, progression, schedule, leaderboard) operate on
//! the plain data types declared here.

use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Brightness above which a mask pixel counts as ground-truth coverage.
pub const MASK_BRIGHTNESS_THRESHOLD: u16 = 127;

/// Default penalty applied to ground-truth pixels the polygon missed.
pub const DEFAULT_FALSE_NEGATIVE_WEIGHT: f64 = 1.0;

/// Default penalty applied to polygon pixels outside the ground truth.
pub const DEFAULT_FALSE_POSITIVE_WEIGHT: f64 = 0.8;

const MICROS_PER_DOLLAR: u64 = 1_000_000;

/// Commands that express all permissible session mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Leaves the lobby and activates the first scheduled task.
    StartSession,
    /// Records the rectangle the task image was drawn at on the latest frame.
    SetDisplayMapping {
        /// Screen rectangle occupied by the task image.
        mapping: DisplayMapping,
    },
    /// Delivers the decoded ground-truth mask for a task.
    MaskLoaded {
        /// Task the mask belongs to.
        task: TaskIndex,
        /// Decoded mask shared with the active instance.
        mask: Arc<Bitmap>,
    },
    /// Reports that the mask for a task could not be loaded.
    MaskFailed {
        /// Task whose mask failed to load.
        task: TaskIndex,
    },
    /// Appends a vertex to the active polygon.
    AddPoint {
        /// Clicked position in display space.
        point: Point,
    },
    /// Removes every vertex from the active polygon.
    ClearPoints,
    /// Submits the active polygon before the timer expires.
    Submit,
    /// Advances the session clock to the provided monotonic timestamp.
    Tick {
        /// Time elapsed since the host clock started.
        now: Duration,
    },
    /// Dismisses the level unlock presentation early.
    SkipLevelUnlock,
    /// Moves from the result presentation to the next task.
    Continue,
    /// Ends the session and claims everything earned so far.
    ExitAndClaim,
}

/// Events broadcast by the session after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that the worker left the lobby.
    SessionStarted {
        /// Worker the session belongs to.
        player: PlayerId,
    },
    /// Announces that a new instance became the active task.
    InstanceActivated {
        /// Position of the task within the schedule.
        task: TaskIndex,
        /// Image, mask and duration of the task.
        spec: TaskSpec,
    },
    /// Confirms that the first vertex started the instance timer.
    InstanceStarted {
        /// Task whose timer started.
        task: TaskIndex,
        /// Full duration granted to the task.
        duration: Duration,
    },
    /// Confirms that a vertex was appended to the polygon.
    PointAdded {
        /// Task receiving the vertex.
        task: TaskIndex,
        /// Vertex appended in display space.
        point: Point,
    },
    /// Confirms that the polygon was emptied.
    PointsCleared {
        /// Task whose polygon was cleared.
        task: TaskIndex,
    },
    /// Reports that an instance reached its terminal scored state.
    InstanceScored {
        /// Task that was scored.
        task: TaskIndex,
        /// Accuracy of the traced polygon.
        accuracy: Accuracy,
        /// Early completion bonus earned, before accuracy gating.
        bonus: Money,
    },
    /// Reports that an untouched instance was dropped without a score.
    InstanceSkipped {
        /// Task that was skipped.
        task: TaskIndex,
    },
    /// Publishes the reward computed for a scored instance.
    RewardGranted {
        /// Task the reward belongs to.
        task: TaskIndex,
        /// Reward breakdown.
        result: ScoredResult,
    },
    /// Reports progression after a reward without a level change.
    ProgressUpdated {
        /// Level after the update.
        level: u32,
        /// Accuracy-qualifying instances completed so far.
        successful_instances: u32,
    },
    /// Reports that the worker reached a new level.
    LevelUnlocked {
        /// Level that became available.
        level: u32,
    },
    /// Announces that the session entered a new phase.
    PhaseChanged {
        /// Phase that became active.
        phase: SessionPhase,
    },
    /// Publishes the final record of a session for persistence.
    SessionFinished {
        /// Totals accumulated by the worker.
        record: SessionRecord,
    },
}

/// Coarse phases of a play session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Waiting for the worker to start.
    Lobby,
    /// An instance is active and accepts input.
    Annotating,
    /// The last instance's reward is presented.
    ShowingResult,
    /// A freshly unlocked level is presented.
    LevelUnlock,
    /// The session ended; no further tasks are activated.
    Finished,
}

/// Lifecycle states of a single annotation instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstanceState {
    /// No vertex placed yet; the timer has not started.
    Idle,
    /// The timer is running and vertices may be added.
    Armed,
    /// Terminal state; accuracy has been computed.
    Scored,
}

/// State of an instance's countdown timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerState {
    /// Waiting for the first vertex.
    NotStarted,
    /// Counting down.
    Running,
    /// Reached zero on its own.
    Expired,
    /// Halted by an early submission.
    Stopped,
}

/// Position of a task within the session schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskIndex(u32);

impl TaskIndex {
    /// Creates a new task index with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the index.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Index of the task that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for TaskIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.saturating_add(1))
    }
}

/// Identifier shown to and chosen for a worker.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wraps the provided identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrows the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Description of one scheduled annotation task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Image shown to the worker.
    pub image: PathBuf,
    /// Ground-truth mask the polygon is scored against.
    pub mask: PathBuf,
    /// Time granted once the first vertex is placed.
    pub duration: Duration,
}

/// Position expressed in display space.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    x: f64,
    y: f64,
}

impl Point {
    /// Creates a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Horizontal coordinate.
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.x
    }

    /// Vertical coordinate.
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.y
    }
}

/// Pair of vertex indices joined by a drawn edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Index of the edge's starting vertex.
    pub from: usize,
    /// Index of the edge's ending vertex.
    pub to: usize,
}

/// Ordered vertices traced by the worker.
///
/// Fewer than three vertices form an open path without interior. From three
/// vertices on the polygon is closed by an implicit edge from the last vertex
/// back to the first.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    /// Creates an empty polygon.
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Creates a polygon from vertices in drawing order.
    #[must_use]
    pub fn from_points(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Appends a vertex.
    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Removes every vertex.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Vertices in drawing order.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Reports whether no vertex has been placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Reports whether the polygon encloses an interior.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.points.len() >= 3
    }

    /// Edges a renderer should stroke, including the closing edge.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        let count = self.points.len();
        let mut edges: Vec<Edge> = (1..count)
            .map(|to| Edge { from: to - 1, to })
            .collect();
        if self.is_closed() {
            edges.push(Edge {
                from: count - 1,
                to: 0,
            });
        }
        edges
    }
}

/// Screen rectangle at which the task image was last drawn.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayMapping {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl DisplayMapping {
    /// Creates a mapping from the drawn rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Computes the rectangle of an image scaled uniformly to `fill_ratio` of
    /// the viewport and centred within it.
    ///
    /// Images without area produce an empty mapping, which converts points
    /// unchanged.
    #[must_use]
    pub fn fit_centered(
        viewport_width: f64,
        viewport_height: f64,
        image_width: u32,
        image_height: u32,
        fill_ratio: f64,
    ) -> Self {
        if image_width == 0 || image_height == 0 {
            return Self::default();
        }

        let image_width = f64::from(image_width);
        let image_height = f64::from(image_height);
        let scale = (viewport_width / image_width).min(viewport_height / image_height) * fill_ratio;
        let width = image_width * scale;
        let height = image_height * scale;
        Self {
            x: viewport_width / 2.0 - width / 2.0,
            y: viewport_height / 2.0 - height / 2.0,
            width,
            height,
        }
    }

    /// Left edge of the drawn image.
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.x
    }

    /// Top edge of the drawn image.
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.y
    }

    /// Drawn width of the image.
    #[must_use]
    pub const fn width(&self) -> f64 {
        self.width
    }

    /// Drawn height of the image.
    #[must_use]
    pub const fn height(&self) -> f64 {
        self.height
    }

    /// Converts a display-space point into the pixel space of a mask with the
    /// provided dimensions.
    ///
    /// Each axis is interpolated independently. An axis whose drawn extent is
    /// not strictly positive passes its coordinate through unchanged.
    #[must_use]
    pub fn to_mask_space(&self, point: Point, mask_width: u32, mask_height: u32) -> Point {
        let x = if self.width > 0.0 {
            (point.x - self.x) / self.width * f64::from(mask_width)
        } else {
            point.x
        };
        let y = if self.height > 0.0 {
            (point.y - self.y) / self.height * f64::from(mask_height)
        } else {
            point.y
        };
        Point::new(x, y)
    }
}

/// Dense boolean raster used for masks and rasterized polygons.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Bitmap {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

/// Errors raised while constructing a [`Bitmap`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitmapError {
    /// The requested dimensions do not fit in memory.
    #[error("bitmap dimensions {width}x{height} overflow addressable memory")]
    TooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// The pixel buffer length does not match the dimensions.
    #[error("expected {expected} bytes of pixel data, found {actual}")]
    LengthMismatch {
        /// Bytes required by the dimensions.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
}

impl Bitmap {
    /// Creates an all-false bitmap.
    pub fn blank(width: u32, height: u32) -> Result<Self, BitmapError> {
        let len = cell_count(width, height)?;
        Ok(Self {
            width,
            height,
            cells: vec![false; len],
        })
    }

    /// Creates a bitmap from row-major cells.
    pub fn from_cells(width: u32, height: u32, cells: Vec<bool>) -> Result<Self, BitmapError> {
        let expected = cell_count(width, height)?;
        if cells.len() != expected {
            return Err(BitmapError::LengthMismatch {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Decodes a mask from row-major RGBA8 pixels.
    ///
    /// A pixel is set when the mean of its colour channels exceeds
    /// [`MASK_BRIGHTNESS_THRESHOLD`]; alpha is ignored.
    pub fn from_rgba(width: u32, height: u32, pixels: &[u8]) -> Result<Self, BitmapError> {
        let len = cell_count(width, height)?;
        let expected = len
            .checked_mul(4)
            .ok_or(BitmapError::TooLarge { width, height })?;
        if pixels.len() != expected {
            return Err(BitmapError::LengthMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        let cells = pixels
            .chunks_exact(4)
            .map(|pixel| {
                let sum = u16::from(pixel[0]) + u16::from(pixel[1]) + u16::from(pixel[2]);
                sum > MASK_BRIGHTNESS_THRESHOLD * 3
            })
            .collect();
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Provides the dimensions as `(width, height)`.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the cell value, or `None` outside the grid.
    #[must_use]
    pub fn get(&self, column: u32, row: u32) -> Option<bool> {
        self.index(column, row)
            .and_then(|index| self.cells.get(index).copied())
    }

    /// Updates a cell; coordinates outside the grid are ignored.
    pub fn set(&mut self, column: u32, row: u32, value: bool) {
        if let Some(index) = self.index(column, row) {
            if let Some(cell) = self.cells.get_mut(index) {
                *cell = value;
            }
        }
    }

    /// Mutable access to one row of cells.
    pub fn row_mut(&mut self, row: u32) -> Option<&mut [bool]> {
        if row >= self.height {
            return None;
        }
        let width = usize::try_from(self.width).ok()?;
        let start = usize::try_from(row).ok()?.checked_mul(width)?;
        self.cells.get_mut(start..start + width)
    }

    /// Row-major view of every cell.
    #[must_use]
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Counts the cells that are set.
    #[must_use]
    pub fn count_set(&self) -> u64 {
        self.cells.iter().filter(|cell| **cell).count() as u64
    }

    fn index(&self, column: u32, row: u32) -> Option<usize> {
        if column < self.width && row < self.height {
            let row = usize::try_from(row).ok()?;
            let column = usize::try_from(column).ok()?;
            let width = usize::try_from(self.width).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }
}

fn cell_count(width: u32, height: u32) -> Result<usize, BitmapError> {
    let count = u64::from(width) * u64::from(height);
    usize::try_from(count).map_err(|_| BitmapError::TooLarge { width, height })
}

/// Non-negative amount of money stored in millionths of a dollar.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// No money at all.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from millionths of a dollar.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Converts a dollar amount, rounding to the nearest micro.
    ///
    /// Negative and non-finite inputs saturate to zero.
    #[must_use]
    pub fn from_dollars(dollars: f64) -> Self {
        if !dollars.is_finite() || dollars <= 0.0 {
            return Self::ZERO;
        }
        let micros = (dollars * MICROS_PER_DOLLAR as f64).round();
        if micros >= u64::MAX as f64 {
            Self(u64::MAX)
        } else {
            Self(micros as u64)
        }
    }

    /// Amount in millionths of a dollar.
    #[must_use]
    pub const fn micros(&self) -> u64 {
        self.0
    }

    /// Amount in dollars.
    #[must_use]
    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / MICROS_PER_DOLLAR as f64
    }

    /// Reports whether the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, saturating at the maximum representable value.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.3}", self.as_dollars())
    }
}

/// Accuracy percentage clamped to `0..=100`.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Accuracy(f64);

impl Accuracy {
    /// Lowest representable accuracy.
    pub const ZERO: Self = Self(0.0);
    /// Highest representable accuracy.
    pub const PERFECT: Self = Self(100.0);

    /// Creates an accuracy, clamping into range. Non-finite values become zero.
    #[must_use]
    pub fn new(percent: f64) -> Self {
        if percent.is_finite() {
            Self(percent.clamp(0.0, 100.0))
        } else {
            Self::ZERO
        }
    }

    /// Percentage value.
    #[must_use]
    pub const fn get(&self) -> f64 {
        self.0
    }

    /// Computes the mean of the provided accuracies.
    #[must_use]
    pub fn mean(values: &[Accuracy]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sum: f64 = values.iter().map(Accuracy::get).sum();
        Some(Self::new(sum / values.len() as f64))
    }
}

impl From<f64> for Accuracy {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Accuracy> for f64 {
    fn from(value: Accuracy) -> Self {
        value.0
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

/// Formula used to turn overlap counts into an accuracy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Weighted intersection over union that charges missed and extra pixels
    /// separately.
    WeightedOverlap {
        /// Weight of ground-truth pixels the polygon missed.
        false_negative_weight: f64,
        /// Weight of polygon pixels outside the ground truth.
        false_positive_weight: f64,
    },
    /// Recall minus the share of background pixels the polygon covered.
    PrecisionPenalized,
}

impl Default for ScoringStrategy {
    fn default() -> Self {
        Self::WeightedOverlap {
            false_negative_weight: DEFAULT_FALSE_NEGATIVE_WEIGHT,
            false_positive_weight: DEFAULT_FALSE_POSITIVE_WEIGHT,
        }
    }
}

/// Reward and levelling constants.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardConfig {
    /// Paid for every instance that meets the accuracy threshold.
    pub reward_per_task: Money,
    /// Minimum accuracy an instance needs to pay out.
    pub accuracy_threshold: Accuracy,
    /// Paid on top of the base reward for qualifying early submissions.
    pub time_bonus_reward: Money,
    /// Remaining time an early submission must exceed to earn the bonus.
    pub time_bonus_threshold: Duration,
    /// Qualifying instances needed per level.
    pub images_per_level: u32,
    /// Highest reachable level.
    pub max_level: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            reward_per_task: Money::from_micros(16_000),
            accuracy_threshold: Accuracy::new(80.0),
            time_bonus_reward: Money::from_micros(5_000),
            time_bonus_threshold: Duration::from_millis(5_000),
            images_per_level: 7,
            max_level: 5,
        }
    }
}

/// Reward breakdown of one scored instance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    /// Accuracy the reward was computed from.
    pub accuracy: Accuracy,
    /// Reward for meeting the accuracy threshold.
    pub base_reward: Money,
    /// Early completion bonus actually paid.
    pub time_bonus: Money,
    /// Sum of base reward and paid bonus.
    pub total_reward: Money,
}

/// Totals accumulated by a worker during a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerProgress {
    /// Money earned so far.
    pub money: Money,
    /// Instances that met the accuracy threshold.
    pub successful_instances: u32,
    /// Current level, starting at one.
    pub level: u32,
    /// Accuracy of every scored instance in completion order.
    pub accuracies: Vec<Accuracy>,
}

impl PlayerProgress {
    /// Progress of a worker who has not completed anything yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            money: Money::ZERO,
            successful_instances: 0,
            level: 1,
            accuracies: Vec::new(),
        }
    }

    /// Number of scored instances.
    #[must_use]
    pub fn instances_completed(&self) -> usize {
        self.accuracies.len()
    }

    /// Mean accuracy over every scored instance.
    #[must_use]
    pub fn average_accuracy(&self) -> Option<Accuracy> {
        Accuracy::mean(&self.accuracies)
    }
}

impl Default for PlayerProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Final outcome of a session handed to the leaderboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Worker the record belongs to.
    pub player: PlayerId,
    /// Totals accumulated during the session.
    pub progress: PlayerProgress,
}
