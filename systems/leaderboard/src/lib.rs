#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Persistent leaderboard that merges finished sessions per worker.
//!
//! The board lives in an opaque [`KeyValueStore`] as a JSON array under
//! [`LEADERBOARD_KEY`]. Entries are kept sorted by total money, highest first.

mod store;

use log::{debug, warn};
use mask_trace_core::{Accuracy, Event, Money, PlayerId, SessionRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::{KeyValueStore, MemoryStore, StoreError};

/// Key the serialized board is stored under.
pub const LEADERBOARD_KEY: &str = "leaderboard";

/// Errors raised while persisting the board.
#[derive(Debug, Error)]
pub enum LeaderboardError {
    /// The board could not be encoded.
    #[error("failed to encode leaderboard: {0}")]
    Encode(#[from] serde_json::Error),
    /// The backing store rejected the write.
    #[error("failed to write leaderboard: {0}")]
    Store(#[from] StoreError),
}

/// Accumulated totals of one worker across every session they played.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Worker identifier.
    pub id: PlayerId,
    /// Highest level reached.
    pub level: u32,
    /// Money earned across sessions.
    pub total_money: Money,
    /// Mean over the full history, rounded to two decimals.
    pub average_accuracy: Accuracy,
    /// Accuracy of every scored instance in completion order.
    pub accuracy_history: Vec<Accuracy>,
    /// Milliseconds since the Unix epoch of the latest merge.
    pub last_updated_ms: u64,
}

impl LeaderboardEntry {
    fn from_record(record: &SessionRecord, now_ms: u64) -> Self {
        let history = record.progress.accuracies.clone();
        Self {
            id: record.player.clone(),
            level: record.progress.level,
            total_money: record.progress.money,
            average_accuracy: rounded_mean(&history),
            accuracy_history: history,
            last_updated_ms: now_ms,
        }
    }

    fn merge(&mut self, record: &SessionRecord, now_ms: u64) {
        self.total_money = self.total_money.saturating_add(record.progress.money);
        self.accuracy_history
            .extend_from_slice(&record.progress.accuracies);
        self.level = self.level.max(record.progress.level);
        self.average_accuracy = rounded_mean(&self.accuracy_history);
        self.last_updated_ms = now_ms;
    }
}

/// Ranked collection of [`LeaderboardEntry`] values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the board from `store`.
    ///
    /// Missing data yields an empty board. Unreadable or malformed data is
    /// discarded with a warning.
    #[must_use]
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let payload = match store.get(LEADERBOARD_KEY) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Self::new(),
            Err(error) => {
                warn!("could not read leaderboard, starting empty: {error}");
                return Self::new();
            }
        };

        match serde_json::from_str::<Vec<LeaderboardEntry>>(&payload) {
            Ok(entries) => {
                let mut board = Self { entries };
                board.sort();
                board
            }
            Err(error) => {
                warn!("discarding malformed leaderboard: {error}");
                Self::new()
            }
        }
    }

    /// Writes the board to `store`.
    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<(), LeaderboardError> {
        let payload = serde_json::to_string(&self.entries)?;
        store.set(LEADERBOARD_KEY, payload)?;
        Ok(())
    }

    /// Adds a finished session, merging it into the worker's existing entry.
    pub fn upsert(&mut self, record: &SessionRecord, now_ms: u64) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == record.player)
        {
            entry.merge(record, now_ms);
            debug!("merged session into leaderboard entry {}", record.player);
        } else {
            self.entries
                .push(LeaderboardEntry::from_record(record, now_ms));
            debug!("created leaderboard entry {}", record.player);
        }
        self.sort();
    }

    /// Upserts every finished session found in `events`.
    pub fn handle(&mut self, events: &[Event], now_ms: u64) {
        for event in events {
            if let Event::SessionFinished { record } = event {
                self.upsert(record, now_ms);
            }
        }
    }

    /// Highest earning entries, at most `count` of them.
    #[must_use]
    pub fn top(&self, count: usize) -> &[LeaderboardEntry] {
        &self.entries[..count.min(self.entries.len())]
    }

    /// Entry belonging to `id`.
    #[must_use]
    pub fn entry(&self, id: &PlayerId) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// One-based position of `id` in the ranking.
    #[must_use]
    pub fn rank(&self, id: &PlayerId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.id == id)
            .map(|index| index + 1)
    }

    /// Every entry in ranking order.
    #[must_use]
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    /// Number of ranked workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether nobody has been ranked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|left, right| right.total_money.cmp(&left.total_money));
    }
}

fn rounded_mean(history: &[Accuracy]) -> Accuracy {
    Accuracy::mean(history)
        .map(|mean| Accuracy::new((mean.get() * 100.0).round() / 100.0))
        .unwrap_or(Accuracy::ZERO)
}
