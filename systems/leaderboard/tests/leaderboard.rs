use mask_trace_core::{Accuracy, Event, Money, PlayerId, PlayerProgress, SessionRecord};
use mask_trace_system_leaderboard::{
    KeyValueStore, Leaderboard, LeaderboardError, MemoryStore, StoreError, LEADERBOARD_KEY,
};

fn record(id: &str, micros: u64, level: u32, accuracies: &[f64]) -> SessionRecord {
    SessionRecord {
        player: PlayerId::new(id),
        progress: PlayerProgress {
            money: Money::from_micros(micros),
            successful_instances: 0,
            level,
            accuracies: accuracies.iter().copied().map(Accuracy::new).collect(),
        },
    }
}

struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Corrupt("disk on fire".to_owned()))
    }

    fn set(&mut self, _key: &str, _value: String) -> Result<(), StoreError> {
        Err(StoreError::Corrupt("read only".to_owned()))
    }
}

#[test]
fn upsert_merges_money_and_history() {
    let mut board = Leaderboard::new();
    board.upsert(&record("#AAAAAAAA", 32_000, 1, &[90.0, 70.0]), 1_000);
    board.upsert(&record("#AAAAAAAA", 16_000, 2, &[85.0]), 2_000);

    assert_eq!(board.len(), 1, "same worker shares one entry");
    let entry = board
        .entry(&PlayerId::new("#AAAAAAAA"))
        .expect("entry exists");
    assert_eq!(entry.total_money, Money::from_micros(48_000));
    assert_eq!(
        entry.accuracy_history,
        vec![Accuracy::new(90.0), Accuracy::new(70.0), Accuracy::new(85.0)]
    );
    assert_eq!(entry.average_accuracy, Accuracy::new(81.67));
    assert_eq!(entry.level, 2);
    assert_eq!(entry.last_updated_ms, 2_000);
}

#[test]
fn merged_level_never_drops() {
    let mut board = Leaderboard::new();
    board.upsert(&record("#LEVELLED", 0, 4, &[50.0]), 1);
    board.upsert(&record("#LEVELLED", 0, 1, &[50.0]), 2);

    let entry = board
        .entry(&PlayerId::new("#LEVELLED"))
        .expect("entry exists");
    assert_eq!(entry.level, 4);
}

#[test]
fn entries_rank_by_money_descending() {
    let mut board = Leaderboard::new();
    board.upsert(&record("#LOW00000", 5_000, 1, &[40.0]), 1);
    board.upsert(&record("#HIGH0000", 80_000, 2, &[95.0]), 2);
    board.upsert(&record("#MID00000", 40_000, 1, &[88.0]), 3);

    let ids: Vec<&str> = board.top(2).iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["#HIGH0000", "#MID00000"]);
    assert_eq!(board.rank(&PlayerId::new("#LOW00000")), Some(3));
    assert_eq!(board.rank(&PlayerId::new("#NOBODY00")), None);

    board.upsert(&record("#LOW00000", 100_000, 1, &[99.0]), 4);
    assert_eq!(board.rank(&PlayerId::new("#LOW00000")), Some(1));
}

#[test]
fn saved_board_loads_back() {
    let mut store = MemoryStore::new();
    let mut board = Leaderboard::new();
    board.upsert(&record("#SAVED000", 21_000, 1, &[92.5]), 7);
    board.save(&mut store).expect("memory store accepts writes");

    assert_eq!(Leaderboard::load(&store), board);
}

#[test]
fn missing_board_loads_empty() {
    assert!(Leaderboard::load(&MemoryStore::new()).is_empty());
}

#[test]
fn malformed_board_is_discarded() {
    let mut store = MemoryStore::new();
    store
        .set(LEADERBOARD_KEY, "{not json".to_owned())
        .expect("memory store accepts writes");
    assert!(Leaderboard::load(&store).is_empty());

    store
        .set(LEADERBOARD_KEY, r##"[{"id":"#X"}]"##.to_owned())
        .expect("memory store accepts writes");
    assert!(Leaderboard::load(&store).is_empty(), "incomplete entries are rejected");
}

#[test]
fn unreadable_store_loads_empty() {
    assert!(Leaderboard::load(&BrokenStore).is_empty());
}

#[test]
fn failing_store_surfaces_on_save() {
    let board = Leaderboard::new();
    let error = board.save(&mut BrokenStore).expect_err("store rejects writes");
    assert!(matches!(error, LeaderboardError::Store(StoreError::Corrupt(_))));
}

#[test]
fn handle_upserts_finished_sessions_only() {
    let mut board = Leaderboard::new();
    let events = vec![
        Event::LevelUnlocked { level: 2 },
        Event::SessionFinished {
            record: record("#EVENTED0", 16_000, 1, &[81.0]),
        },
    ];
    board.handle(&events, 99);

    assert_eq!(board.len(), 1);
    assert_eq!(board.entries()[0].last_updated_ms, 99);
}
