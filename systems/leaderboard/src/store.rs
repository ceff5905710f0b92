use std::collections::HashMap;

use thiserror::Error;

/// Failure reported by a key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The backend holds data it cannot interpret.
    #[error("store backend is corrupt: {0}")]
    Corrupt(String),
}

/// Opaque string key-value persistence used by the leaderboard.
pub trait KeyValueStore {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Volatile store backed by a hash map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        let _ = self.values.insert(key.to_owned(), value);
        Ok(())
    }
}
