use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::warn;
use mask_trace_system_leaderboard::{KeyValueStore, StoreError};

/// Key-value store persisted as a single JSON object on disk.
#[derive(Debug)]
pub(crate) struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// Opens the store at `path`.
    ///
    /// A missing file is an empty store. Contents that are not a JSON object
    /// are discarded with a warning and replaced on the next write.
    pub(crate) fn open(path: &Path) -> Result<Self, StoreError> {
        let values = match fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|error| {
                warn!("discarding unreadable store {}: {error}", path.display());
                BTreeMap::new()
            }),
            Err(error) if error.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    /// Writes beside the store and renames over it so readers never see a
    /// partial file.
    fn flush(&self) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&self.values)
            .map_err(|error| StoreError::Corrupt(error.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, contents)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        let _ = self.values.insert(key.to_owned(), value);
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mask_trace_core::{PlayerId, PlayerProgress, SessionRecord};
    use mask_trace_system_leaderboard::Leaderboard;
    use std::{env, process};

    fn scratch_path(name: &str) -> PathBuf {
        env::temp_dir()
            .join(format!("mask-trace-store-{}", process::id()))
            .join(name)
    }

    #[test]
    fn values_survive_reopening() {
        let path = scratch_path("survive.json");
        let mut store = FileStore::open(&path).expect("missing file opens empty");
        assert_eq!(store.get("leaderboard").expect("readable"), None);

        store
            .set("leaderboard", "[]".to_owned())
            .expect("store writes");
        let reopened = FileStore::open(&path).expect("store reopens");
        assert_eq!(
            reopened.get("leaderboard").expect("readable"),
            Some("[]".to_owned())
        );

        fs::remove_file(&path).expect("scratch file is removable");
    }

    #[test]
    fn corrupt_file_opens_as_empty_leaderboard() {
        let path = scratch_path("corrupt.json");
        fs::create_dir_all(path.parent().expect("scratch dir")).expect("dir is writable");
        fs::write(&path, "{ truncated").expect("file is writable");

        let mut store = FileStore::open(&path).expect("corrupt contents do not abort opening");
        let mut leaderboard = Leaderboard::load(&store);
        assert!(leaderboard.is_empty(), "corrupt board must start empty");

        let record = SessionRecord {
            player: PlayerId::new("#RECOVER1"),
            progress: PlayerProgress::new(),
        };
        leaderboard.upsert(&record, 1);
        leaderboard.save(&mut store).expect("board saves over corrupt file");

        let reopened = FileStore::open(&path).expect("store reopens");
        let reloaded = Leaderboard::load(&reopened);
        assert_eq!(reloaded.len(), 1, "saved board replaces the corrupt contents");
        assert!(
            !path.with_extension("json.tmp").exists(),
            "staging file is renamed away"
        );

        fs::remove_file(&path).expect("scratch file is removable");
    }
}
