use std::path::{Path, PathBuf};

use crate::engine::errors::EngineError;

use super::KeyValueBackend;

const TREE_PRIMARY: &str = "hunterlog";

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct SledStoreBuilder {
    path: PathBuf,
    flush_on_write: bool,
}

impl SledStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_on_write: true,
        }
    }

    /// Leave flushing to sled's background thread.
    pub fn without_flush(mut self) -> Self {
        self.flush_on_write = false;
        self
    }

    pub fn open(self) -> Result<SledStore, EngineError> {
        SledStore::open_with_options(self.path, self.flush_on_write)
    }
}

/// Sled-backed persistence: one tree, one entry per key.
pub struct SledStore {
    _db: sled::Db,
    primary: sled::Tree,
    flush_on_write: bool,
}

impl SledStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        Self::open_with_options(path, true)
    }

    fn open_with_options<P: AsRef<Path>>(
        path: P,
        flush_on_write: bool,
    ) -> Result<Self, EngineError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let primary = db.open_tree(TREE_PRIMARY)?;
        Ok(Self {
            _db: db,
            primary,
            flush_on_write,
        })
    }

    /// Keys currently present, in byte order.
    pub fn list_keys(&self) -> Result<Vec<String>, EngineError> {
        let mut keys = Vec::new();
        for entry in self.primary.iter() {
            let (key, _) = entry?;
            keys.push(String::from_utf8(key.to_vec())?);
        }
        Ok(keys)
    }
}

impl KeyValueBackend for SledStore {
    fn raw_get(&self, key: &str) -> Result<Option<String>, EngineError> {
        match self.primary.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec())?)),
            None => Ok(None),
        }
    }

    fn raw_put(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.primary.insert(key.as_bytes(), value.as_bytes())?;
        if self.flush_on_write {
            self.primary.flush()?;
        }
        Ok(())
    }

    fn raw_remove(&self, key: &str) -> Result<(), EngineError> {
        self.primary.remove(key.as_bytes())?;
        if self.flush_on_write {
            self.primary.flush()?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn store_round_trip_value() {
        let dir = TempDir::new().expect("tempdir");
        let store = SledStoreBuilder::new(dir.path()).open().expect("store");
        store.raw_put("quests_v1", "[]").expect("put");
        assert_eq!(store.raw_get("quests_v1").expect("get").as_deref(), Some("[]"));
        assert_eq!(store.raw_get("missing").expect("get"), None);
        assert_eq!(store.list_keys().expect("keys"), vec!["quests_v1".to_string()]);
        store.raw_remove("quests_v1").expect("remove");
        assert_eq!(store.raw_get("quests_v1").expect("get"), None);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = SledStoreBuilder::new(dir.path()).open().expect("store");
            store.raw_put("last_rollover_v1", "2024-01-03").expect("put");
        }
        let store = SledStoreBuilder::new(dir.path())
            .without_flush()
            .open()
            .expect("reopen store");
        assert_eq!(
            store.raw_get("last_rollover_v1").expect("get").as_deref(),
            Some("2024-01-03")
        );
    }
}
