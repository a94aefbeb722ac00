//! One file per key under a data directory.
//!
//! Writes take an exclusive fs2 lock on the destination, write a temp file
//! beside it and rename it into place. Reads take a shared lock.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::engine::errors::EngineError;

use super::KeyValueBackend;

pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, EngineError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", safe_filename(key)))
    }
}

/// Keep only characters that are safe in a file name.
fn safe_filename(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn write_file_locked(path: &Path, content: &str) -> Result<(), EngineError> {
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    lock_file.lock_exclusive()?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("data.json");
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                tmp.write_all(content.as_bytes())?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
            }
            Err(e) => return Err(e.into()),
        }
    };

    fs::rename(&tmp_path, path)?;
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    drop(lock_file);
    Ok(())
}

impl KeyValueBackend for FileStore {
    fn raw_get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let path = self.path_for(key);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        drop(file);
        Ok(Some(content))
    }

    fn raw_put(&self, key: &str, value: &str) -> Result<(), EngineError> {
        write_file_locked(&self.path_for(key), value)
    }

    fn raw_remove(&self, key: &str) -> Result<(), EngineError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_read_remove() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::open(dir.path().join("data")).expect("store");
        store.raw_put("habits_v1", "[{\"id\":\"h1\"}]").expect("put");
        store.raw_put("habits_v1", "[]").expect("overwrite");
        assert_eq!(store.raw_get("habits_v1").expect("get").as_deref(), Some("[]"));
        assert!(store.data_dir().join("habits_v1.json").exists());
        store.raw_remove("habits_v1").expect("remove");
        store.raw_remove("habits_v1").expect("remove twice");
        assert_eq!(store.raw_get("habits_v1").expect("get"), None);
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        assert_eq!(safe_filename("../etc/passwd"), "___etc_passwd");
        assert_eq!(safe_filename(""), "_");
    }
}
