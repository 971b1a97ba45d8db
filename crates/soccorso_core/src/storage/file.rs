//! File-backed key-value store (native only).
//!
//! Each key maps to one `<key>.json` file in a directory. Writes go to a
//! uniquely named temporary file in the same directory and are renamed into
//! place, so a reader sees either the old document or the new one, never a
//! torn write, even with several writers in one process.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::KeyValueStore;
use crate::error::{Result, SoccorsoError};

/// Key-value store persisted as one file per key.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    /// Use `root` as the storage directory. It is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let write = || -> io::Result<()> {
            std::fs::create_dir_all(&self.root)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
            tmp.write_all(value.as_bytes())?;
            tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|source| SoccorsoError::StorageWrite {
            key: key.to_string(),
            source,
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("storage"));

        assert_eq!(store.get_item("soccorso-state").unwrap(), None);

        store.set_item("soccorso-state", r#"{"version":1}"#).unwrap();
        assert_eq!(
            store.get_item("soccorso-state").unwrap().as_deref(),
            Some(r#"{"version":1}"#)
        );
        assert!(dir.path().join("storage/soccorso-state.json").exists());

        store.remove_item("soccorso-state").unwrap();
        store.remove_item("soccorso-state").unwrap();
        assert_eq!(store.get_item("soccorso-state").unwrap(), None);
    }

    #[test]
    fn test_two_handles_share_directory() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileKeyValueStore::new(dir.path());
        let b = FileKeyValueStore::new(dir.path());

        a.set_item("k", "from a").unwrap();
        b.set_item("k", "from b").unwrap();
        assert_eq!(a.get_item("k").unwrap().as_deref(), Some("from b"));
    }

    #[test]
    fn test_concurrent_writers_never_fail_or_tear() {
        let dir = tempfile::tempdir().unwrap();
        let pad = "x".repeat(64 * 1024);
        let values: Vec<String> = (0..4)
            .map(|writer| format!(r#"{{"writer":{writer},"pad":"{pad}"}}"#))
            .collect();

        std::thread::scope(|scope| {
            for value in &values {
                let store = FileKeyValueStore::new(dir.path());
                scope.spawn(move || {
                    for _ in 0..50 {
                        store.set_item("soccorso-state", value).unwrap();
                    }
                });
            }
        });

        let stored = FileKeyValueStore::new(dir.path())
            .get_item("soccorso-state")
            .unwrap()
            .unwrap();
        assert!(values.contains(&stored));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_key_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path());
        store.set_item("../escape/key", "v").unwrap();
        assert!(dir.path().join(".._escape_key.json").exists());
        assert_eq!(store.get_item("../escape/key").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_write_failure_is_storage_write() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let store = FileKeyValueStore::new(&blocker);
        let err = store.set_item("k", "v").unwrap_err();
        assert!(matches!(err, SoccorsoError::StorageWrite { .. }));
    }
}
