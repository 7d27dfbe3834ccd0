//! Filesystem tier.

use crate::types::{CacheKey, ENTRY_EXTENSION, EntryInfo};
use cellcache_core::{Error, Result};
use chrono::{DateTime, Utc};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of in-flight temp files; they are never listed as entries.
const PARTIAL_PREFIX: &str = ".partial-";

/// One file per entry directly under a caller-owned root directory.
///
/// Writes go to a temp file in the same directory and are renamed into
/// place, so readers only ever see complete entries.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store on an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Configuration(format!(
                "local cache root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Check if an entry exists.
    pub fn has(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_file()
    }

    /// Read an entry; a missing entry is [`Error::NotFound`].
    pub fn get(&self, key: &CacheKey) -> Result<Vec<u8>> {
        match std::fs::read(self.entry_path(key)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Write an entry atomically, replacing any previous content.
    pub fn put(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.entry_path(key)).map_err(|e| Error::Io(e.error))?;

        debug!(key = %key, size = data.len(), "Wrote local entry");
        Ok(())
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        match std::fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List entry keys, sorted.
    pub fn list(&self) -> Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self.scan()?.into_iter().map(|(key, _)| key).collect();
        keys.sort();
        Ok(keys)
    }

    /// List entries with size and modification time, sorted by key.
    pub fn entries(&self) -> Result<Vec<EntryInfo>> {
        let mut entries = Vec::new();
        for (key, path) in self.scan()? {
            let metadata = match std::fs::metadata(&path) {
                Ok(m) => m,
                // Removed since the scan
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let modified_at: DateTime<Utc> = metadata.modified()?.into();
            entries.push(EntryInfo {
                key,
                size_bytes: metadata.len(),
                modified_at,
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Remove every entry. The root directory itself stays.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for (_, path) in self.scan()? {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn scan(&self) -> Result<Vec<(CacheKey, PathBuf)>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(CacheKey::from_file_name) {
                found.push((key, path));
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_key;
    use cellcache_core::CallArgs;

    fn key(name: &str) -> CacheKey {
        derive_key(name, &CallArgs::new()).unwrap()
    }

    #[test]
    fn test_open_requires_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalStore::open(dir.path()).is_ok());

        let missing = dir.path().join("missing");
        let err = LocalStore::open(&missing).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(!missing.exists());
    }

    #[test]
    fn test_put_get_has() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let k = key("compute");

        assert!(!store.has(&k));
        assert!(matches!(store.get(&k), Err(Error::NotFound(_))));

        store.put(&k, b"first").unwrap();
        store.put(&k, b"second").unwrap();
        assert!(store.has(&k));
        assert_eq!(store.get(&k).unwrap(), b"second");
    }

    #[test]
    fn test_put_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.put(&key("a"), b"data").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".bin"));
    }

    #[test]
    fn test_list_ignores_foreign_and_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.put(&key("b"), b"2").unwrap();
        store.put(&key("a"), b"1").unwrap();
        std::fs::write(dir.path().join(".partial-x.tmp"), b"junk").unwrap();
        std::fs::write(dir.path().join("README.md"), b"notes").unwrap();
        std::fs::create_dir(dir.path().join("nested.bin")).unwrap();

        let keys = store.list().unwrap();
        assert_eq!(keys, vec![key("a"), key("b")]);

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].size_bytes, 1);
    }

    #[test]
    fn test_clear_keeps_root_usable() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.put(&key("a"), b"1").unwrap();
        store.put(&key("b"), b"2").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(dir.path().is_dir());
        assert!(store.list().unwrap().is_empty());

        store.put(&key("a"), b"again").unwrap();
        assert_eq!(store.get(&key("a")).unwrap(), b"again");
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.put(&key("a"), b"1").unwrap();
        assert!(store.remove(&key("a")).unwrap());
        assert!(!store.remove(&key("a")).unwrap());
    }
}
