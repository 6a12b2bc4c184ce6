//! Crash-safe JSON documents for the local ticket store.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PersistenceError, Result};

/// Replaces `path` with `data` in one rename.
///
/// The bytes go to a temp file in the same directory first, so a reader sees
/// either the previous document or the new one, never a partial write.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| PersistenceError::DirectoryError {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let write_err = |source: std::io::Error| PersistenceError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(data).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

/// Reads a JSON document, falling back to `T::default()` when the file is
/// missing or empty.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(PersistenceError::ReadError {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if data.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/nested/tickets.json");

        atomic_write(&path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_atomic_write_replaces_existing_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tickets.json");

        let mut doc = BTreeMap::new();
        doc.insert("acme".to_string(), 1);
        atomic_write_json(&path, &doc).unwrap();
        doc.insert("acme".to_string(), 2);
        atomic_write_json(&path, &doc).unwrap();

        let loaded: BTreeMap<String, i32> = read_json_or_default(&path).unwrap();
        assert_eq!(loaded["acme"], 2);
    }

    #[test]
    fn test_missing_or_empty_file_reads_as_default() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let empty = dir.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();

        let a: BTreeMap<String, i32> = read_json_or_default(&missing).unwrap();
        let b: BTreeMap<String, i32> = read_json_or_default(&empty).unwrap();
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();

        let result: Result<BTreeMap<String, i32>> = read_json_or_default(&path);
        assert!(matches!(result, Err(PersistenceError::Json(_))));
    }
}
