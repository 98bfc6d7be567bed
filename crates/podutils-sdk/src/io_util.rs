use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// File helpers for the shared pod volume.
///
/// Everything another container may observe is written with `write_atomic`:
/// a reader polling the destination path sees either nothing or the whole file.
pub struct IOUtil;

impl IOUtil {
    /// Write `contents` to `path` through a temporary file in the same
    /// directory, `fsync` it, and rename it into place.
    pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in '{}'", dir.display()))?;
        tmp.write_all(contents)
            .with_context(|| format!("Failed to write temporary file for '{}'", path.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync temporary file for '{}'", path.display()))?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to move temporary file onto '{}'", path.display()))?;

        Self::sync_directory(dir);
        Ok(())
    }

    /// Serialize `value` as pretty JSON and write it with `write_atomic`.
    pub fn save_object_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        Self::write_atomic(path, &json)
    }

    /// Persist the rename itself. Best effort: not every filesystem supports
    /// syncing a directory handle.
    #[cfg(unix)]
    fn sync_directory(dir: &Path) {
        if let Ok(handle) = fs::File::open(dir) {
            if let Err(e) = handle.sync_all() {
                tracing::debug!("Failed to sync directory '{}': {}", dir.display(), e);
            }
        }
    }

    #[cfg(not(unix))]
    fn sync_directory(_dir: &Path) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Record {
        name: String,
        count: u32,
    }

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");
        IOUtil::write_atomic(&path, b"first").unwrap();
        IOUtil::write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn write_atomic_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        IOUtil::write_atomic(&path, b"0").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn save_object_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        let original = Record {
            name: "test".into(),
            count: 7,
        };
        IOUtil::save_object_atomic(&path, &original).unwrap();
        let loaded: Record = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded, original);
    }
}
