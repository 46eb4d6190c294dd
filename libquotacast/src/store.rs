//! Whole-file JSON persistence and the single-run lock
//!
//! State files are always read and written as a whole. Writes go to a sibling
//! temporary file which is then renamed over the target, so a crash mid-write
//! leaves the previous state intact.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::StoreError;

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a JSON state file
///
/// Returns `Ok(None)` when the file does not exist. A file that exists but
/// cannot be parsed is reported as `StoreError::Corrupt`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Atomically replace a JSON state file
///
/// Creates parent directories if needed.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = sibling(path, "tmp");

    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| io_error(&tmp_path, e))?;
        file.sync_all().map_err(|e| io_error(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

/// Path of the lock file guarding a state file
pub fn lock_path_for(state_path: &Path) -> PathBuf {
    sibling(state_path, "lock")
}

/// Exclusive lock held for the whole load, mutate, persist sequence
///
/// Backed by a lock file created with `create_new`, so two runs racing for it
/// cannot both succeed. Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock
    ///
    /// A lock file older than `stale_after` is assumed to belong to a crashed
    /// run and is replaced.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
        }

        match Self::create(path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if Self::is_stale(path, stale_after) {
                    tracing::warn!(path = %path.display(), "Removing stale run lock");
                    fs::remove_file(path).map_err(|e| io_error(path, e))?;
                    Self::create(path).map_err(|e| match e.kind() {
                        std::io::ErrorKind::AlreadyExists => StoreError::Locked(path.to_path_buf()),
                        _ => io_error(path, e),
                    })
                } else {
                    Err(StoreError::Locked(path.to_path_buf()))
                }
            }
            Err(e) => Err(io_error(path, e)),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn is_stale(path: &Path, stale_after: Duration) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age > stale_after)
            .unwrap_or(false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "Failed to release run lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let result: Option<Sample> = read_json(&temp_dir.path().join("absent.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_write_creates_parent_dirs_and_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("state.json");

        write_json_atomic(&path, &Sample { count: 7 }).unwrap();

        let loaded: Sample = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, Sample { count: 7 });
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let result: Result<Option<Sample>, _> = read_json(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let path = lock_path_for(&temp_dir.path().join("usage_data.json"));
        let stale_after = Duration::from_secs(3600);

        let lock = RunLock::acquire(&path, stale_after).unwrap();
        assert!(path.exists());
        assert!(matches!(
            RunLock::acquire(&path, stale_after),
            Err(StoreError::Locked(_))
        ));

        drop(lock);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path, stale_after).is_ok());
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.lock");
        fs::write(&path, "12345\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let lock = RunLock::acquire(&path, Duration::from_millis(1));
        assert!(lock.is_ok(), "stale lock should be taken over");
    }

    #[test]
    fn test_lock_path_is_sibling() {
        let path = lock_path_for(Path::new("/var/lib/quotacast/usage_data.json"));
        assert_eq!(path, PathBuf::from("/var/lib/quotacast/usage_data.json.lock"));
    }
}
