//! Duplicate content detection
//!
//! Content is fingerprinted by hashing a fixed-length prefix, so candidates
//! that differ only in their tail (different trailing hashtags, for instance)
//! are still caught. The index keeps only the most recent fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store;

/// Number of leading characters that are fingerprinted
pub const FINGERPRINT_PREFIX_CHARS: usize = 100;
pub const DEFAULT_DUPLICATE_RETENTION: usize = 100;

/// Hex SHA-256 of the first [`FINGERPRINT_PREFIX_CHARS`] characters
pub fn fingerprint(content: &str) -> String {
    let prefix: String = content.chars().take(FINGERPRINT_PREFIX_CHARS).collect();
    format!("{:x}", Sha256::digest(prefix.as_bytes()))
}

/// Fingerprints ordered oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuplicateIndex {
    fingerprints: VecDeque<String>,
}

impl DuplicateIndex {
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.fingerprints.iter().any(|f| f == fingerprint)
    }

    /// Register `fingerprint` unless already present
    ///
    /// Returns `true` when it was a duplicate, in which case the index is left
    /// untouched. Otherwise inserts it and evicts the oldest entries beyond
    /// `retention`.
    pub fn check_and_insert(&mut self, fingerprint: &str, retention: usize) -> bool {
        if self.contains(fingerprint) {
            return true;
        }

        self.fingerprints.push_back(fingerprint.to_string());
        while self.fingerprints.len() > retention {
            self.fingerprints.pop_front();
        }
        false
    }
}

/// File-backed duplicate filter
pub struct DuplicateFilter {
    path: PathBuf,
    index: DuplicateIndex,
    retention: usize,
}

impl DuplicateFilter {
    /// Open the persisted index
    ///
    /// A missing file starts an empty index. A corrupted file is logged and
    /// replaced by an empty index on the next insert.
    pub fn open(path: impl Into<PathBuf>, retention: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let index = match store::read_json::<DuplicateIndex>(&path) {
            Ok(Some(index)) => index,
            Ok(None) => DuplicateIndex::default(),
            Err(StoreError::Corrupt { reason, .. }) => {
                warn!(path = %path.display(), "Corrupted duplicate index, starting empty: {}", reason);
                DuplicateIndex::default()
            }
            Err(e) => return Err(e),
        };

        debug!(entries = index.len(), "Loaded duplicate index");
        Ok(Self {
            path,
            index,
            retention,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &DuplicateIndex {
        &self.index
    }

    /// Check `content` and register it if novel
    ///
    /// Novel content is persisted immediately. A persistence failure is logged
    /// but does not change the answer.
    pub fn is_duplicate(&mut self, content: &str) -> bool {
        let fingerprint = fingerprint(content);
        if self.index.check_and_insert(&fingerprint, self.retention) {
            debug!(%fingerprint, "Duplicate content fingerprint");
            return true;
        }

        if let Err(e) = store::write_json_atomic(&self.path, &self.index) {
            warn!(path = %self.path.display(), "Failed to persist duplicate index: {}", e);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_uses_prefix_only() {
        let body = "a".repeat(FINGERPRINT_PREFIX_CHARS);
        assert_eq!(
            fingerprint(&format!("{} #one", body)),
            fingerprint(&format!("{} #two", body))
        );
        assert_ne!(fingerprint("short #one"), fingerprint("short #two"));
    }

    #[test]
    fn test_fingerprint_prefix_is_character_based() {
        let body = "→".repeat(FINGERPRINT_PREFIX_CHARS);
        assert_eq!(fingerprint(&body), fingerprint(&format!("{}tail", body)));
        assert_eq!(fingerprint("").len(), 64);
    }

    #[test]
    fn test_second_check_reports_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let mut filter =
            DuplicateFilter::open(temp_dir.path().join("hashes.json"), DEFAULT_DUPLICATE_RETENTION)
                .unwrap();

        assert!(!filter.is_duplicate("Write tomorrow's top task tonight."));
        assert!(filter.is_duplicate("Write tomorrow's top task tonight."));
        assert_eq!(filter.index().len(), 1);
    }

    #[test]
    fn test_oldest_entry_evicted_after_retention() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hashes.json");
        let mut filter = DuplicateFilter::open(&path, DEFAULT_DUPLICATE_RETENTION).unwrap();

        for i in 0..=DEFAULT_DUPLICATE_RETENTION {
            assert!(!filter.is_duplicate(&format!("content number {}", i)));
        }
        assert_eq!(filter.index().len(), DEFAULT_DUPLICATE_RETENTION);

        // Entry 0 was evicted; entry 1 is still remembered
        assert!(!filter.is_duplicate("content number 0"));
        let mut reopened = DuplicateFilter::open(&path, DEFAULT_DUPLICATE_RETENTION).unwrap();
        assert!(reopened.is_duplicate("content number 2"));
    }

    #[test]
    fn test_index_persists_across_opens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hashes.json");

        let mut first = DuplicateFilter::open(&path, 10).unwrap();
        assert!(!first.is_duplicate("Batch your email twice a day."));

        let mut second = DuplicateFilter::open(&path, 10).unwrap();
        assert!(second.is_duplicate("Batch your email twice a day."));
    }

    #[test]
    fn test_corrupt_index_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hashes.json");
        std::fs::write(&path, "not json at all").unwrap();

        let mut filter = DuplicateFilter::open(&path, 10).unwrap();
        assert!(filter.index().is_empty());
        assert!(!filter.is_duplicate("fresh"));

        let persisted: DuplicateIndex = store::read_json(&path).unwrap().unwrap();
        assert_eq!(persisted.len(), 1);
    }

    #[test]
    fn test_duplicate_check_leaves_index_unchanged() {
        let mut index = DuplicateIndex::default();
        assert!(!index.check_and_insert("a", 2));
        assert!(!index.check_and_insert("b", 2));
        let before = index.clone();

        assert!(index.check_and_insert("a", 2));
        assert_eq!(index, before);
    }

    #[test]
    fn test_index_serializes_as_plain_list() {
        let mut index = DuplicateIndex::default();
        index.check_and_insert("abc", 5);
        assert_eq!(serde_json::to_string(&index).unwrap(), r#"["abc"]"#);
    }
}
