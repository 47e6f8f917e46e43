//! Per-file change cache.
//!
//! Every scanned file gets a [`FileRecord`] holding its mtime and blake3
//! content hash, always written together. Unchanged files reuse the
//! extraction memo stored beside their record instead of being re-parsed.
//!
//! ## Format
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "files": { "/mod/ui.js": { "mtime_ms": ..., "hash": "...", ... } },
//!   "memos": { "/mod/ui.js": { ...extraction... } }
//! }
//! ```

use crate::extract::FileExtraction;
use crate::version::SCHEMA_VERSION;
use dohpack_util::fs::atomic_write;
use dohpack_util::hash::blake3_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Fingerprint of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time in milliseconds since the epoch.
    pub mtime_ms: u64,
    /// blake3 hex digest of the content.
    pub hash: String,
    /// Extension-derived kind (`js`, `ts`, ...).
    pub kind: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether the last extraction found any declaration.
    pub has_declarations: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    memos: BTreeMap<String, FileExtraction>,
}

/// Change cache keyed by root-slash path.
#[derive(Debug)]
pub struct ChangeCache {
    root: PathBuf,
    doc: CacheDocument,
}

impl ChangeCache {
    /// Empty cache for a project root.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            doc: CacheDocument {
                schema_version: SCHEMA_VERSION,
                ..CacheDocument::default()
            },
        }
    }

    /// Load the cache document at `cache_file`.
    ///
    /// A missing, unreadable, corrupt or outdated document yields an empty
    /// cache.
    #[must_use]
    pub fn load(root: &Path, cache_file: &Path) -> Self {
        let mut cache = Self::new(root);

        let content = match fs::read_to_string(cache_file) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %cache_file.display(), "no change cache yet");
                return cache;
            }
            Err(e) => {
                warn!(path = %cache_file.display(), error = %e, "change cache unreadable, starting fresh");
                return cache;
            }
        };

        match serde_json::from_str::<CacheDocument>(&content) {
            Ok(doc) if doc.schema_version == SCHEMA_VERSION => {
                debug!(files = doc.files.len(), "loaded change cache");
                cache.doc = doc;
            }
            Ok(doc) => {
                warn!(
                    found = doc.schema_version,
                    expected = SCHEMA_VERSION,
                    "change cache schema mismatch, starting fresh"
                );
            }
            Err(e) => {
                warn!(path = %cache_file.display(), error = %e, "change cache corrupt, starting fresh");
            }
        }

        cache
    }

    /// Number of file records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc.files.is_empty()
    }

    /// The stored record for a file.
    #[must_use]
    pub fn record(&self, path: &str) -> Option<&FileRecord> {
        self.doc.files.get(path)
    }

    /// Whether a file differs from its record.
    ///
    /// True when there is no record, the file cannot be stat'ed or read, or
    /// either the mtime or the content hash changed.
    #[must_use]
    pub fn has_changed(&self, path: &str) -> bool {
        let Some(record) = self.doc.files.get(path) else {
            return true;
        };

        let abs = self.absolute(path);
        let Ok(meta) = fs::metadata(&abs) else {
            return true;
        };
        if mtime_ms(&meta) != record.mtime_ms {
            return true;
        }

        match blake3_file(&abs) {
            Ok(hash) => hash != record.hash,
            Err(_) => true,
        }
    }

    /// Stat and hash a file and store its record.
    ///
    /// # Errors
    /// Returns an error if the file cannot be stat'ed or read.
    pub fn record_file_info(&mut self, path: &str, has_declarations: bool) -> io::Result<()> {
        let abs = self.absolute(path);
        let meta = fs::metadata(&abs)?;
        let hash = blake3_file(&abs)?;

        let kind = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        self.doc.files.insert(
            path.to_string(),
            FileRecord {
                mtime_ms: mtime_ms(&meta),
                hash,
                kind,
                size: meta.len(),
                has_declarations,
            },
        );
        Ok(())
    }

    /// Drop records and memos whose files no longer exist.
    pub fn cleanup(&mut self) -> usize {
        let root = self.root.clone();
        let before = self.doc.files.len();

        self.doc
            .files
            .retain(|path, _| root.join(path.trim_start_matches('/')).is_file());
        let files = &self.doc.files;
        self.doc.memos.retain(|path, _| files.contains_key(path));

        let removed = before - self.doc.files.len();
        if removed > 0 {
            debug!(removed, "dropped stale cache records");
        }
        removed
    }

    /// Stored extraction for a file.
    #[must_use]
    pub fn memo(&self, path: &str) -> Option<&FileExtraction> {
        self.doc.memos.get(path)
    }

    pub fn store_memo(&mut self, path: &str, extraction: FileExtraction) {
        self.doc.memos.insert(path.to_string(), extraction);
    }

    /// Forget a file entirely, so it is treated as changed next time.
    pub fn forget(&mut self, path: &str) {
        self.doc.files.remove(path);
        self.doc.memos.remove(path);
    }

    /// Write the cache as pretty JSON, atomically.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, cache_file: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(&self.doc).map_err(io::Error::other)?;
        atomic_write(cache_file, &json)
    }

    fn absolute(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn mtime_ms(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn set_mtime(path: &Path, offset_secs: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + offset_secs))
            .unwrap();
    }

    #[test]
    fn test_unknown_file_has_changed() {
        let dir = tempdir().unwrap();
        let cache = ChangeCache::new(dir.path());
        assert!(cache.has_changed("/nope.js"));
    }

    #[test]
    fn test_recorded_file_unchanged() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "Doh.Module('a', []);").unwrap();

        let mut cache = ChangeCache::new(dir.path());
        cache.record_file_info("/a.js", true).unwrap();

        assert!(!cache.has_changed("/a.js"));
        let record = cache.record("/a.js").unwrap();
        assert_eq!(record.kind, "js");
        assert!(record.has_declarations);
        assert_eq!(record.size, 20);
    }

    #[test]
    fn test_content_change_detected_with_same_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.js");
        fs::write(&path, "one").unwrap();
        set_mtime(&path, 0);

        let mut cache = ChangeCache::new(dir.path());
        cache.record_file_info("/a.js", false).unwrap();

        fs::write(&path, "two").unwrap();
        set_mtime(&path, 0);
        assert!(cache.has_changed("/a.js"));
    }

    #[test]
    fn test_touch_counts_as_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.js");
        fs::write(&path, "same").unwrap();
        set_mtime(&path, 0);

        let mut cache = ChangeCache::new(dir.path());
        cache.record_file_info("/a.js", false).unwrap();
        assert!(!cache.has_changed("/a.js"));

        set_mtime(&path, 60);
        assert!(cache.has_changed("/a.js"));
    }

    #[test]
    fn test_cleanup_drops_missing_files_and_memos() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.js"), "").unwrap();
        fs::write(dir.path().join("gone.js"), "").unwrap();

        let mut cache = ChangeCache::new(dir.path());
        cache.record_file_info("/keep.js", false).unwrap();
        cache.record_file_info("/gone.js", false).unwrap();
        cache.store_memo("/gone.js", FileExtraction::new("/gone.js"));

        fs::remove_file(dir.path().join("gone.js")).unwrap();
        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.memo("/gone.js").is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "x").unwrap();
        let cache_file = dir.path().join(".doh/manifests/ap_cache.json");

        let mut cache = ChangeCache::new(dir.path());
        cache.record_file_info("/a.js", false).unwrap();
        cache.store_memo("/a.js", FileExtraction::new("/a.js"));
        cache.save(&cache_file).unwrap();

        let loaded = ChangeCache::load(dir.path(), &cache_file);
        assert_eq!(loaded.len(), 1);
        assert!(!loaded.has_changed("/a.js"));
        assert_eq!(loaded.memo("/a.js").unwrap().file, "/a.js");
    }

    #[test]
    fn test_corrupt_cache_is_empty() {
        let dir = tempdir().unwrap();
        let cache_file = dir.path().join("ap_cache.json");
        fs::write(&cache_file, "{ not json").unwrap();

        let cache = ChangeCache::load(dir.path(), &cache_file);
        assert!(cache.is_empty());
    }
}
