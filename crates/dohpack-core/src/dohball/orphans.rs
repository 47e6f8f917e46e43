//! Archives in `/dohballs` whose source is no longer exposed.

use crate::paths::{DOHBALLS_DIR, DOHBALLS_MANIFEST};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Contents of `/dohballs/dohballs.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrphanManifest {
    /// Root-slash source directories whose archives are orphaned.
    pub removals: Vec<String>,
}

/// Map archives under `/dohballs` back to their source directories.
///
/// `/dohballs/a/b.tar.gz` comes from `/a/b`.
pub fn archived_dirs(root: &Path) -> Vec<String> {
    let base = root.join(DOHBALLS_DIR.trim_start_matches('/'));
    if !base.is_dir() {
        return Vec::new();
    }

    let mut dirs: Vec<String> = WalkDir::new(&base)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(&base).ok()?;
            let rel = dohpack_util::fs::to_slash(rel);
            rel.strip_suffix(ARCHIVE_SUFFIX).map(|d| format!("/{d}"))
        })
        .collect();
    dirs.sort();
    dirs
}

/// Update `/dohballs/dohballs.json` from the current eligible directories.
///
/// Returns the orphaned directories now listed.
///
/// # Errors
/// Fails when the existing manifest cannot be read or the new one cannot
/// be written.
pub fn discover<V>(root: &Path, eligible: &BTreeMap<String, V>) -> io::Result<Vec<String>> {
    let manifest_path = root.join(DOHBALLS_MANIFEST.trim_start_matches('/'));
    let mut manifest = match fs::read_to_string(&manifest_path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %manifest_path.display(), error = %e, "ignoring corrupt orphan manifest");
            OrphanManifest::default()
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => OrphanManifest::default(),
        Err(e) => return Err(e),
    };

    let mut removals: BTreeSet<String> = manifest.removals.drain(..).collect();
    removals.retain(|dir| !eligible.contains_key(dir));
    for dir in archived_dirs(root) {
        if !eligible.contains_key(&dir) {
            removals.insert(dir);
        }
    }
    manifest.removals = removals.into_iter().collect();

    if manifest.removals.is_empty() && !manifest_path.exists() {
        return Ok(manifest.removals);
    }

    let mut bytes = serde_json::to_vec_pretty(&manifest).map_err(io::Error::other)?;
    bytes.push(b'\n');
    dohpack_util::fs::atomic_write(&manifest_path, &bytes)?;

    if !manifest.removals.is_empty() {
        info!(count = manifest.removals.len(), "orphaned dohballs listed");
    }
    Ok(manifest.removals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn archive(root: &Path, rel: &str) {
        let p = root.join("dohballs").join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"").unwrap();
    }

    #[test]
    fn test_archived_dirs() {
        let dir = tempdir().unwrap();
        archive(dir.path(), "ui.tar.gz");
        archive(dir.path(), "a/b.tar.gz");
        archive(dir.path(), "ui.tar.gz.probe");
        assert_eq!(archived_dirs(dir.path()), vec!["/a/b", "/ui"]);
    }

    #[test]
    fn test_orphans_added_and_pruned() {
        let dir = tempdir().unwrap();
        archive(dir.path(), "ui.tar.gz");
        archive(dir.path(), "old.tar.gz");

        let mut eligible = BTreeMap::new();
        eligible.insert("/ui".to_string(), ());
        assert_eq!(discover(dir.path(), &eligible).unwrap(), vec!["/old"]);

        let text = fs::read_to_string(dir.path().join("dohballs/dohballs.json")).unwrap();
        let manifest: OrphanManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(manifest.removals, vec!["/old"]);

        eligible.insert("/old".to_string(), ());
        assert!(discover(dir.path(), &eligible).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_manifest_is_error() {
        let dir = tempdir().unwrap();
        archive(dir.path(), "old.tar.gz");
        fs::create_dir_all(dir.path().join("dohballs/dohballs.json")).unwrap();

        let eligible: BTreeMap<String, ()> = BTreeMap::new();
        assert!(discover(dir.path(), &eligible).is_err());
    }

    #[test]
    fn test_no_archives_writes_nothing() {
        let dir = tempdir().unwrap();
        let eligible: BTreeMap<String, ()> = BTreeMap::new();
        assert!(discover(dir.path(), &eligible).unwrap().is_empty());
        assert!(!dir.path().join("dohballs/dohballs.json").exists());
    }
}
