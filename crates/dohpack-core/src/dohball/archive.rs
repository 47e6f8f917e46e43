//! Deterministic gzip tarballs.
//!
//! Entries are sorted, directories are `0755`, files `0644`, owner ids and
//! mtimes are zero and there are no owner names, so the same tree always
//! packs to the same bytes.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;
use tar::{Archive, Builder, EntryType, Header};
use walkdir::WalkDir;

/// Directory names never archived.
pub const ALWAYS_IGNORED: &[&str] = &[".git", "node_modules", "bower_components", ".doh"];

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// What to leave out of a package archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    /// Root-relative directory of the package, used for glob matching.
    pub prefix: String,
    /// Package-relative directories owned by other packages.
    pub nested: Vec<String>,
    /// Root-relative glob patterns.
    pub globs: Vec<String>,
}

struct Matcher<'r> {
    rules: &'r IgnoreRules,
    globs: Vec<glob::Pattern>,
}

impl<'r> Matcher<'r> {
    fn new(rules: &'r IgnoreRules) -> Self {
        let globs = rules
            .globs
            .iter()
            .filter_map(|g| glob::Pattern::new(g).ok())
            .collect();
        Self { rules, globs }
    }

    fn skips(&self, rel: &str, is_dir: bool) -> bool {
        let name = rel.rsplit('/').next().unwrap_or(rel);
        if is_dir && ALWAYS_IGNORED.contains(&name) {
            return true;
        }
        if is_dir && self.rules.nested.iter().any(|n| n == rel) {
            return true;
        }
        let full = if self.rules.prefix.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{rel}", self.rules.prefix)
        };
        self.globs.iter().any(|g| g.matches(&full))
    }
}

/// Pack `src` into a gzip tar at `dest`.
///
/// Returns the archived file paths, package-relative and sorted.
pub fn pack(src: &Path, dest: &Path, rules: &IgnoreRules) -> io::Result<Vec<String>> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let matcher = Matcher::new(rules);
    let file = File::create(dest)?;
    let gz = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(gz);
    let mut files = Vec::new();

    let walker = WalkDir::new(src)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let rel = relative(src, e.path());
            !matcher.skips(&rel, e.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = relative(src, entry.path());
        let file_type = entry.file_type();

        let mut header = Header::new_gnu();
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);

        if file_type.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(DIR_MODE);
            header.set_size(0);
            builder.append_data(&mut header, format!("{rel}/"), io::empty())?;
        } else if file_type.is_file() {
            let data = fs::read(entry.path())?;
            header.set_entry_type(EntryType::Regular);
            header.set_mode(FILE_MODE);
            header.set_size(data.len() as u64);
            builder.append_data(&mut header, &rel, data.as_slice())?;
            files.push(rel);
        }
    }

    let gz = builder.into_inner()?;
    let mut writer = gz.finish()?;
    io::Write::flush(&mut writer)?;
    files.sort();
    Ok(files)
}

/// File paths inside an existing archive, sorted.
pub fn list(archive: &Path) -> io::Result<Vec<String>> {
    let file = File::open(archive)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_file() {
            let path = entry.path()?;
            files.push(dohpack_util::fs::to_slash(&path));
        }
    }

    files.sort();
    Ok(files)
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    dohpack_util::fs::to_slash(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tree(root: &Path, files: &[&str]) {
        for f in files {
            let p = root.join(f);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, format!("contents of {f}")).unwrap();
        }
    }

    #[test]
    fn test_pack_and_list() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("pkg");
        tree(&src, &["index.js", "lib/a.js", "node_modules/x/i.js", ".git/HEAD"]);
        let out = dir.path().join("out/pkg.tar.gz");

        let files = pack(&src, &out, &IgnoreRules::default()).unwrap();
        assert_eq!(files, vec!["index.js", "lib/a.js"]);
        assert_eq!(list(&out).unwrap(), files);
    }

    #[test]
    fn test_pack_is_deterministic() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("pkg");
        tree(&src, &["b.js", "a.js", "sub/c.css"]);

        let one = dir.path().join("one.tar.gz");
        let two = dir.path().join("two.tar.gz");
        pack(&src, &one, &IgnoreRules::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(src.join("a.js"), "contents of a.js").unwrap();
        pack(&src, &two, &IgnoreRules::default()).unwrap();

        assert_eq!(fs::read(&one).unwrap(), fs::read(&two).unwrap());
    }

    #[test]
    fn test_entry_metadata() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("pkg");
        tree(&src, &["sub/f.txt"]);
        let out = dir.path().join("p.tar.gz");
        pack(&src, &out, &IgnoreRules::default()).unwrap();

        let mut archive = Archive::new(GzDecoder::new(File::open(&out).unwrap()));
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let h = entry.header();
            assert_eq!(h.mtime().unwrap(), 0);
            assert_eq!(h.uid().unwrap(), 0);
            assert_eq!(h.gid().unwrap(), 0);
            assert_eq!(h.username().unwrap().unwrap_or(""), "");
            let mode = h.mode().unwrap();
            if h.entry_type().is_dir() {
                assert_eq!(mode, 0o755);
            } else {
                assert_eq!(mode, 0o644);
            }
            seen.push(
                entry
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string(),
            );
        }
        assert_eq!(seen, vec!["sub", "sub/f.txt"]);
    }

    #[test]
    fn test_nested_and_glob_ignores() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("app");
        tree(&src, &["main.js", "main.js.map", "child/c.js", "docs/readme.md"]);
        let rules = IgnoreRules {
            prefix: "app".to_string(),
            nested: vec!["child".to_string()],
            globs: vec!["**/*.map".to_string(), "app/docs".to_string()],
        };

        let files = pack(&src, &dir.path().join("a.tar.gz"), &rules).unwrap();
        assert_eq!(files, vec!["main.js"]);
    }

    #[test]
    fn test_list_missing_archive_errors() {
        let dir = tempdir().unwrap();
        assert!(list(&dir.path().join("none.tar.gz")).is_err());
    }
}
