//! Dohball packaging.
//!
//! Each exposed package directory is packed into `/dohballs/<dir>.tar.gz`
//! with a `dohball.json` descriptor recording its version and the files
//! removed since earlier bakes. A bake only bumps the version when the
//! packed bytes differ from the existing archive.

pub mod archive;
pub mod orphans;
pub mod version;

use crate::context::BuildContext;
use crate::paths::{DOHBALLS_DIR, DOHBALL_DESCRIPTOR};
use archive::IgnoreRules;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use version::{Version, VersionError};

/// Errors from baking one package directory.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("failed to pack {path}: {source}")]
    Pack {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to access descriptor {path}: {source}")]
    DescriptorIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid descriptor {path}: {source}")]
    DescriptorParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("worker panicked: {0}")]
    Panic(String),
}

/// Contents of `{package dir}/dohball.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptor {
    pub version: Version,
    /// Root-slash-style paths (`/file`) archived before but gone now.
    pub removals: Vec<String>,
}

impl Descriptor {
    /// Read the descriptor in `dir`; a missing file means "never baked".
    pub fn load(dir: &Path) -> Result<Self, BakeError> {
        let path = dir.join(DOHBALL_DESCRIPTOR);
        match fs::read_to_string(&path) {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|source| BakeError::DescriptorParse { path, source })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(BakeError::DescriptorIo { path, source }),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<(), BakeError> {
        let path = dir.join(DOHBALL_DESCRIPTOR);
        let mut bytes = serde_json::to_vec_pretty(self).map_err(|source| {
            BakeError::DescriptorParse {
                path: path.clone(),
                source,
            }
        })?;
        bytes.push(b'\n');
        dohpack_util::fs::atomic_write(&path, &bytes)
            .map_err(|source| BakeError::DescriptorIo { path, source })
    }

    /// Record files that disappeared and forget ones that came back.
    ///
    /// Returns whether the removal list changed.
    pub fn update_removals(&mut self, previous: &[String], current: &[String]) -> bool {
        let before = self.removals.clone();

        self.removals
            .retain(|r| !current.iter().any(|c| c == r.trim_start_matches('/')));
        for old in previous {
            if !current.contains(old) {
                let removal = format!("/{old}");
                if !self.removals.contains(&removal) {
                    self.removals.push(removal);
                }
            }
        }

        self.removals != before
    }
}

/// Self-contained instructions for baking one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakeRequest {
    /// Packages declared in the directory.
    pub names: Vec<String>,
    /// Root-slash directory.
    pub dir: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub rules: IgnoreRules,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BakeStatus {
    Baked,
    Unchanged,
    Failed,
}

impl BakeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baked => "baked",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }
}

/// Result of one bake job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BakeOutcome {
    pub names: Vec<String>,
    pub dir: String,
    pub status: BakeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub files: Vec<String>,
    pub removals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BakeOutcome {
    #[must_use]
    pub fn failed(request: &BakeRequest, message: impl Into<String>) -> Self {
        Self {
            names: request.names.clone(),
            dir: request.dir.clone(),
            status: BakeStatus::Failed,
            version: None,
            files: Vec::new(),
            removals: Vec::new(),
            message: Some(message.into()),
        }
    }
}

fn probe_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".probe");
    output.with_file_name(name)
}

/// Bake one directory: probe, diff, gate, bump, final pack.
pub fn bake(request: &BakeRequest) -> Result<BakeOutcome, BakeError> {
    let previous = match archive::list(&request.output) {
        Ok(files) => Some(files),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(dir = %request.dir, error = %e, "cannot read existing dohball");
            None
        }
    };

    let probe = probe_path(&request.output);
    let pack = |dest: &Path| {
        archive::pack(&request.source, dest, &request.rules).map_err(|source| BakeError::Pack {
            path: dest.to_path_buf(),
            source,
        })
    };
    let files = pack(&probe)?;

    let descriptor_path = request.source.join(DOHBALL_DESCRIPTOR);
    let had_descriptor = descriptor_path.exists();
    let original = match Descriptor::load(&request.source) {
        Ok(d) => d,
        Err(e) => {
            let _ = fs::remove_file(&probe);
            return Err(e);
        }
    };
    let mut descriptor = original.clone();
    let removals_changed =
        descriptor.update_removals(previous.as_deref().unwrap_or_default(), &files);

    if previous.is_some()
        && !removals_changed
        && dohpack_util::hash::same_content(&probe, &request.output)
    {
        let _ = fs::remove_file(&probe);
        debug!(dir = %request.dir, version = %descriptor.version, "dohball unchanged");
        return Ok(BakeOutcome {
            names: request.names.clone(),
            dir: request.dir.clone(),
            status: BakeStatus::Unchanged,
            version: Some(descriptor.version.to_string()),
            files,
            removals: descriptor.removals,
            message: None,
        });
    }

    let saved = descriptor
        .version
        .increment()
        .map_err(BakeError::from)
        .and_then(|next| {
            descriptor.version = next;
            descriptor.save(&request.source)
        });
    if let Err(e) = saved {
        let _ = fs::remove_file(&probe);
        return Err(e);
    }

    // The archive carries the new descriptor, so pack again and only then
    // replace the old archive.
    let result = pack(&probe).and_then(|files| {
        fs::rename(&probe, &request.output)
            .map(|()| files)
            .map_err(|source| BakeError::Pack {
                path: request.output.clone(),
                source,
            })
    });
    let files = match result {
        Ok(files) => files,
        Err(e) => {
            let _ = fs::remove_file(&probe);
            let restored = if had_descriptor {
                original.save(&request.source)
            } else {
                fs::remove_file(&descriptor_path).map_err(|source| BakeError::DescriptorIo {
                    path: descriptor_path.clone(),
                    source,
                })
            };
            if let Err(restore) = restored {
                warn!(dir = %request.dir, error = %restore, "cannot restore descriptor");
            }
            return Err(e);
        }
    };

    info!(
        dir = %request.dir,
        version = %descriptor.version,
        files = files.len(),
        "dohball baked"
    );
    Ok(BakeOutcome {
        names: request.names.clone(),
        dir: request.dir.clone(),
        status: BakeStatus::Baked,
        version: Some(descriptor.version.to_string()),
        files,
        removals: descriptor.removals,
        message: None,
    })
}

/// Exposed package directories (root-slash) and the packages in each.
///
/// The project root itself is never eligible.
#[must_use]
pub fn eligible_dirs(ctx: &BuildContext) -> BTreeMap<String, Vec<String>> {
    let mut dirs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, entry) in ctx.package_table() {
        if entry.dir != "/" && ctx.config.exposes(&name) {
            dirs.entry(entry.dir).or_default().push(name);
        }
    }
    dirs
}

/// Archive location for a root-slash package directory.
#[must_use]
pub fn output_path(root: &Path, dir: &str) -> PathBuf {
    root.join(DOHBALLS_DIR.trim_start_matches('/'))
        .join(format!("{}.tar.gz", dir.trim_matches('/')))
}

/// One request per eligible directory.
#[must_use]
pub fn plan(ctx: &BuildContext) -> Vec<BakeRequest> {
    let dirs = eligible_dirs(ctx);

    dirs.iter()
        .map(|(dir, names)| {
            let prefix = dir.trim_start_matches('/').to_string();
            let nested = dirs
                .keys()
                .filter_map(|other| other.strip_prefix(dir.as_str())?.strip_prefix('/'))
                .map(str::to_string)
                .collect();

            BakeRequest {
                names: names.clone(),
                dir: dir.clone(),
                source: ctx.root.join(&prefix),
                output: output_path(&ctx.root, dir),
                rules: IgnoreRules {
                    prefix,
                    nested,
                    globs: ctx.config.exclude.clone(),
                },
            }
        })
        .collect()
}

/// Bake every eligible directory on a worker pool.
pub fn bake_all(ctx: &BuildContext) -> io::Result<Vec<BakeOutcome>> {
    let requests = plan(ctx);
    if requests.is_empty() {
        return Ok(Vec::new());
    }
    bake_requests(&requests, ctx.config.workers())
}

/// Bake `requests` on `workers` named threads. Outcomes keep request order.
///
/// A failing or panicking job becomes a failed outcome and never stops the
/// others.
pub fn bake_requests(requests: &[BakeRequest], workers: usize) -> io::Result<Vec<BakeOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("dohpack-bake-{i}"))
        .build()
        .map_err(io::Error::other)?;
    debug!(
        workers = pool.current_num_threads(),
        jobs = requests.len(),
        "baking dohballs"
    );

    Ok(pool.install(|| requests.par_iter().map(bake_isolated).collect()))
}

fn bake_isolated(request: &BakeRequest) -> BakeOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| bake(request))) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(dir = %request.dir, error = %e, "bake failed");
            BakeOutcome::failed(request, e.to_string())
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(dir = %request.dir, %message, "bake job panicked");
            BakeOutcome::failed(request, BakeError::Panic(message).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::extract::{Extract, Extractor};
    use tempfile::tempdir;

    fn request(root: &Path) -> BakeRequest {
        BakeRequest {
            names: vec!["pkg".to_string()],
            dir: "/pkg".to_string(),
            source: root.join("pkg"),
            output: output_path(root, "/pkg"),
            rules: IgnoreRules {
                prefix: "pkg".to_string(),
                ..IgnoreRules::default()
            },
        }
    }

    fn setup() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("index.js"), "Doh.Module('pkg', []);").unwrap();
        fs::write(pkg.join("data.json"), "{}").unwrap();
        dir
    }

    #[test]
    fn test_first_bake() {
        let dir = setup();
        let outcome = bake(&request(dir.path())).unwrap();

        assert_eq!(outcome.status, BakeStatus::Baked);
        assert_eq!(outcome.version.as_deref(), Some("0.0.1a"));
        assert!(outcome.files.contains(&"index.js".to_string()));
        assert!(outcome.files.contains(&"data.json".to_string()));
        assert!(outcome.removals.is_empty());

        let archived = archive::list(&dir.path().join("dohballs/pkg.tar.gz")).unwrap();
        assert_eq!(archived, vec!["data.json", "dohball.json", "index.js"]);
        assert!(!probe_path(&request(dir.path()).output).exists());

        let descriptor = Descriptor::load(&dir.path().join("pkg")).unwrap();
        assert_eq!(descriptor.version.to_string(), "0.0.1a");
    }

    #[test]
    fn test_rebake_without_changes_is_idempotent() {
        let dir = setup();
        let req = request(dir.path());
        bake(&req).unwrap();
        let before = fs::read(&req.output).unwrap();

        let outcome = bake(&req).unwrap();
        assert_eq!(outcome.status, BakeStatus::Unchanged);
        assert_eq!(outcome.version.as_deref(), Some("0.0.1a"));
        assert_eq!(fs::read(&req.output).unwrap(), before);
    }

    #[test]
    fn test_deleted_file_becomes_removal() {
        let dir = setup();
        let req = request(dir.path());
        bake(&req).unwrap();
        fs::remove_file(dir.path().join("pkg/data.json")).unwrap();

        let outcome = bake(&req).unwrap();
        assert_eq!(outcome.status, BakeStatus::Baked);
        assert_eq!(outcome.version.as_deref(), Some("0.0.2a"));
        assert_eq!(outcome.removals, vec!["/data.json"]);

        fs::write(dir.path().join("pkg/data.json"), "{}").unwrap();
        let outcome = bake(&req).unwrap();
        assert_eq!(outcome.version.as_deref(), Some("0.0.3a"));
        assert!(outcome.removals.is_empty());
    }

    #[test]
    fn test_failed_final_pack_keeps_version() {
        let dir = setup();
        let req = request(dir.path());
        bake(&req).unwrap();

        fs::remove_file(&req.output).unwrap();
        fs::create_dir_all(req.output.join("blocker")).unwrap();
        fs::write(dir.path().join("pkg/extra.js"), "x").unwrap();

        let err = bake(&req).unwrap_err();
        assert!(matches!(err, BakeError::Pack { .. }));

        let descriptor = Descriptor::load(&dir.path().join("pkg")).unwrap();
        assert_eq!(descriptor.version.to_string(), "0.0.1a");
        assert!(!probe_path(&req.output).exists());
    }

    #[test]
    fn test_failed_first_bake_leaves_no_descriptor() {
        let dir = setup();
        let req = request(dir.path());
        fs::create_dir_all(req.output.join("blocker")).unwrap();

        assert!(bake(&req).is_err());
        assert!(!dir.path().join("pkg/dohball.json").exists());
    }

    #[test]
    fn test_bake_requests_on_small_pool() {
        let dir = tempdir().unwrap();
        let requests: Vec<BakeRequest> = (0..5)
            .map(|i| {
                let name = format!("p{i}");
                let src = dir.path().join(&name);
                fs::create_dir_all(&src).unwrap();
                fs::write(src.join("index.js"), "x").unwrap();
                let dir_name = format!("/{name}");
                BakeRequest {
                    names: vec![name.clone()],
                    output: output_path(dir.path(), &dir_name),
                    dir: dir_name,
                    source: src,
                    rules: IgnoreRules {
                        prefix: name,
                        ..IgnoreRules::default()
                    },
                }
            })
            .collect();

        let outcomes = bake_requests(&requests, 2).unwrap();
        let dirs: Vec<&str> = outcomes.iter().map(|o| o.dir.as_str()).collect();
        assert_eq!(dirs, vec!["/p0", "/p1", "/p2", "/p3", "/p4"]);
        assert!(outcomes.iter().all(|o| o.status == BakeStatus::Baked));
    }

    #[test]
    fn test_failed_job_is_isolated() {
        let dir = setup();
        fs::create_dir_all(dir.path().join("bad")).unwrap();
        fs::write(dir.path().join("bad/dohball.json"), "{ broken").unwrap();
        let bad = BakeRequest {
            names: vec!["bad".to_string()],
            dir: "/bad".to_string(),
            source: dir.path().join("bad"),
            output: output_path(dir.path(), "/bad"),
            rules: IgnoreRules {
                prefix: "bad".to_string(),
                ..IgnoreRules::default()
            },
        };

        let outcomes = bake_requests(&[bad, request(dir.path())], 1).unwrap();
        assert_eq!(outcomes[0].status, BakeStatus::Failed);
        assert!(outcomes[0].message.as_deref().unwrap().contains("descriptor"));
        assert!(!probe_path(&output_path(dir.path(), "/bad")).exists());
        assert_eq!(outcomes[1].status, BakeStatus::Baked);
    }

    #[test]
    fn test_update_removals() {
        let mut d = Descriptor::default();
        let abc = ["a", "b", "c"].map(String::from);
        let ab = ["a", "b"].map(String::from);

        assert!(d.update_removals(&abc, &ab));
        assert_eq!(d.removals, vec!["/c"]);
        assert!(!d.update_removals(&abc, &ab));
        assert_eq!(d.removals, vec!["/c"]);
        assert!(d.update_removals(&ab, &abc));
        assert!(d.removals.is_empty());
    }

    #[test]
    fn test_corrupt_descriptor_fails() {
        let dir = setup();
        fs::write(dir.path().join("pkg/dohball.json"), "not json").unwrap();
        let err = bake(&request(dir.path())).unwrap_err();
        assert!(matches!(err, BakeError::DescriptorParse { .. }));
    }

    #[test]
    fn test_plan_groups_and_nests() {
        let dir = tempdir().unwrap();
        let config = ProjectConfig {
            exclude: vec!["**/*.map".to_string()],
            expose: vec!["app".to_string(), "widgets".to_string(), "helpers".to_string()],
            ..ProjectConfig::default()
        };
        let mut ctx = BuildContext::new(dir.path(), config);
        for (file, source) in [
            ("/app/app.js", "Doh.Module('app', []);"),
            ("/app/helpers.js", "Doh.Module('helpers', []);"),
            ("/app/widgets/w.js", "Doh.Module('widgets', []);"),
            ("/hidden/h.js", "Doh.Module('hidden', []);"),
            ("/top.js", "Doh.Module('top', []);"),
        ] {
            ctx.register(&Extractor::new().extract(source, file).unwrap());
        }

        let requests = plan(&ctx);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].dir, "/app");
        assert_eq!(requests[0].names, vec!["app", "helpers"]);
        assert_eq!(requests[0].rules.nested, vec!["widgets"]);
        assert_eq!(requests[0].rules.globs, vec!["**/*.map"]);
        assert_eq!(requests[0].output, dir.path().join("dohballs/app.tar.gz"));
        assert_eq!(requests[1].dir, "/app/widgets");
        assert!(requests[1].rules.nested.is_empty());
    }
}
