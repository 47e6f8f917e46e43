//! The build orchestrator.
//!
//! One run: load config and cache, scan and extract, register, resolve
//! imports, build the graph, reject cycles, write manifests, save the
//! cache, and optionally bake dohballs.

use crate::cache::ChangeCache;
use crate::config::{Config, ProjectConfig};
use crate::context::BuildContext;
use crate::dohball::archive::ALWAYS_IGNORED;
use crate::dohball::{self, orphans, BakeOutcome};
use crate::error::Error;
use crate::extract::{CachingExtractor, Extractor, FileOutcome};
use crate::graph::{build_graph, find_cycles};
use crate::imports::resolve_imports;
use crate::manifest;
use crate::paths::{project_root, ManifestPaths, DOHBALLS_DIR, DOHBALLS_MANIFEST};
use crate::problems::{codes, Deprecation, Problem};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Bake dohballs after the manifests are written.
    pub bake: bool,
    /// Syntax errors are fatal.
    pub strict: bool,
}

/// Summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub root: String,
    pub files_scanned: usize,
    pub files_parsed: usize,
    pub files_cached: usize,
    pub modules: usize,
    pub packages: usize,
    pub patterns: usize,
    pub manifests_written: usize,
    pub problems: Vec<Problem>,
    pub deprecations: Vec<Deprecation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bakes: Vec<BakeOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphans: Vec<String>,
    pub duration_ms: u64,
}

/// Locate and canonicalize the project root from the configured cwd.
pub fn locate_root(config: &Config) -> Result<PathBuf, Error> {
    let root = project_root(&config.cwd).ok_or_else(|| Error::ProjectNotFound {
        start: config.cwd.clone(),
    })?;
    Ok(dunce::canonicalize(&root)?)
}

/// Root-slash candidate files under `root`, sorted.
pub fn scan(root: &Path, project: &ProjectConfig) -> Result<Vec<String>, Error> {
    let excludes: Vec<glob::Pattern> = project
        .exclude
        .iter()
        .filter_map(|g| match glob::Pattern::new(g) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(pattern = %g, error = %e, "ignoring invalid exclude pattern");
                None
            }
        })
        .collect();
    let outputs = DOHBALLS_DIR.trim_start_matches('/');

    let files = dohpack_util::fs::list_files(root, |rel, is_dir| {
        if is_dir {
            let name = rel.rsplit('/').next().unwrap_or(rel);
            if ALWAYS_IGNORED.contains(&name) || rel == outputs {
                return true;
            }
        }
        excludes.iter().any(|p| p.matches(rel))
    })?;

    Ok(files
        .into_iter()
        .filter(|f| {
            Path::new(f)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| project.extensions.iter().any(|x| x == ext))
        })
        .map(|f| format!("/{f}"))
        .collect())
}

/// Run one build.
///
/// # Errors
/// Fails on an unreadable project config, a dependency cycle, or, in strict
/// or watch mode, the first syntax error.
pub fn run_build(config: &Config, options: BuildOptions) -> Result<BuildReport, Error> {
    let start = Instant::now();
    let root = locate_root(config)?;
    let project = ProjectConfig::load(&root)?;
    let strict = options.strict || config.watch || project.strict;
    let paths = ManifestPaths::new(&project.core_dir);

    let cache_file = root.join(paths.cache.trim_start_matches('/'));
    let mut cache = ChangeCache::load(&root, &cache_file);
    cache.cleanup();

    let files = scan(&root, &project)?;
    info!(root = %root.display(), files = files.len(), "scanning");

    let mut ctx = BuildContext::new(&root, project);
    let mut parsed = 0;
    let mut cached = 0;
    {
        let mut extractor = CachingExtractor::new(Extractor::new(), &mut cache, &root);
        for file in &files {
            match extractor.extract_file(file) {
                FileOutcome::Cached(extraction) => {
                    cached += 1;
                    ctx.register(&extraction);
                }
                FileOutcome::Parsed(extraction) => {
                    parsed += 1;
                    ctx.register(&extraction);
                }
                FileOutcome::Failed(failure) => {
                    if strict {
                        return Err(failure.into_error());
                    }
                    warn!(file = %failure.file, line = failure.line, "syntax error");
                    ctx.problems.push(failure.to_problem());
                }
                FileOutcome::Unreadable(problem) => ctx.problems.push(problem),
            }
        }
    }
    ctx.finish();

    resolve_imports(&mut ctx);
    let graph = build_graph(&mut ctx);
    let cycles = find_cycles(&graph);
    if !cycles.is_empty() {
        return Err(Error::Cycle {
            names: cycles,
            problems: ctx.problems,
        });
    }

    let manifests_written = manifest::write_all(&mut ctx, &graph);
    if let Err(e) = cache.save(&cache_file) {
        warn!(error = %e, "could not save change cache");
        ctx.problems.push(
            Problem::new(codes::CACHE_WRITE_FAILED, format!("cannot write cache: {e}"))
                .in_file(paths.cache.clone()),
        );
    }

    let (bakes, orphans) = if options.bake {
        let bakes = dohball::bake_all(&ctx)?;
        let eligible = dohball::eligible_dirs(&ctx);
        let orphans = match orphans::discover(&root, &eligible) {
            Ok(orphans) => orphans,
            Err(e) => {
                warn!(error = %e, "orphan scan failed");
                ctx.problems.push(
                    Problem::new(
                        codes::ORPHAN_SCAN_FAILED,
                        format!("cannot update {DOHBALLS_MANIFEST}: {e}"),
                    )
                    .in_file(DOHBALLS_MANIFEST),
                );
                Vec::new()
            }
        };
        (bakes, orphans)
    } else {
        (Vec::new(), Vec::new())
    };

    let report = BuildReport {
        root: dohpack_util::fs::to_slash(&root),
        files_scanned: files.len(),
        files_parsed: parsed,
        files_cached: cached,
        modules: ctx.modules.len(),
        packages: ctx.package_table().len(),
        patterns: ctx.patterns.len(),
        manifests_written,
        problems: ctx.problems,
        deprecations: ctx.deprecations,
        bakes,
        orphans,
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    debug!(
        parsed = report.files_parsed,
        cached = report.files_cached,
        problems = report.problems.len(),
        "build finished"
    );
    Ok(report)
}
