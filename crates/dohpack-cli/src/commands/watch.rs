//! `dohpack watch`: rebuild on source changes.
//!
//! Runs in watch mode, so a syntax error fails the rebuild instead of
//! becoming a problem. The watcher keeps running after a failed rebuild.

use super::build::{print_error, print_report};
use dohpack_core::dohball::archive::ALWAYS_IGNORED;
use dohpack_core::paths::DOHBALLS_DIR;
use dohpack_core::pipeline::locate_root;
use dohpack_core::{config::PROJECT_CONFIG_FILE, run_build, BuildOptions, Config, ProjectConfig};
use miette::{IntoDiagnostic, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info};

pub fn run(config: Config, bake: bool, debounce_ms: u64, json: bool) -> Result<()> {
    let root = match locate_root(&config).and_then(|root| {
        let project = ProjectConfig::load(&root)?;
        Ok((root, project))
    }) {
        Ok(found) => found,
        Err(e) => {
            print_error(&e, json);
            std::process::exit(1);
        }
    };
    let (root, project) = root;

    let options = BuildOptions {
        bake,
        strict: true,
    };
    rebuild(&config, options, json);

    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(tx, notify::Config::default()).into_diagnostic()?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .into_diagnostic()?;

    if !json {
        eprintln!("watching {} (ctrl+c to exit)", root.display());
    }
    info!(root = %root.display(), debounce_ms, "watching");

    let debounce = Duration::from_millis(debounce_ms);
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();

    loop {
        let event = if pending.is_empty() {
            match rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            }
        } else {
            match rx.recv_timeout(debounce) {
                Ok(event) => event,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    debug!(changed = pending.len(), "rebuilding");
                    if !json {
                        for path in &pending {
                            let shown = path.strip_prefix(&root).unwrap_or(path);
                            eprintln!("changed: {}", shown.display());
                        }
                    }
                    pending.clear();
                    rebuild(&config, options, json);
                    continue;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        };

        match event {
            Ok(event) => {
                for path in event.paths {
                    if is_relevant(&root, &path, &project.extensions) {
                        pending.insert(path);
                    }
                }
            }
            Err(e) => eprintln!("watch error: {e}"),
        }
    }

    Ok(())
}

fn rebuild(config: &Config, options: BuildOptions, json: bool) {
    match run_build(config, options) {
        Ok(report) => print_report(&report, json),
        Err(e) => print_error(&e, json),
    }
}

/// Whether a changed path can affect the build.
fn is_relevant(root: &Path, path: &Path, extensions: &[String]) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    let outputs = DOHBALLS_DIR.trim_start_matches('/');

    let mut components = rel.components().peekable();
    if components
        .peek()
        .is_some_and(|c| c.as_os_str() == outputs)
    {
        return false;
    }
    if rel
        .components()
        .any(|c| ALWAYS_IGNORED.iter().any(|i| c.as_os_str() == *i))
    {
        return false;
    }

    if rel == Path::new(PROJECT_CONFIG_FILE) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x == ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_relevant() {
        let root = Path::new("/proj");
        let exts = vec!["js".to_string(), "ts".to_string()];

        assert!(is_relevant(root, Path::new("/proj/ui/ui.js"), &exts));
        assert!(is_relevant(root, Path::new("/proj/dohpack.json"), &exts));
        assert!(!is_relevant(root, Path::new("/proj/ui/ui.css"), &exts));
        assert!(!is_relevant(root, Path::new("/proj/node_modules/x/i.js"), &exts));
        assert!(!is_relevant(root, Path::new("/proj/.doh/manifests/a.js"), &exts));
        assert!(!is_relevant(root, Path::new("/proj/dohballs/ui.js"), &exts));
        assert!(!is_relevant(root, Path::new("/elsewhere/a.js"), &exts));
    }
}
