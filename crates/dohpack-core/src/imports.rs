//! Third-party import resolution.
//!
//! Every specifier seen in a scanned file or an `import` load entry is
//! classified. External packages are looked up in `node_modules` to build
//! the private (installed file) and public (CDN URL) import maps.

use crate::context::{parent_dir, BuildContext};
use crate::extract::DYNAMIC_IMPORT;
use crate::graph::load::{LoadKind, LoadStatement};
use crate::problems::{codes, Problem};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Node.js built-in module names (without the `node:` prefix).
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Version used in CDN URLs for packages with no local installation.
pub const LATEST: &str = "latest";

/// What an import specifier points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// `./x`, `../x`
    Relative,
    /// `/x`, `^/x`
    Absolute,
    /// `https://...`, `node:fs`, `data:...`
    Url,
    /// Non-literal `import()` or `require()`.
    Dynamic,
    /// Node.js built-in.
    Builtin,
    /// Anything else: an external package.
    Package,
}

/// Classify a specifier.
#[must_use]
pub fn classify(spec: &str) -> ImportKind {
    if spec == DYNAMIC_IMPORT {
        ImportKind::Dynamic
    } else if spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../") {
        ImportKind::Relative
    } else if spec.starts_with('/') || spec.starts_with('^') {
        ImportKind::Absolute
    } else if has_scheme(spec) {
        ImportKind::Url
    } else if NODE_BUILTINS.contains(&split_package(spec).0) {
        ImportKind::Builtin
    } else {
        ImportKind::Package
    }
}

fn has_scheme(spec: &str) -> bool {
    spec.split_once(':').is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Split a bare specifier into package name and optional subpath.
///
/// `lodash/fp` gives `("lodash", Some("fp"))`, `@scope/pkg/sub` gives
/// `("@scope/pkg", Some("sub"))`.
#[must_use]
pub fn split_package(spec: &str) -> (&str, Option<&str>) {
    let split_at = if spec.starts_with('@') {
        spec.match_indices('/').nth(1).map(|(i, _)| i)
    } else {
        spec.find('/')
    };

    match split_at {
        Some(i) if i + 1 < spec.len() => (&spec[..i], Some(&spec[i + 1..])),
        Some(i) => (&spec[..i], None),
        None => (spec, None),
    }
}

/// A package found under `node_modules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    /// Absolute entry file for the specifier.
    pub entry: PathBuf,
}

/// Look for `node_modules/<name>/package.json` from `from_dir` up to `root`.
#[must_use]
pub fn find_installed(root: &Path, from_dir: &Path, spec: &str) -> Option<InstalledPackage> {
    let (name, subpath) = split_package(spec);
    let mut current = Some(from_dir);

    while let Some(dir) = current {
        let pkg_dir = dir.join("node_modules").join(name);
        let manifest = pkg_dir.join("package.json");

        if let Ok(content) = std::fs::read_to_string(&manifest) {
            match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(json) => {
                    let field = |key: &str| json.get(key).and_then(|v| v.as_str());
                    let version = field("version").unwrap_or(LATEST).to_string();
                    let entry = match subpath {
                        Some(sub) => pkg_dir.join(sub),
                        None => pkg_dir.join(
                            field("module")
                                .or_else(|| field("main"))
                                .unwrap_or("index.js")
                                .trim_start_matches("./"),
                        ),
                    };
                    return Some(InstalledPackage {
                        name: name.to_string(),
                        version,
                        entry,
                    });
                }
                Err(e) => {
                    warn!(path = %manifest.display(), error = %e, "unreadable package.json");
                }
            }
        }

        if dir == root {
            break;
        }
        current = dir.parent().filter(|p| p.starts_with(root));
    }

    None
}

/// CDN URL for a package specifier.
#[must_use]
pub fn cdn_url(cdn: &str, spec: &str, version: &str, query: &str) -> String {
    let (name, subpath) = split_package(spec);
    match subpath {
        Some(sub) => format!("https://{cdn}/{name}@{version}/{sub}{query}"),
        None => format!("https://{cdn}/{name}@{version}{query}"),
    }
}

/// Private and public import maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportMaps {
    /// Specifier to installed root-slash file, for server runtimes.
    pub private: BTreeMap<String, String>,
    /// Specifier to CDN URL, for browsers.
    pub public: BTreeMap<String, String>,
}

/// A module's imports grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportClassification {
    /// Relative and absolute specifiers.
    pub local: Vec<String>,
    pub builtin: Vec<String>,
    pub packages: Vec<String>,
    /// URLs and dynamic imports.
    pub other: Vec<String>,
}

impl ImportClassification {
    fn add(&mut self, spec: &str) {
        let list = match classify(spec) {
            ImportKind::Relative | ImportKind::Absolute => &mut self.local,
            ImportKind::Builtin => &mut self.builtin,
            ImportKind::Package => &mut self.packages,
            ImportKind::Url | ImportKind::Dynamic => &mut self.other,
        };
        if !list.iter().any(|s| s == spec) {
            list.push(spec.to_string());
        }
    }
}

#[derive(Default)]
struct Usage {
    /// Root-slash files importing the specifier, in discovery order.
    importers: Vec<String>,
    browser: bool,
}

/// Build the import maps and per-module classifications into `ctx`.
pub fn resolve_imports(ctx: &mut BuildContext) {
    let mut usage: BTreeMap<String, Usage> = BTreeMap::new();
    let mut note = |spec: &str, file: &str, browser: bool| {
        if classify(spec) != ImportKind::Package {
            return;
        }
        let entry = usage.entry(spec.to_string()).or_default();
        if !entry.importers.iter().any(|f| f == file) {
            entry.importers.push(file.to_string());
        }
        entry.browser |= browser;
    };

    for (file, specs) in &ctx.file_imports {
        for spec in specs {
            note(spec, file, true);
        }
    }

    let table = ctx.package_table();
    let mut classifications = BTreeMap::new();
    for (name, entry) in &table {
        let mut class = ImportClassification::default();
        if let Some(specs) = ctx.file_imports.get(&entry.file) {
            for spec in specs {
                class.add(spec);
            }
        }
        for raw in &entry.load {
            let Ok(stmt) = LoadStatement::parse(raw) else {
                continue;
            };
            if stmt.kind == LoadKind::Import {
                class.add(&stmt.target);
                note(&stmt.target, &entry.file, !stmt.is_server_only());
            }
        }
        classifications.insert(name.clone(), class);
    }

    let server_only: BTreeSet<&str> = ctx.config.server_only.iter().map(String::as_str).collect();
    let mut maps = ImportMaps::default();
    let mut problems = Vec::new();

    for (spec, used) in &usage {
        let (name, _) = split_package(spec);
        let public = used.browser && !server_only.contains(spec.as_str()) && !server_only.contains(name);

        let installed = used.importers.iter().find_map(|file| {
            let dir = ctx.root.join(parent_dir(file).trim_start_matches('/'));
            find_installed(&ctx.root, &dir, spec)
        });

        match installed {
            Some(pkg) => {
                match ctx.dohpath.dohslash(&pkg.entry.to_string_lossy(), None) {
                    Ok(path) => {
                        maps.private.insert(spec.clone(), path);
                    }
                    Err(e) => debug!(spec = %spec, error = %e, "installed entry outside root"),
                }
                if public {
                    maps.public.insert(
                        spec.clone(),
                        cdn_url(&ctx.config.cdn, spec, &pkg.version, &ctx.config.cdn_query),
                    );
                }
            }
            None => {
                if public {
                    maps.public.insert(
                        spec.clone(),
                        cdn_url(&ctx.config.cdn, spec, LATEST, &ctx.config.cdn_query),
                    );
                }
                let mut problem = Problem::new(
                    codes::UNRESOLVED_IMPORT,
                    format!("'{spec}' is not installed in any node_modules"),
                );
                if let Some(file) = used.importers.first() {
                    problem = problem.in_file(file.clone());
                }
                problems.push(problem);
            }
        }
    }

    debug!(
        private = maps.private.len(),
        public = maps.public.len(),
        "import maps built"
    );
    ctx.import_maps = maps;
    ctx.module_imports = classifications;
    ctx.problems.extend(problems);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::extract::{Extract, Extractor};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_classify() {
        assert_eq!(classify("./a.js"), ImportKind::Relative);
        assert_eq!(classify("../a"), ImportKind::Relative);
        assert_eq!(classify("/doh_js/x.js"), ImportKind::Absolute);
        assert_eq!(classify("^/x.js"), ImportKind::Absolute);
        assert_eq!(classify("https://esm.sh/lit"), ImportKind::Url);
        assert_eq!(classify("node:fs"), ImportKind::Url);
        assert_eq!(classify("data:text/javascript,1"), ImportKind::Url);
        assert_eq!(classify(DYNAMIC_IMPORT), ImportKind::Dynamic);
        assert_eq!(classify("fs"), ImportKind::Builtin);
        assert_eq!(classify("fs/promises"), ImportKind::Builtin);
        assert_eq!(classify("lodash"), ImportKind::Package);
        assert_eq!(classify("@scope/pkg/sub"), ImportKind::Package);
    }

    #[test]
    fn test_split_package() {
        assert_eq!(split_package("lodash"), ("lodash", None));
        assert_eq!(split_package("lodash/fp"), ("lodash", Some("fp")));
        assert_eq!(split_package("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(
            split_package("@scope/pkg/a/b.js"),
            ("@scope/pkg", Some("a/b.js"))
        );
    }

    #[test]
    fn test_cdn_url() {
        assert_eq!(cdn_url("esm.sh", "lit", "3.1.0", ""), "https://esm.sh/lit@3.1.0");
        assert_eq!(
            cdn_url("esm.sh", "lit/decorators.js", "latest", "?bundle"),
            "https://esm.sh/lit@latest/decorators.js?bundle"
        );
    }

    #[test]
    fn test_find_installed_walks_up() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let pkg = root.join("node_modules/lit");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join("package.json"),
            r#"{"name": "lit", "version": "3.1.0", "module": "./index.mjs"}"#,
        )
        .unwrap();
        let deep = root.join("a/b");
        fs::create_dir_all(&deep).unwrap();

        let found = find_installed(root, &deep, "lit").unwrap();
        assert_eq!(found.version, "3.1.0");
        assert_eq!(found.entry, pkg.join("index.mjs"));

        let sub = find_installed(root, &deep, "lit/x.js").unwrap();
        assert_eq!(sub.entry, pkg.join("x.js"));

        assert!(find_installed(root, &deep, "missing").is_none());
    }

    fn context(root: &Path, config: ProjectConfig, files: &[(&str, &str)]) -> BuildContext {
        let mut ctx = BuildContext::new(root, config);
        for (file, source) in files {
            let extraction = Extractor::new().extract(source, file).unwrap();
            ctx.register(&extraction);
        }
        ctx
    }

    #[test]
    fn test_resolve_imports_maps() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let pkg = root.join("node_modules/lit");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("package.json"), r#"{"version": "3.1.0", "main": "lit.js"}"#).unwrap();

        let mut ctx = context(
            root,
            ProjectConfig::default(),
            &[(
                "/ui/ui.js",
                "import { html } from 'lit';\nimport fs from 'fs';\nimport './local.js';\nDoh.Module('ui', ['nodejs?? import pg from \"pg\"']);",
            )],
        );
        resolve_imports(&mut ctx);

        assert_eq!(ctx.import_maps.private["lit"], "/node_modules/lit/lit.js");
        assert_eq!(ctx.import_maps.public["lit"], "https://esm.sh/lit@3.1.0");
        assert!(!ctx.import_maps.public.contains_key("fs"));
        assert!(!ctx.import_maps.public.contains_key("pg"));
        assert!(!ctx.import_maps.private.contains_key("pg"));

        let unresolved: Vec<_> = ctx
            .problems
            .iter()
            .filter(|p| p.code == codes::UNRESOLVED_IMPORT)
            .collect();
        assert_eq!(unresolved.len(), 1);
        assert!(unresolved[0].message.contains("pg"));

        let class = &ctx.module_imports["ui"];
        assert_eq!(class.local, vec!["./local.js"]);
        assert_eq!(class.builtin, vec!["fs"]);
        assert_eq!(class.packages, vec!["lit", "pg"]);
    }

    #[test]
    fn test_uninstalled_uses_latest_and_server_only_excluded() {
        let dir = tempdir().unwrap();
        let config = ProjectConfig {
            server_only: vec!["express".to_string()],
            ..ProjectConfig::default()
        };
        let mut ctx = context(
            dir.path(),
            config,
            &[(
                "/app.js",
                "import a from 'three/addons/x.js';\nimport e from 'express';",
            )],
        );
        resolve_imports(&mut ctx);

        assert_eq!(
            ctx.import_maps.public["three/addons/x.js"],
            "https://esm.sh/three@latest/addons/x.js"
        );
        assert!(!ctx.import_maps.public.contains_key("express"));
        assert!(ctx.import_maps.private.is_empty());
        assert_eq!(ctx.problems.len(), 2);
    }
}
