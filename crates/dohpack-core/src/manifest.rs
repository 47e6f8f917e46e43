//! JSON manifest output.
//!
//! Write failures become `MANIFEST_WRITE_FAILED` problems so one bad
//! target never stops the others.

use crate::context::BuildContext;
use crate::dohpath::DohPath;
use crate::graph::DependencyGraph;
use crate::paths::ManifestPaths;
use crate::problems::{codes, Problem};
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::{debug, warn};

/// Write `data` as pretty JSON to a root-slash `target`.
pub fn write(dohpath: &DohPath, target: &str, data: &Value) -> Option<Problem> {
    let fail = |message: String| {
        warn!(target, %message, "manifest write failed");
        Some(
            Problem::new(
                codes::MANIFEST_WRITE_FAILED,
                format!("cannot write {target}: {message}"),
            )
            .in_file(target),
        )
    };

    let path = match dohpath.resolve(target, None) {
        Ok(p) => p,
        Err(e) => return fail(e.to_string()),
    };
    let mut bytes = match serde_json::to_vec_pretty(data) {
        Ok(b) => b,
        Err(e) => return fail(e.to_string()),
    };
    bytes.push(b'\n');

    match dohpack_util::fs::atomic_write(Path::new(&path), &bytes) {
        Ok(()) => {
            debug!(target, "manifest written");
            None
        }
        Err(e) => fail(e.to_string()),
    }
}

/// Compile and write every manifest. Returns how many were written.
pub fn write_all(ctx: &mut BuildContext, graph: &DependencyGraph) -> usize {
    let paths = ManifestPaths::new(&ctx.config.core_dir);
    let artifacts = [
        (&paths.packages, package_manifest(ctx)),
        (&paths.patterns, json!(ctx.pattern_modules)),
        (&paths.core_patterns, core_patterns(ctx)),
        (&paths.assets, json!(ctx.assets)),
        (&paths.dep_graph, graph.to_json()),
        (&paths.node_esm, json!(ctx.import_maps.private)),
        (&paths.browser_esm, json!(ctx.import_maps.public)),
        (&paths.cli, bodies(&ctx.clis)),
        (&paths.pods, bodies(&ctx.pods)),
        (&paths.routes, routes(ctx)),
        (&paths.duplicates, json!(ctx.duplicates)),
        (&paths.deprecations, json!(ctx.deprecations)),
    ];

    let mut written = 0;
    let mut failures = Vec::new();
    for (target, data) in &artifacts {
        match write(&ctx.dohpath, target, data) {
            Some(problem) => failures.push(problem),
            None => written += 1,
        }
    }
    ctx.problems.extend(failures);

    match write(&ctx.dohpath, &paths.problems, &json!(ctx.problems)) {
        Some(problem) => ctx.problems.push(problem),
        None => written += 1,
    }
    written
}

fn package_manifest(ctx: &BuildContext) -> Value {
    let mut out = Map::new();
    for (name, entry) in ctx.package_table() {
        let mut row = match serde_json::to_value(&entry) {
            Ok(Value::Object(row)) => row,
            _ => Map::new(),
        };
        let attached = [
            ("install", ctx.installers.get(&name)),
            ("cli", ctx.clis.get(&name)),
            ("pod", ctx.pods.get(&name)),
        ];
        for (key, record) in attached {
            if let Some(record) = record {
                row.insert(key.to_string(), record.body.to_json());
            }
        }
        if let Some(patterns) = ctx.module_patterns.get(&name) {
            row.insert("patterns".to_string(), json!(patterns));
        }
        out.insert(name, Value::Object(row));
    }
    Value::Object(out)
}

fn core_patterns(ctx: &BuildContext) -> Value {
    let core = ctx.implicit_module();
    let names: Vec<&String> = ctx
        .pattern_modules
        .iter()
        .filter(|(_, module)| module.as_str() == core)
        .map(|(name, _)| name)
        .collect();
    json!(names)
}

fn bodies(records: &std::collections::BTreeMap<String, crate::context::Attached>) -> Value {
    let map: Map<String, Value> = records
        .iter()
        .map(|(name, record)| (name.clone(), record.body.to_json()))
        .collect();
    Value::Object(map)
}

fn routes(ctx: &BuildContext) -> Value {
    let list: Vec<Value> = ctx
        .routes
        .iter()
        .map(|r| {
            json!({
                "path": r.path,
                "handlers": r.handlers,
                "module": r.module,
                "file": r.location.file,
                "line": r.location.start_line,
            })
        })
        .collect();
    Value::Array(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::extract::{Extract, Extractor};
    use crate::graph::build_graph;
    use std::fs;
    use tempfile::tempdir;

    fn read(root: &Path, target: &str) -> Value {
        let text = fs::read_to_string(root.join(target.trim_start_matches('/'))).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = tempdir().unwrap();
        let dp = DohPath::new(dir.path());
        assert!(write(&dp, "/a/b/c.json", &json!({"x": 1})).is_none());
        assert_eq!(read(dir.path(), "/a/b/c.json"), json!({"x": 1}));
    }

    #[test]
    fn test_write_failure_is_problem() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("blocker"), "file").unwrap();
        let dp = DohPath::new(dir.path());

        let problem = write(&dp, "/blocker/out.json", &json!({})).unwrap();
        assert_eq!(problem.code, codes::MANIFEST_WRITE_FAILED);
    }

    #[test]
    fn test_write_all() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let mut ctx = BuildContext::new(root, ProjectConfig::default());
        let source = "Doh.Module('ui', ['core'], function() {\n  Pattern('Button', 'html');\n  Router.AddRoute('/home', function(req, res) {});\n});\nDoh.Pod('ui', {port: 80});";
        let extraction = Extractor::new().extract(source, "/ui/ui.js").unwrap();
        ctx.register(&extraction);
        let core = Extractor::new()
            .extract("Pattern('html');", "/doh_js/html.js")
            .unwrap();
        ctx.register(&core);
        ctx.finish();

        let graph = build_graph(&mut ctx);
        assert_eq!(write_all(&mut ctx, &graph), 13);

        let packages = read(root, "/doh_js/manifests/package_manifest.json");
        assert_eq!(packages["ui"]["load"], json!(["core"]));
        assert_eq!(packages["ui"]["pod"], json!({"port": 80}));
        assert_eq!(packages["ui"]["patterns"], json!(["Button"]));

        let patterns = read(root, "/doh_js/manifests/patterns_manifest.json");
        assert_eq!(patterns, json!({"Button": "ui", "html": "doh_js"}));
        assert_eq!(
            read(root, "/doh_js/manifests/core_patterns_manifest.json"),
            json!(["html"])
        );
        assert_eq!(
            read(root, "/doh_js/manifests/module_dep_graph.json"),
            json!({"core": [], "ui": ["core"]})
        );

        let routes = read(root, "/.doh/manifests/routes_manifest.json");
        assert_eq!(routes[0]["path"], "/home");
        assert_eq!(routes[0]["module"], "ui");
        assert_eq!(routes[0]["handlers"], json!(["function(req, res)"]));

        assert_eq!(
            read(root, "/.doh/manifests/autopackager_problems.json"),
            json!([])
        );
    }
}
