//! End-to-end checks of the manifests a build leaves on disk.

use dohpack_core::{run_build, BuildOptions, Config};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read_json(root: &Path, rel: &str) -> Value {
    let text = fs::read_to_string(root.join(rel)).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_manifests_describe_project() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "dohpack.json", "{}");
    write(
        root,
        "ui/ui.js",
        "Doh.Module('ui', ['core'], function() { Pattern('Button'); });",
    );
    write(root, "core/core.js", "Doh.Module('core', []);");

    let report = run_build(&Config::new(root.to_path_buf()), BuildOptions::default()).unwrap();
    assert!(report.problems.is_empty(), "{:?}", report.problems);

    let packages = read_json(root, "doh_js/manifests/package_manifest.json");
    assert_eq!(packages["ui"]["load"], serde_json::json!(["core"]));
    assert_eq!(packages["ui"]["dir"], "/ui");
    assert_eq!(packages["ui"]["explicit"], false);
    assert_eq!(packages["ui"]["patterns"], serde_json::json!(["Button"]));
    assert_eq!(packages["core"]["file"], "/core/core.js");

    let graph = read_json(root, "doh_js/manifests/module_dep_graph.json");
    assert_eq!(graph["ui"], serde_json::json!(["core"]));

    let patterns = read_json(root, "doh_js/manifests/patterns_manifest.json");
    assert_eq!(patterns["Button"], "ui");

    let problems = read_json(root, ".doh/manifests/autopackager_problems.json");
    assert_eq!(problems, serde_json::json!([]));
}

#[test]
fn test_duplicate_module_keeps_first() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "dohpack.json", "{}");
    write(root, "a/one.js", "Doh.Module('shared', []);");
    write(root, "b/two.js", "Doh.Module('shared', []);");

    let report = run_build(&Config::new(root.to_path_buf()), BuildOptions::default()).unwrap();
    assert_eq!(report.modules, 1);

    let duplicates = read_json(root, ".doh/manifests/pattern_duplicates.json");
    let sites = duplicates["modules"]["shared"].as_array().unwrap();
    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0]["file"], "/a/one.js");
    assert_eq!(sites[1]["file"], "/b/two.js");

    let packages = read_json(root, "doh_js/manifests/package_manifest.json");
    assert_eq!(packages["shared"]["file"], "/a/one.js");
}
