use crate::config::PROJECT_CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Private state directory (root-slash).
pub const PRIVATE_DIR: &str = "/.doh";

/// Private manifest directory (root-slash).
pub const PRIVATE_MANIFESTS: &str = "/.doh/manifests";

/// Dohball output directory (root-slash).
pub const DOHBALLS_DIR: &str = "/dohballs";

/// Orphan-archive removal manifest (root-slash).
pub const DOHBALLS_MANIFEST: &str = "/dohballs/dohballs.json";

/// Per-package version descriptor file name.
pub const DOHBALL_DESCRIPTOR: &str = "dohball.json";

/// Find the project root by walking up from `cwd` looking for `dohpack.json`,
/// `package.json` or `.git`.
///
/// Returns the first directory containing any marker, or `None` if none is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(PROJECT_CONFIG_FILE).exists()
            || current.join("package.json").exists()
            || current.join(".git").exists()
        {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Root-slash locations of every manifest a run writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub cache: String,
    pub packages: String,
    pub patterns: String,
    pub core_patterns: String,
    pub assets: String,
    pub dep_graph: String,
    pub node_esm: String,
    pub browser_esm: String,
    pub cli: String,
    pub pods: String,
    pub routes: String,
    pub duplicates: String,
    pub deprecations: String,
    pub problems: String,
}

impl ManifestPaths {
    /// Manifest locations for a framework directory such as `doh_js`.
    #[must_use]
    pub fn new(core_dir: &str) -> Self {
        let core = format!("/{}/manifests", core_dir.trim_matches('/'));
        let private = |name: &str| format!("{PRIVATE_MANIFESTS}/{name}");
        let public = |name: &str| format!("{core}/{name}");

        Self {
            cache: private("ap_cache.json"),
            packages: public("package_manifest.json"),
            patterns: public("patterns_manifest.json"),
            core_patterns: public("core_patterns_manifest.json"),
            assets: public("assets_manifest.json"),
            dep_graph: public("module_dep_graph.json"),
            node_esm: private("node_esm_manifest.json"),
            browser_esm: public("browser_esm_manifest.json"),
            cli: private("cli_manifest.json"),
            pods: private("pod_manifest.json"),
            routes: private("routes_manifest.json"),
            duplicates: private("pattern_duplicates.json"),
            deprecations: private("deprecated_features.json"),
            problems: private("autopackager_problems.json"),
        }
    }
}
