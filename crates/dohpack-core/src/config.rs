use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional per-project configuration file.
pub const PROJECT_CONFIG_FILE: &str = "dohpack.json";

/// Default number of dohball workers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runtime configuration for the dohpack CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Watch mode: syntax errors fail the run instead of becoming problems.
    pub watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            watch: false,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set watch mode.
    #[must_use]
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }
}

/// Project configuration read from `dohpack.json`.
///
/// Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Glob patterns (root-relative, forward slashes) excluded from scanning
    /// and from dohballs.
    pub exclude: Vec<String>,
    /// File extensions scanned for declarations.
    pub extensions: Vec<String>,
    /// Framework directory; owns the public manifests and implicit module.
    pub core_dir: String,
    /// CDN host for browser import URLs.
    pub cdn: String,
    /// Query string appended to CDN URLs (including the leading `?`).
    pub cdn_query: String,
    /// Specifiers never delivered to the browser.
    pub server_only: Vec<String>,
    /// Packages that get dohballs; `"*"` exposes every package.
    pub expose: Vec<String>,
    /// Dohball worker count.
    pub concurrency: usize,
    /// Treat syntax errors as fatal even outside watch mode.
    pub strict: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            extensions: ["js", "mjs", "cjs", "jsx", "ts", "tsx"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            core_dir: "doh_js".to_string(),
            cdn: "esm.sh".to_string(),
            cdn_query: String::new(),
            server_only: Vec::new(),
            expose: vec!["*".to_string()],
            concurrency: DEFAULT_CONCURRENCY,
            strict: false,
        }
    }
}

impl ProjectConfig {
    /// Load `dohpack.json` from the project root, falling back to defaults
    /// when the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(PROJECT_CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| Error::ConfigParse { path, source })
    }

    /// Whether a package name is exposed for baking.
    #[must_use]
    pub fn exposes(&self, name: &str) -> bool {
        self.expose.iter().any(|e| e == "*" || e == name)
    }

    /// Worker count, never zero.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.core_dir, "doh_js");
        assert!(config.exposes("anything"));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            r#"{"expose": ["ui"], "concurrency": 0}"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert!(config.exposes("ui"));
        assert!(!config.exposes("server"));
        assert_eq!(config.workers(), 1);
        assert_eq!(config.cdn, "esm.sh");
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(PROJECT_CONFIG_FILE), "{ nope").unwrap();

        let err = ProjectConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_runtime_config_builders() {
        let config = Config::new(PathBuf::from("/tmp"))
            .with_verbosity(2)
            .with_json_logs(true)
            .with_watch(true);
        assert_eq!(config.verbosity, 2);
        assert!(config.json_logs);
        assert!(config.watch);
    }
}
