//! Non-fatal diagnostics accumulated during a run.
//!
//! Problems and deprecations never abort a build. They are printed in the
//! summary and written to the diagnostics manifests.

use serde::{Deserialize, Serialize};

/// Stable diagnostic codes.
///
/// All codes are SCREAMING_SNAKE_CASE and stable across versions.
pub mod codes {
    /// Source file failed to parse.
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    /// Load-list entry could not be understood.
    pub const MALFORMED_LOAD: &str = "MALFORMED_LOAD";
    /// A module, package or pattern name was declared twice.
    pub const DUPLICATE_DECLARATION: &str = "DUPLICATE_DECLARATION";
    /// A pattern outside any module.
    pub const ORPHANED_PATTERN: &str = "ORPHANED_PATTERN";
    /// An installer, CLI or pod for an undeclared package.
    pub const ORPHANED_SUBRECORD: &str = "ORPHANED_SUBRECORD";
    /// A third-party import with no local installation.
    pub const UNRESOLVED_IMPORT: &str = "UNRESOLVED_IMPORT";
    /// An `eval::` pod value outside the sandbox grammar.
    pub const POD_EVAL_FAILED: &str = "POD_EVAL_FAILED";
    /// A manifest could not be written.
    pub const MANIFEST_WRITE_FAILED: &str = "MANIFEST_WRITE_FAILED";
    /// The change cache could not be written.
    pub const CACHE_WRITE_FAILED: &str = "CACHE_WRITE_FAILED";
    /// A declaration call whose arguments have the wrong shape.
    pub const INVALID_DECLARATION: &str = "INVALID_DECLARATION";
    /// A source file could not be read.
    pub const FILE_READ_FAILED: &str = "FILE_READ_FAILED";
    /// `/dohballs/dohballs.json` could not be read or updated.
    pub const ORPHAN_SCAN_FAILED: &str = "ORPHAN_SCAN_FAILED";

    /// Fatal: dependency cycle.
    pub const DEPENDENCY_CYCLE: &str = "DEPENDENCY_CYCLE";
    /// Fatal: configuration unreadable.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    /// Fatal: no project root.
    pub const PROJECT_NOT_FOUND: &str = "PROJECT_NOT_FOUND";
    /// Fatal: path could not be resolved.
    pub const PATH_INVALID: &str = "PATH_INVALID";
    /// Fatal: I/O failure.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// A non-fatal problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Stable code from [`codes`].
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Root-slash path of the file involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based line, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Problem {
    #[must_use]
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            file: None,
            line: None,
        }
    }

    #[must_use]
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " ({file}:{line})"),
            (Some(file), None) => write!(f, " ({file})"),
            _ => Ok(()),
        }
    }
}

/// Use of a retired declaration field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deprecation {
    /// Retired feature, e.g. `Doh.Package.include`.
    pub feature: String,
    /// What to use instead.
    pub replacement: String,
    /// Root-slash path of the declaring file.
    pub file: String,
    /// 1-based line of the declaration.
    pub line: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_codes_are_screaming_snake_case() {
        let all = [
            codes::PARSE_ERROR,
            codes::MALFORMED_LOAD,
            codes::DUPLICATE_DECLARATION,
            codes::ORPHANED_PATTERN,
            codes::ORPHANED_SUBRECORD,
            codes::UNRESOLVED_IMPORT,
            codes::POD_EVAL_FAILED,
            codes::MANIFEST_WRITE_FAILED,
            codes::CACHE_WRITE_FAILED,
            codes::INVALID_DECLARATION,
            codes::FILE_READ_FAILED,
            codes::ORPHAN_SCAN_FAILED,
            codes::DEPENDENCY_CYCLE,
            codes::CONFIG_INVALID,
            codes::PROJECT_NOT_FOUND,
            codes::PATH_INVALID,
            codes::IO_ERROR,
        ];

        for code in all {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn test_problem_display() {
        let p = Problem::new(codes::MALFORMED_LOAD, "empty load entry")
            .in_file("/app/mod.js")
            .at_line(4);
        assert_eq!(
            p.to_string(),
            "MALFORMED_LOAD: empty load entry (/app/mod.js:4)"
        );
    }
}
