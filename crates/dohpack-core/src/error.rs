use crate::dohpath::PathError;
use crate::problems::Problem;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for dohpack operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Project root not found from {start}")]
    ProjectNotFound { start: PathBuf },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Syntax error in {file}:{line}:{column}: {message}")]
    Parse {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Dependency cycle detected involving: {}", .names.join(", "))]
    Cycle {
        names: Vec<String>,
        /// Non-fatal problems accumulated before the cycle was found.
        problems: Vec<Problem>,
    },
}

impl Error {
    /// Stable error code for JSON output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        use crate::problems::codes;
        match self {
            Self::Io(_) => codes::IO_ERROR,
            Self::ConfigRead { .. } | Self::ConfigParse { .. } => codes::CONFIG_INVALID,
            Self::ProjectNotFound { .. } => codes::PROJECT_NOT_FOUND,
            Self::Path(_) => codes::PATH_INVALID,
            Self::Parse { .. } => codes::PARSE_ERROR,
            Self::Cycle { .. } => codes::DEPENDENCY_CYCLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_names() {
        let err = Error::Cycle {
            names: vec!["A".to_string(), "B".to_string()],
            problems: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "Dependency cycle detected involving: A, B"
        );
        assert_eq!(err.code(), "DEPENDENCY_CYCLE");
    }

    #[test]
    fn test_parse_message_has_location() {
        let err = Error::Parse {
            file: "/mod.js".to_string(),
            line: 3,
            column: 7,
            message: "Expected ';'".to_string(),
        };
        assert!(err.to_string().contains("/mod.js:3:7"));
    }

    #[test]
    fn test_codes_per_variant() {
        let io = Error::from(std::io::Error::other("disk"));
        assert_eq!(io.code(), "IO_ERROR");

        let path = Error::from(PathError::MissingContext {
            path: "^/x".to_string(),
        });
        assert_eq!(path.code(), "PATH_INVALID");

        let missing = Error::ProjectNotFound {
            start: PathBuf::from("/nowhere"),
        };
        assert_eq!(missing.code(), "PROJECT_NOT_FOUND");
    }
}
