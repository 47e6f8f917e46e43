#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Core pipeline for dohpack.
//!
//! Scans a Doh project, extracts module, package and pattern declarations
//! without executing them, validates the load graph, writes the manifests,
//! and bakes versioned dohballs per package directory.

pub mod cache;
pub mod config;
pub mod context;
pub mod dohball;
pub mod dohpath;
pub mod error;
pub mod extract;
pub mod graph;
pub mod imports;
pub mod manifest;
pub mod paths;
pub mod pipeline;
pub mod problems;
pub mod version;

pub use cache::ChangeCache;
pub use config::{Config, ProjectConfig};
pub use context::BuildContext;
pub use dohball::version::Version;
pub use dohball::{BakeOutcome, BakeStatus};
pub use dohpath::DohPath;
pub use error::Error;
pub use extract::{CachingExtractor, Extract, Extractor, FileExtraction};
pub use graph::{build_graph, find_cycles, DependencyGraph};
pub use pipeline::{run_build, BuildOptions, BuildReport};
pub use problems::{codes, Deprecation, Problem};
pub use version::VERSION;
