//! Declaration records found by the extractor.

use super::value::ExtractedValue;
use serde::{Deserialize, Serialize};

/// Where a declaration call sits in its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Root-slash path of the file.
    pub file: String,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Location {
    /// Whether `line` falls within this call's line range.
    #[must_use]
    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    #[must_use]
    pub fn line_span(&self) -> usize {
        self.end_line - self.start_line
    }
}

/// `Doh.Module(name, [loads], callback)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub name: String,
    pub load: Vec<String>,
    /// Parameter names of the callback, when there is one.
    pub callback_params: Option<Vec<String>>,
    pub location: Location,
}

/// `Doh.Package(name, {...})` or `Doh.Package(name, [loads])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDecl {
    pub name: String,
    pub load: Vec<String>,
    pub install: Option<ExtractedValue>,
    pub cli: Option<ExtractedValue>,
    pub pod: Option<ExtractedValue>,
    pub location: Location,
}

/// `Pattern(name, inherits, idea)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDecl {
    pub name: String,
    pub inherits: Vec<String>,
    pub idea: Option<ExtractedValue>,
    /// Innermost module in the same file whose call contains this one.
    pub module: Option<String>,
    pub location: Location,
}

/// Which declaration a [`SubrecordDecl`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubrecordKind {
    Install,
    Cli,
    Pod,
}

impl SubrecordKind {
    #[must_use]
    pub fn callee(self) -> &'static str {
        match self {
            Self::Install => "Doh.Install",
            Self::Cli => "Doh.CLI",
            Self::Pod => "Doh.Pod",
        }
    }
}

/// `Doh.Install`, `Doh.CLI` or `Doh.Pod` attached to a package by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubrecordDecl {
    pub kind: SubrecordKind,
    pub package: String,
    pub body: ExtractedValue,
    pub location: Location,
}

/// `Router.AddRoute(path, ...handlers)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecl {
    pub path: String,
    /// Handler signatures or source fragments.
    pub handlers: Vec<String>,
    pub module: Option<String>,
    pub location: Location,
}

/// `DohPath.DohSlash('literal')`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    /// The literal as written.
    pub path: String,
    pub module: Option<String>,
    pub location: Location,
}
