//! Declaration extraction.
//!
//! Source files are parsed with SWC and walked without being executed. The
//! walk records Doh declaration calls (`Doh.Module`, `Doh.Package`,
//! `Pattern`, ...) and every import specifier.
//!
//! [`Extractor`] is a pure function of a file's text and its root-slash path.
//! [`CachingExtractor`] wraps any [`Extract`] implementation with the
//! [`ChangeCache`] so unchanged files reuse their last result.

pub mod decl;
pub mod pod;
pub mod source;
pub mod value;
mod visitor;

pub use decl::{
    AssetRef, Location, ModuleDecl, PackageDecl, PatternDecl, RouteDecl, SubrecordDecl,
    SubrecordKind,
};
pub use value::ExtractedValue;

use crate::cache::ChangeCache;
use crate::error::Error;
use crate::problems::{codes, Deprecation, Problem};
use serde::{Deserialize, Serialize};
use source::SourceText;
use std::fmt;
use std::path::{Path, PathBuf};
use swc_common::{sync::Lrc, FileName, SourceMap, Spanned};
use swc_ecma_ast::EsVersion;
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax};
use swc_ecma_visit::VisitWith;
use tracing::{debug, warn};
use visitor::DeclVisitor;

/// Import specifier recorded for `import(expr)` / `require(expr)` with a
/// non-literal argument.
pub const DYNAMIC_IMPORT: &str = "<dynamic>";

/// Everything extracted from one file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileExtraction {
    /// Root-slash path of the file.
    pub file: String,
    #[serde(default)]
    pub modules: Vec<ModuleDecl>,
    #[serde(default)]
    pub packages: Vec<PackageDecl>,
    #[serde(default)]
    pub patterns: Vec<PatternDecl>,
    #[serde(default)]
    pub subrecords: Vec<SubrecordDecl>,
    #[serde(default)]
    pub routes: Vec<RouteDecl>,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
    /// Import specifiers in first-seen order.
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub deprecations: Vec<Deprecation>,
}

impl FileExtraction {
    #[must_use]
    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            ..Self::default()
        }
    }

    /// Whether the file declares anything.
    #[must_use]
    pub fn has_declarations(&self) -> bool {
        !(self.modules.is_empty()
            && self.packages.is_empty()
            && self.patterns.is_empty()
            && self.subrecords.is_empty()
            && self.routes.is_empty())
    }
}

/// A syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseFailure {
    /// Non-fatal form.
    #[must_use]
    pub fn to_problem(&self) -> Problem {
        Problem::new(
            codes::PARSE_ERROR,
            format!("{} (column {})", self.message, self.column),
        )
        .in_file(self.file.clone())
        .at_line(self.line)
    }

    /// Fatal form, used in watch and strict mode.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::Parse {
            file: self.file,
            line: self.line,
            column: self.column,
            message: self.message,
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

/// Turns source text into a [`FileExtraction`].
pub trait Extract {
    /// Extract declarations from `source`, the content of root-slash `file`.
    ///
    /// # Errors
    /// Returns a [`ParseFailure`] when the text is not valid syntax.
    fn extract(&self, source: &str, file: &str) -> Result<FileExtraction, ParseFailure>;
}

/// SWC-backed extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor;

impl Extractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn syntax_for(file: &str) -> Syntax {
        let ext = Path::new(file)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "ts" | "mts" | "cts" => Syntax::Typescript(TsSyntax {
                decorators: true,
                ..Default::default()
            }),
            "tsx" => Syntax::Typescript(TsSyntax {
                tsx: true,
                decorators: true,
                ..Default::default()
            }),
            _ => Syntax::Es(EsSyntax {
                jsx: true,
                decorators: true,
                ..Default::default()
            }),
        }
    }
}

impl Extract for Extractor {
    fn extract(&self, source: &str, file: &str) -> Result<FileExtraction, ParseFailure> {
        let text = source.strip_prefix('\u{feff}').unwrap_or(source);

        let cm: Lrc<SourceMap> = Lrc::default();
        let fm = cm.new_source_file(
            Lrc::new(FileName::Custom(file.to_string())),
            text.to_string(),
        );
        let src = SourceText::new(text, fm.start_pos);

        let lexer = Lexer::new(
            Self::syntax_for(file),
            EsVersion::EsNext,
            StringInput::from(&*fm),
            None,
        );
        let mut parser = Parser::new_from(lexer);

        let failure = |span: swc_common::Span, message: String| {
            let (line, column) = src.line_col(span.lo);
            ParseFailure {
                file: file.to_string(),
                line,
                column,
                message,
            }
        };

        let module = parser
            .parse_module()
            .map_err(|e| failure(e.span(), format!("{:?}", e.kind())))?;

        if let Some(e) = parser.take_errors().into_iter().next() {
            return Err(failure(e.span(), format!("{:?}", e.kind())));
        }

        let mut visitor = DeclVisitor::new(&src, file);
        module.visit_with(&mut visitor);
        Ok(visitor.finish())
    }
}

/// How a file was handled by [`CachingExtractor::extract_file`].
#[derive(Debug)]
pub enum FileOutcome {
    /// Unchanged since the last run; the memo was reused.
    Cached(FileExtraction),
    /// Parsed this run.
    Parsed(FileExtraction),
    /// Syntax error.
    Failed(ParseFailure),
    /// The file could not be read.
    Unreadable(Problem),
}

/// Change-cache decorator around an [`Extract`] implementation.
pub struct CachingExtractor<'c, E> {
    inner: E,
    cache: &'c mut ChangeCache,
    root: PathBuf,
}

impl<'c, E: Extract> CachingExtractor<'c, E> {
    pub fn new(inner: E, cache: &'c mut ChangeCache, root: &Path) -> Self {
        Self {
            inner,
            cache,
            root: root.to_path_buf(),
        }
    }

    /// Extract a root-slash file, reusing the memo when it is unchanged.
    pub fn extract_file(&mut self, file: &str) -> FileOutcome {
        if !self.cache.has_changed(file) {
            if let Some(memo) = self.cache.memo(file) {
                debug!(file = %file, "unchanged, using memo");
                return FileOutcome::Cached(memo.clone());
            }
        }

        let abs = self.root.join(file.trim_start_matches('/'));
        let source = match dohpack_util::fs::read_to_string_lossy(&abs) {
            Ok(s) => s,
            Err(e) => {
                self.cache.forget(file);
                return FileOutcome::Unreadable(
                    Problem::new(codes::FILE_READ_FAILED, format!("cannot read file: {e}"))
                        .in_file(file),
                );
            }
        };

        match self.inner.extract(&source, file) {
            Ok(extraction) => {
                if let Err(e) = self
                    .cache
                    .record_file_info(file, extraction.has_declarations())
                {
                    warn!(file = %file, error = %e, "could not fingerprint file");
                }
                self.cache.store_memo(file, extraction.clone());
                FileOutcome::Parsed(extraction)
            }
            Err(failure) => {
                self.cache.forget(file);
                FileOutcome::Failed(failure)
            }
        }
    }
}
