//! DohPath: the project's virtual path dialect.
//!
//! Every component addresses files through this resolver rather than the
//! process working directory. Supported notations:
//!
//! - root-slash: `/pkg/file.js` (relative to the project root)
//! - caret: `^/file.js`, `^/../sibling/file.js` (relative to the directory
//!   of a context file)
//! - dot: `./file.js`, `../file.js`, `.` (rewritten to caret form)
//! - bare: `pkg/file.js` (root-relative)
//! - absolute: an on-disk path already inside the root (returned as is)
//!
//! All outputs use forward slashes.

use std::path::Path;
use thiserror::Error;

/// Path resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("relative path '{path}' needs a context to resolve against")]
    MissingContext { path: String },

    #[error("path '{path}' walks above the project root")]
    EscapesRoot { path: String },

    #[error("path '{path}' is outside the project root")]
    OutsideRoot { path: String },

    #[error("join base '{path}' is not absolute")]
    NotAbsolute { path: String },

    #[error("fragment '{fragment}' must be strictly relative")]
    InvalidFragment { fragment: String },

    #[error("path '{path}' cannot be expressed as a file URL")]
    InvalidUrl { path: String },
}

/// Resolver for the DohPath dialect, anchored at a project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DohPath {
    root: String,
}

impl DohPath {
    /// Create a resolver for an absolute project root.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let mut root = normalize_separators(&root.as_ref().to_string_lossy());
        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }
        Self { root }
    }

    /// The project root with forward slashes.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolve any DohPath notation to a root-absolute path.
    ///
    /// # Errors
    /// Fails when a caret/dot path has no context, a path walks above the
    /// root, or an on-disk absolute path lies outside the root.
    pub fn resolve(&self, path: &str, relative_to: Option<&str>) -> Result<String, PathError> {
        let p = normalize_separators(path);

        if let Some(rest) = self.strip_root(&p) {
            return self.walk(&self.root, rest, path);
        }

        if let Some(rest) = p.strip_prefix('^') {
            let base = self.context_dir(path, relative_to)?;
            return self.walk(&base, rest, path);
        }

        if is_dot_relative(&p) {
            let caret = format!("^/{p}");
            return self.resolve(&caret, relative_to);
        }

        if is_drive_absolute(&p) {
            return Err(PathError::OutsideRoot {
                path: path.to_string(),
            });
        }

        // Root-slash and bare paths both hang off the root
        self.walk(&self.root, &p, path)
    }

    /// Project-relative form: `pkg/file.js`; the root itself is `""`.
    ///
    /// # Errors
    /// Propagates resolution failures.
    pub fn relative(&self, path: &str, relative_to: Option<&str>) -> Result<String, PathError> {
        let resolved = self.resolve(path, relative_to)?;
        Ok(self
            .strip_root(&resolved)
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string())
    }

    /// Root-slash form: `/pkg/file.js`; the root itself is `/`.
    ///
    /// # Errors
    /// Propagates resolution failures.
    pub fn dohslash(&self, path: &str, relative_to: Option<&str>) -> Result<String, PathError> {
        Ok(format!("/{}", self.relative(path, relative_to)?))
    }

    /// Caret form of `path` relative to the directory of `context`.
    ///
    /// `resolve(caret(p, c), c)` always yields `resolve(p, c)`.
    ///
    /// # Errors
    /// Propagates resolution failures of either argument.
    pub fn caret(&self, path: &str, context: &str) -> Result<String, PathError> {
        let target = self.relative(path, Some(context))?;
        let dir = self.context_dir(path, Some(context))?;
        let dir = self.strip_root(&dir).unwrap_or_default();

        let target_segs: Vec<&str> = segments(&target).collect();
        let dir_segs: Vec<&str> = segments(dir).collect();

        let common = target_segs
            .iter()
            .zip(&dir_segs)
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<&str> = vec![".."; dir_segs.len() - common];
        parts.extend(&target_segs[common..]);

        if parts.is_empty() {
            Ok("^".to_string())
        } else {
            Ok(format!("^/{}", parts.join("/")))
        }
    }

    /// `file://` URL form.
    ///
    /// # Errors
    /// Propagates resolution failures, or fails when the platform cannot
    /// express the path as a URL.
    pub fn file_url(&self, path: &str, relative_to: Option<&str>) -> Result<String, PathError> {
        let resolved = self.resolve(path, relative_to)?;
        url::Url::from_file_path(Path::new(&resolved))
            .map(|u| u.to_string())
            .map_err(|()| PathError::InvalidUrl { path: resolved })
    }

    /// Lenient equality: separators and repeated or trailing slashes are
    /// normalized before both sides are resolved.
    #[must_use]
    pub fn compare(&self, a: &str, b: &str, relative_to: Option<&str>) -> bool {
        let lenient = |s: &str| {
            let mut s = normalize_separators(s);
            while s.len() > 1 && s.ends_with('/') {
                s.pop();
            }
            s
        };

        match (
            self.resolve(&lenient(a), relative_to),
            self.resolve(&lenient(b), relative_to),
        ) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        }
    }

    /// Concatenate an absolute base with strictly relative fragments.
    ///
    /// # Errors
    /// Fails when the base is not absolute or any fragment is absolute,
    /// root-slash or caret.
    pub fn join(base: &str, fragments: &[&str]) -> Result<String, PathError> {
        let base = normalize_separators(base);
        if !base.starts_with('/') && !is_drive_absolute(&base) {
            return Err(PathError::NotAbsolute { path: base });
        }

        let mut out = base.trim_end_matches('/').to_string();
        for fragment in fragments {
            let f = normalize_separators(fragment);
            if f.starts_with('/') || f.starts_with('^') || is_drive_absolute(&f) {
                return Err(PathError::InvalidFragment {
                    fragment: (*fragment).to_string(),
                });
            }
            let f = f.trim_matches('/');
            if !f.is_empty() {
                out.push('/');
                out.push_str(f);
            }
        }

        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }

    /// The part of `p` after the root, if `p` is the root or inside it.
    fn strip_root<'a>(&self, p: &'a str) -> Option<&'a str> {
        if self.root == "/" {
            return p.starts_with('/').then_some(p);
        }
        let rest = p.strip_prefix(self.root.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    /// Directory of the resolved context file.
    fn context_dir(&self, path: &str, relative_to: Option<&str>) -> Result<String, PathError> {
        let ctx = relative_to.ok_or_else(|| PathError::MissingContext {
            path: path.to_string(),
        })?;
        let ctx = normalize_separators(ctx);
        if ctx.starts_with('^') {
            return Err(PathError::MissingContext {
                path: path.to_string(),
            });
        }

        // A dot context has nothing to be relative to but the root.
        let resolved = if is_dot_relative(&ctx) {
            self.walk(&self.root, &ctx, &ctx)?
        } else {
            self.resolve(&ctx, None)?
        };
        if resolved == self.root {
            return Ok(resolved);
        }
        match resolved.rfind('/') {
            Some(idx) if idx >= self.root.len() => Ok(resolved[..idx].to_string()),
            _ => Ok(self.root.clone()),
        }
    }

    /// Apply `rest`'s segments to an in-root absolute `base`.
    fn walk(&self, base: &str, rest: &str, original: &str) -> Result<String, PathError> {
        let base_rel = self.strip_root(base).unwrap_or_default();
        let mut stack: Vec<&str> = segments(base_rel).collect();

        for seg in rest.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    if stack.pop().is_none() {
                        return Err(PathError::EscapesRoot {
                            path: original.to_string(),
                        });
                    }
                }
                s => stack.push(s),
            }
        }

        if stack.is_empty() {
            Ok(self.root.clone())
        } else if self.root == "/" {
            Ok(format!("/{}", stack.join("/")))
        } else {
            Ok(format!("{}/{}", self.root, stack.join("/")))
        }
    }
}

/// Forward slashes with repeated slashes collapsed.
#[must_use]
pub fn normalize_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn is_dot_relative(p: &str) -> bool {
    p == "." || p == ".." || p.starts_with("./") || p.starts_with("../")
}

fn is_drive_absolute(p: &str) -> bool {
    let bytes = p.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}
