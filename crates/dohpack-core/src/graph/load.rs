//! Load-list entry syntax.
//!
//! ```text
//! [conditions ??] [decorators] target
//!
//! 'ui'                         module
//! 'browser?? ^/style.css'      file, only in browsers
//! 'nodejs && !bun?? await db'  module with a decorator
//! "import { x } from 'lib'"    import
//! ```

use serde::Serialize;

/// Leading words that change how a target loads.
pub const DECORATORS: &[&str] = &["optional", "await", "async", "global"];

/// Conditions that only hold outside the browser.
pub const SERVER_CONDITIONS: &[&str] = &["nodejs", "node", "bun", "deno"];

/// Extensions that make a bare target a file.
const FILE_EXTENSIONS: &[&str] = &[
    "js", "mjs", "cjs", "jsx", "ts", "tsx", "css", "json", "html", "htm", "md", "txt", "svg",
    "png", "jpg", "jpeg", "gif", "webp", "ico", "woff", "woff2", "wasm",
];

/// What a load target refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    Module,
    File,
    Import,
}

/// One parsed load-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadStatement {
    pub raw: String,
    /// Module name, file path, or import specifier.
    pub target: String,
    pub kind: LoadKind,
    pub conditions: Vec<String>,
    pub decorators: Vec<String>,
}

impl LoadStatement {
    /// Parse a raw entry.
    ///
    /// # Errors
    /// Returns a message when the target is empty, a module name contains
    /// whitespace, or an import has no quoted specifier.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (conditions, rest) = match raw.rfind("??") {
            Some(idx) => (parse_conditions(&raw[..idx]), &raw[idx + 2..]),
            None => (Vec::new(), raw),
        };

        let mut rest = rest.trim();
        let mut decorators = Vec::new();
        'strip: loop {
            for decorator in DECORATORS {
                if let Some(after) = rest.strip_prefix(decorator) {
                    if after.starts_with(char::is_whitespace) {
                        decorators.push((*decorator).to_string());
                        rest = after.trim_start();
                        continue 'strip;
                    }
                }
            }
            break;
        }

        if rest.is_empty() {
            return Err(format!("load entry '{raw}' has no target"));
        }

        let (kind, target) = if is_import(rest) {
            let spec = quoted_specifier(rest)
                .ok_or_else(|| format!("import '{rest}' has no quoted specifier"))?;
            (LoadKind::Import, spec)
        } else if is_file(rest) {
            (LoadKind::File, rest.to_string())
        } else if rest.contains(char::is_whitespace) {
            return Err(format!("module name '{rest}' contains whitespace"));
        } else {
            (LoadKind::Module, rest.to_string())
        };

        Ok(Self {
            raw: raw.to_string(),
            target,
            kind,
            conditions,
            decorators,
        })
    }

    /// Whether every condition restricts the entry to server runtimes.
    #[must_use]
    pub fn is_server_only(&self) -> bool {
        !self.conditions.is_empty()
            && self
                .conditions
                .iter()
                .any(|c| SERVER_CONDITIONS.contains(&c.as_str()))
            && !self.conditions.iter().any(|c| c == "browser")
    }
}

fn parse_conditions(text: &str) -> Vec<String> {
    text.split("&&")
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

fn is_import(rest: &str) -> bool {
    rest.strip_prefix("import").is_some_and(|after| {
        after.starts_with(|c: char| c.is_whitespace() || matches!(c, '{' | '*' | '\'' | '"'))
    })
}

/// The last quoted string in an import statement.
fn quoted_specifier(stmt: &str) -> Option<String> {
    let stmt = stmt.trim_end().trim_end_matches(';').trim_end();
    let quote = stmt.chars().last().filter(|c| matches!(c, '\'' | '"' | '`'))?;
    let body = &stmt[..stmt.len() - quote.len_utf8()];
    let start = body.rfind(quote)?;
    let spec = &body[start + quote.len_utf8()..];
    (!spec.is_empty()).then(|| spec.to_string())
}

fn is_file(target: &str) -> bool {
    if target.starts_with('/')
        || target.starts_with('^')
        || target.starts_with("./")
        || target.starts_with("../")
        || target.contains("://")
    {
        return true;
    }
    target
        .rsplit_once('.')
        .is_some_and(|(_, ext)| FILE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
