//! AST walk collecting declaration calls and import specifiers.

use super::decl::{
    AssetRef, Location, ModuleDecl, PackageDecl, PatternDecl, RouteDecl, SubrecordDecl,
    SubrecordKind,
};
use super::source::SourceText;
use super::value::{ExtractedValue, ValueReader};
use super::{FileExtraction, DYNAMIC_IMPORT};
use crate::problems::{codes, Deprecation, Problem};
use swc_common::Span;
use swc_ecma_ast::{
    CallExpr, Callee, ExportAll, Expr, ExprOrSpread, ImportDecl, Lit, MemberProp, NamedExport,
};
use swc_ecma_visit::{Visit, VisitWith};

/// Package fields replaced by `load`.
const DEPRECATED_LOAD_FIELDS: &[&str] = &["include", "requires"];

pub(super) struct DeclVisitor<'s, 'a> {
    source: &'s SourceText<'a>,
    reader: ValueReader<'s, 'a>,
    pub(super) out: FileExtraction,
}

impl<'s, 'a> DeclVisitor<'s, 'a> {
    pub(super) fn new(source: &'s SourceText<'a>, file: &str) -> Self {
        Self {
            source,
            reader: ValueReader::new(source),
            out: FileExtraction::new(file),
        }
    }

    /// Attach patterns, routes and assets to their innermost module.
    pub(super) fn finish(mut self) -> FileExtraction {
        let modules: Vec<(String, Location)> = self
            .out
            .modules
            .iter()
            .map(|m| (m.name.clone(), m.location.clone()))
            .collect();

        let owner = |line: usize| -> Option<String> {
            modules
                .iter()
                .filter(|(_, loc)| loc.contains_line(line))
                .min_by_key(|(_, loc)| (loc.line_span(), usize::MAX - loc.start_line))
                .map(|(name, _)| name.clone())
        };

        for pattern in &mut self.out.patterns {
            pattern.module = owner(pattern.location.start_line);
        }
        for route in &mut self.out.routes {
            route.module = owner(route.location.start_line);
        }
        for asset in &mut self.out.assets {
            asset.module = owner(asset.location.start_line);
        }
        self.out
    }

    fn location(&self, span: Span) -> Location {
        let (start_line, start_column) = self.source.line_col(span.lo);
        let (end_line, end_column) = self.source.line_col(span.hi);
        Location {
            file: self.out.file.clone(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    fn problem(&mut self, code: &str, message: String, line: usize) {
        let problem = Problem::new(code, message)
            .in_file(self.out.file.clone())
            .at_line(line);
        self.out.problems.push(problem);
    }

    fn add_import(&mut self, spec: String) {
        if !self.out.imports.contains(&spec) {
            self.out.imports.push(spec);
        }
    }

    fn dispatch(&mut self, callee: &str, call: &CallExpr) {
        match callee {
            "require" => {
                let spec = call
                    .args
                    .first()
                    .and_then(|a| literal_string(&a.expr))
                    .unwrap_or_else(|| DYNAMIC_IMPORT.to_string());
                self.add_import(spec);
            }
            "Doh.Module" => self.module(call),
            "Doh.Package" => self.package(call),
            "Pattern" | "Doh.Pattern" => self.pattern(call),
            "Doh.Install" => self.subrecord(SubrecordKind::Install, call),
            "Doh.CLI" => self.subrecord(SubrecordKind::Cli, call),
            "Doh.Pod" => self.subrecord(SubrecordKind::Pod, call),
            "Router.AddRoute" => self.route(call),
            "DohPath.DohSlash" => self.asset(call),
            _ => {}
        }
    }

    /// First argument as a string literal, or an `INVALID_DECLARATION`.
    fn declared_name(&mut self, callee: &str, call: &CallExpr, loc: &Location) -> Option<String> {
        let name = call.args.first().and_then(|a| literal_string(&a.expr));
        if name.is_none() {
            self.problem(
                codes::INVALID_DECLARATION,
                format!("{callee} needs a string literal as its first argument"),
                loc.start_line,
            );
        }
        name
    }

    fn load_list(&mut self, owner: &str, value: &ExtractedValue, line: usize) -> Vec<String> {
        match value {
            ExtractedValue::String(s) => vec![s.clone()],
            ExtractedValue::Array(items) => {
                let mut load = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ExtractedValue::String(s) => load.push(s.clone()),
                        other => self.problem(
                            codes::MALFORMED_LOAD,
                            format!("'{owner}' has a non-literal load entry: {}", other.to_json()),
                            line,
                        ),
                    }
                }
                load
            }
            ExtractedValue::Null => Vec::new(),
            other => {
                self.problem(
                    codes::MALFORMED_LOAD,
                    format!("'{owner}' load list is not a string or array: {}", other.to_json()),
                    line,
                );
                Vec::new()
            }
        }
    }

    fn module(&mut self, call: &CallExpr) {
        let location = self.location(call.span);
        let Some(name) = self.declared_name("Doh.Module", call, &location) else {
            return;
        };

        let mut load = None;
        let mut callback_params = None;
        for arg in call.args.iter().skip(1) {
            match &*arg.expr {
                Expr::Fn(f) => {
                    callback_params =
                        Some(self.reader.params(f.function.params.iter().map(|p| &p.pat)));
                }
                Expr::Arrow(a) => callback_params = Some(self.reader.params(a.params.iter())),
                expr if load.is_none() => {
                    let value = self.reader.read(expr);
                    load = Some(self.load_list(&name, &value, location.start_line));
                }
                _ => {}
            }
        }

        self.out.modules.push(ModuleDecl {
            name,
            load: load.unwrap_or_default(),
            callback_params,
            location,
        });
    }

    fn package(&mut self, call: &CallExpr) {
        let location = self.location(call.span);
        let Some(name) = self.declared_name("Doh.Package", call, &location) else {
            return;
        };

        let body = call
            .args
            .get(1)
            .map_or(ExtractedValue::Null, |a| self.reader.read(&a.expr));

        let mut decl = PackageDecl {
            name: name.clone(),
            load: Vec::new(),
            install: None,
            cli: None,
            pod: None,
            location: location.clone(),
        };

        if let ExtractedValue::Object(_) = body {
            if let Some(load) = body.get("load") {
                decl.load = self.load_list(&name, load, location.start_line);
            }
            for field in DEPRECATED_LOAD_FIELDS {
                if let Some(value) = body.get(field) {
                    self.out.deprecations.push(Deprecation {
                        feature: format!("Doh.Package.{field}"),
                        replacement: "load".to_string(),
                        file: location.file.clone(),
                        line: location.start_line,
                    });
                    let extra = self.load_list(&name, value, location.start_line);
                    for entry in extra {
                        if !decl.load.contains(&entry) {
                            decl.load.push(entry);
                        }
                    }
                }
            }
            decl.install = body.get("install").cloned();
            decl.cli = body.get("cli").cloned();
            decl.pod = body.get("pod").cloned();
        } else {
            decl.load = self.load_list(&name, &body, location.start_line);
        }

        self.out.packages.push(decl);
    }

    fn pattern(&mut self, call: &CallExpr) {
        let location = self.location(call.span);
        let Some(name) = self.declared_name("Pattern", call, &location) else {
            return;
        };

        let rest: Vec<ExtractedValue> = call
            .args
            .iter()
            .skip(1)
            .map(|a| self.reader.read(&a.expr))
            .collect();

        let (inherits, idea) = match rest.as_slice() {
            [] => (None, None),
            [idea @ ExtractedValue::Object(_)] => (None, Some(idea.clone())),
            [inherits] => (Some(inherits.clone()), None),
            [inherits, idea, ..] => (Some(inherits.clone()), Some(idea.clone())),
        };

        let mut names = inherits.as_ref().map(inherit_names).unwrap_or_default();
        if let Some(from_idea) = idea.as_ref().and_then(|i| i.get("inherits")) {
            for parent in inherit_names(from_idea) {
                if !names.contains(&parent) {
                    names.push(parent);
                }
            }
        }

        self.out.patterns.push(PatternDecl {
            name,
            inherits: names,
            idea,
            module: None,
            location,
        });
    }

    fn subrecord(&mut self, kind: SubrecordKind, call: &CallExpr) {
        let location = self.location(call.span);
        let Some(package) = self.declared_name(kind.callee(), call, &location) else {
            return;
        };
        let body = call
            .args
            .get(1)
            .map_or(ExtractedValue::Null, |a| self.reader.read(&a.expr));

        self.out.subrecords.push(SubrecordDecl {
            kind,
            package,
            body,
            location,
        });
    }

    fn route(&mut self, call: &CallExpr) {
        let location = self.location(call.span);
        let Some(path) = self.declared_name("Router.AddRoute", call, &location) else {
            return;
        };

        let handlers = call
            .args
            .iter()
            .skip(1)
            .map(|a| match self.reader.read(&a.expr) {
                ExtractedValue::Function(s) | ExtractedValue::Code(s) | ExtractedValue::String(s) => s,
                other => other.to_json().to_string(),
            })
            .collect();

        self.out.routes.push(RouteDecl {
            path,
            handlers,
            module: None,
            location,
        });
    }

    fn asset(&mut self, call: &CallExpr) {
        // Only literal paths can be known statically
        let Some(path) = call.args.first().and_then(|a| literal_string(&a.expr)) else {
            return;
        };
        let location = self.location(call.span);
        self.out.assets.push(AssetRef {
            path,
            module: None,
            location,
        });
    }
}

impl Visit for DeclVisitor<'_, '_> {
    fn visit_import_decl(&mut self, n: &ImportDecl) {
        if !n.type_only {
            self.add_import(n.src.value.to_string());
        }
    }

    fn visit_named_export(&mut self, n: &NamedExport) {
        if let Some(src) = &n.src {
            if !n.type_only {
                self.add_import(src.value.to_string());
            }
        }
    }

    fn visit_export_all(&mut self, n: &ExportAll) {
        if !n.type_only {
            self.add_import(n.src.value.to_string());
        }
    }

    fn visit_call_expr(&mut self, n: &CallExpr) {
        match &n.callee {
            Callee::Import(_) => {
                let spec = first_literal(&n.args).unwrap_or_else(|| DYNAMIC_IMPORT.to_string());
                self.add_import(spec);
            }
            Callee::Expr(callee) => {
                if let Some(path) = dotted_path(callee) {
                    self.dispatch(&path, n);
                }
            }
            Callee::Super(_) => {}
        }

        n.visit_children_with(self);
    }
}

fn first_literal(args: &[ExprOrSpread]) -> Option<String> {
    args.first().and_then(|a| literal_string(&a.expr))
}

/// A string literal or a template literal without substitutions.
pub(super) fn literal_string(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
        Expr::Tpl(t) if t.exprs.is_empty() => t.quasis.first().map(|q| {
            q.cooked
                .as_ref()
                .map_or_else(|| q.raw.to_string(), ToString::to_string)
        }),
        Expr::Paren(p) => literal_string(&p.expr),
        _ => None,
    }
}

/// `Doh.Module` for a member chain of identifiers, `Pattern` for an identifier.
pub(super) fn dotted_path(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(i) => Some(i.sym.to_string()),
        Expr::Member(m) => {
            let MemberProp::Ident(prop) = &m.prop else {
                return None;
            };
            let obj = dotted_path(&m.obj)?;
            Some(format!("{obj}.{}", prop.sym))
        }
        Expr::Paren(p) => dotted_path(&p.expr),
        _ => None,
    }
}

/// Parent names from a string, an array, or an object of flags.
fn inherit_names(value: &ExtractedValue) -> Vec<String> {
    match value {
        ExtractedValue::Object(props) => props
            .iter()
            .filter(|(_, v)| !matches!(v, ExtractedValue::Bool(false) | ExtractedValue::Null))
            .map(|(k, _)| k.clone())
            .collect(),
        other => other.string_list(),
    }
}
