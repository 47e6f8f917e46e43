//! `eval::` pod values.
//!
//! A pod string starting with [`POD_EVAL_MARKER`] holds a small expression
//! that is evaluated against the declaring file. The only binding is
//! `DohPath`; the grammar is string and number literals, template literals,
//! `+`, parentheses, and the calls `DohPath(p)`, `DohPath.DohSlash(p)`,
//! `DohPath.Relative(p)` and `DohPath.FileURL(p)`.

#![allow(clippy::cast_possible_truncation)]

use super::value::ExtractedValue;
use super::visitor::dotted_path;
use crate::dohpath::DohPath;
use crate::problems::{codes, Problem};
use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::{BinaryOp, Callee, EsVersion, Expr, Lit, ModuleItem, Stmt};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax};

/// Prefix marking a pod string for evaluation.
pub const POD_EVAL_MARKER: &str = "eval::";

/// Evaluate every marked string inside a pod body.
///
/// Values that fail to evaluate are left as written and reported.
pub fn evaluate(
    value: &ExtractedValue,
    dohpath: &DohPath,
    file: &str,
    problems: &mut Vec<Problem>,
) -> ExtractedValue {
    match value {
        ExtractedValue::String(s) => match s.strip_prefix(POD_EVAL_MARKER) {
            Some(code) => match eval_expression(code, dohpath, file) {
                Ok(result) => ExtractedValue::String(result),
                Err(message) => {
                    problems.push(
                        Problem::new(
                            codes::POD_EVAL_FAILED,
                            format!("cannot evaluate '{s}': {message}"),
                        )
                        .in_file(file),
                    );
                    value.clone()
                }
            },
            None => value.clone(),
        },
        ExtractedValue::Array(items) => ExtractedValue::Array(
            items
                .iter()
                .map(|i| evaluate(i, dohpath, file, problems))
                .collect(),
        ),
        ExtractedValue::Object(props) => ExtractedValue::Object(
            props
                .iter()
                .map(|(k, v)| (k.clone(), evaluate(v, dohpath, file, problems)))
                .collect(),
        ),
        other => other.clone(),
    }
}

enum Scalar {
    Str(String),
    Num(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Num(n) => format_number(n),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Parse `code` as a single expression statement and evaluate it.
fn eval_expression(code: &str, dohpath: &DohPath, file: &str) -> Result<String, String> {
    let cm: Lrc<SourceMap> = Lrc::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom("pod-expression".to_string())),
        code.to_string(),
    );
    let lexer = Lexer::new(
        Syntax::Es(EsSyntax::default()),
        EsVersion::EsNext,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    let module = parser
        .parse_module()
        .map_err(|e| format!("syntax error: {:?}", e.kind()))?;
    if !parser.take_errors().is_empty() {
        return Err("syntax error".to_string());
    }

    let expr = match module.body.as_slice() {
        [ModuleItem::Stmt(Stmt::Expr(stmt))] => &stmt.expr,
        _ => return Err("expected a single expression".to_string()),
    };

    Sandbox { dohpath, file }
        .eval(expr)
        .map(Scalar::into_string)
}

struct Sandbox<'a> {
    dohpath: &'a DohPath,
    file: &'a str,
}

impl Sandbox<'_> {
    fn eval(&self, expr: &Expr) -> Result<Scalar, String> {
        match expr {
            Expr::Lit(Lit::Str(s)) => Ok(Scalar::Str(s.value.to_string())),
            Expr::Lit(Lit::Num(n)) => Ok(Scalar::Num(n.value)),
            Expr::Paren(p) => self.eval(&p.expr),
            Expr::Tpl(tpl) => {
                let mut out = String::new();
                for (i, quasi) in tpl.quasis.iter().enumerate() {
                    match &quasi.cooked {
                        Some(cooked) => out.push_str(cooked),
                        None => out.push_str(&quasi.raw),
                    }
                    if let Some(e) = tpl.exprs.get(i) {
                        out.push_str(&self.eval(e)?.into_string());
                    }
                }
                Ok(Scalar::Str(out))
            }
            Expr::Bin(bin) if bin.op == BinaryOp::Add => {
                match (self.eval(&bin.left)?, self.eval(&bin.right)?) {
                    (Scalar::Num(a), Scalar::Num(b)) => Ok(Scalar::Num(a + b)),
                    (a, b) => Ok(Scalar::Str(a.into_string() + b.into_string().as_str())),
                }
            }
            Expr::Call(call) => {
                let callee = match &call.callee {
                    Callee::Expr(c) => dotted_path(c),
                    _ => None,
                }
                .ok_or_else(|| "only DohPath calls are allowed".to_string())?;

                let [arg] = call.args.as_slice() else {
                    return Err(format!("{callee} takes exactly one argument"));
                };
                if arg.spread.is_some() {
                    return Err("spread arguments are not allowed".to_string());
                }
                let path = self.eval(&arg.expr)?.into_string();
                let ctx = Some(self.file);

                let resolved = match callee.as_str() {
                    "DohPath" => self.dohpath.resolve(&path, ctx),
                    "DohPath.DohSlash" => self.dohpath.dohslash(&path, ctx),
                    "DohPath.Relative" => self.dohpath.relative(&path, ctx),
                    "DohPath.FileURL" => self.dohpath.file_url(&path, ctx),
                    other => return Err(format!("'{other}' is not available")),
                };
                resolved.map(Scalar::Str).map_err(|e| e.to_string())
            }
            _ => Err("expression is outside the pod sandbox".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_one(s: &str) -> (ExtractedValue, Vec<Problem>) {
        let dp = DohPath::new("/srv/app");
        let mut problems = Vec::new();
        let out = evaluate(
            &ExtractedValue::String(s.to_string()),
            &dp,
            "/pods/site.js",
            &mut problems,
        );
        (out, problems)
    }

    fn ok(s: &str) -> String {
        let (out, problems) = eval_one(s);
        assert!(problems.is_empty(), "{problems:?}");
        out.as_str().unwrap().to_string()
    }

    #[test]
    fn test_dohpath_calls() {
        assert_eq!(ok("eval::DohPath('^/data')"), "/srv/app/pods/data");
        assert_eq!(ok("eval::DohPath.DohSlash('^/x') + '?v=' + 2"), "/pods/x?v=2");
        assert_eq!(ok("eval::`${DohPath.Relative('/a')}/b`"), "a/b");
        assert_eq!(
            ok("eval::DohPath.FileURL('/f.txt')"),
            "file:///srv/app/f.txt"
        );
    }

    #[test]
    fn test_arithmetic_and_literals() {
        assert_eq!(ok("eval::1 + 2"), "3");
        assert_eq!(ok("eval::'a' + (1 + 2)"), "a3");
    }

    #[test]
    fn test_unmarked_untouched() {
        assert_eq!(ok("DohPath('^/data')"), "DohPath('^/data')");
    }

    #[test]
    fn test_outside_sandbox_is_problem() {
        for code in [
            "eval::process.exit(1)",
            "eval::require('fs')",
            "eval::x = 1",
            "eval::DohPath('a', 'b')",
            "eval::1; 2",
            "eval::(",
        ] {
            let (out, problems) = eval_one(code);
            assert_eq!(out, ExtractedValue::String(code.to_string()));
            assert_eq!(problems.len(), 1, "{code}");
            assert_eq!(problems[0].code, codes::POD_EVAL_FAILED);
        }
    }

    #[test]
    fn test_nested_values() {
        let dp = DohPath::new("/srv/app");
        let body = ExtractedValue::Object(vec![(
            "paths".to_string(),
            ExtractedValue::Array(vec![
                ExtractedValue::String("eval::DohPath.DohSlash('^/a')".to_string()),
                ExtractedValue::Number(1.0),
            ]),
        )]);
        let mut problems = Vec::new();
        let out = evaluate(&body, &dp, "/m/pod.js", &mut problems);
        assert_eq!(
            out.get("paths"),
            Some(&ExtractedValue::Array(vec![
                ExtractedValue::String("/m/a".to_string()),
                ExtractedValue::Number(1.0),
            ]))
        );
    }
}
