//! Statically extracted argument values.

#![allow(clippy::cast_possible_truncation)]

use super::source::SourceText;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use swc_common::Spanned;
use swc_ecma_ast::{
    ArrayLit, Expr, Function, Lit, ObjectLit, Pat, Prop, PropName, PropOrSpread, Tpl, UnaryOp,
};

/// A value read from source without executing it.
///
/// Anything that cannot be read as data is kept as [`ExtractedValue::Code`]
/// or [`ExtractedValue::Unknown`] rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExtractedValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Regex { pattern: String, flags: String },
    Array(Vec<ExtractedValue>),
    /// Properties in source order.
    Object(Vec<(String, ExtractedValue)>),
    /// Signature such as `async function(a, b)`.
    Function(String),
    /// Source text of an expression that is not plain data.
    Code(String),
    /// Node type of something unrecognized.
    Unknown(String),
}

impl ExtractedValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Property lookup on an object value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ExtractedValue> {
        match self {
            Self::Object(props) => props.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Strings of a string-or-array value; other entries are skipped.
    #[must_use]
    pub fn string_list(&self) -> Vec<String> {
        match self {
            Self::String(s) => vec![s.clone()],
            Self::Array(items) => items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Manifest form of the value.
    ///
    /// Code and unknown values are tagged objects; regexes keep their
    /// literal form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) | Self::Function(s) => Value::String(s.clone()),
            Self::Regex { pattern, flags } => json!({ "__regex": format!("/{pattern}/{flags}") }),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(props) => {
                let mut map = Map::new();
                for (k, v) in props {
                    map.insert(k.clone(), v.to_json());
                }
                Value::Object(map)
            }
            Self::Code(code) => json!({ "__code": code }),
            Self::Unknown(kind) => json!({ "__unknown": kind }),
        }
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// Converts swc expressions into [`ExtractedValue`]s.
pub struct ValueReader<'s, 'a> {
    source: &'s SourceText<'a>,
}

impl<'s, 'a> ValueReader<'s, 'a> {
    #[must_use]
    pub fn new(source: &'s SourceText<'a>) -> Self {
        Self { source }
    }

    #[must_use]
    pub fn read(&self, expr: &Expr) -> ExtractedValue {
        match expr {
            Expr::Lit(lit) => self.read_lit(lit),
            Expr::Tpl(tpl) => match template_string(tpl) {
                Some(s) => ExtractedValue::String(s),
                None => self.code(expr),
            },
            Expr::Array(arr) => self.read_array(arr),
            Expr::Object(obj) => self.read_object(obj),
            Expr::Fn(f) => ExtractedValue::Function(self.function_signature(&f.function)),
            Expr::Arrow(a) => {
                ExtractedValue::Function(self.signature(a.params.iter(), a.is_async))
            }
            Expr::Paren(p) => self.read(&p.expr),
            Expr::Unary(u) if u.op == UnaryOp::Minus => match &*u.arg {
                Expr::Lit(Lit::Num(n)) => ExtractedValue::Number(-n.value),
                _ => self.code(expr),
            },
            Expr::TsAs(e) => self.read(&e.expr),
            Expr::TsConstAssertion(e) => self.read(&e.expr),
            Expr::TsSatisfies(e) => self.read(&e.expr),
            Expr::TsNonNull(e) => self.read(&e.expr),
            Expr::This(_)
            | Expr::Unary(_)
            | Expr::Update(_)
            | Expr::Bin(_)
            | Expr::Assign(_)
            | Expr::Member(_)
            | Expr::Cond(_)
            | Expr::Call(_)
            | Expr::New(_)
            | Expr::Seq(_)
            | Expr::Ident(_)
            | Expr::TaggedTpl(_)
            | Expr::Class(_)
            | Expr::Await(_)
            | Expr::OptChain(_)
            | Expr::JSXElement(_)
            | Expr::JSXFragment(_) => self.code(expr),
            other => ExtractedValue::Unknown(expr_kind(other).to_string()),
        }
    }

    fn read_lit(&self, lit: &Lit) -> ExtractedValue {
        match lit {
            Lit::Str(s) => ExtractedValue::String(s.value.to_string()),
            Lit::Num(n) => ExtractedValue::Number(n.value),
            Lit::Bool(b) => ExtractedValue::Bool(b.value),
            Lit::Null(_) => ExtractedValue::Null,
            Lit::Regex(r) => ExtractedValue::Regex {
                pattern: r.exp.to_string(),
                flags: r.flags.to_string(),
            },
            other => match self.source.slice(other.span()) {
                Some(text) => ExtractedValue::Code(text.to_string()),
                None => ExtractedValue::Unknown("Literal".to_string()),
            },
        }
    }

    fn read_array(&self, arr: &ArrayLit) -> ExtractedValue {
        let items = arr
            .elems
            .iter()
            .map(|elem| match elem {
                None => ExtractedValue::Null,
                Some(e) if e.spread.is_some() => self.code_span(e.span()),
                Some(e) => self.read(&e.expr),
            })
            .collect();
        ExtractedValue::Array(items)
    }

    fn read_object(&self, obj: &ObjectLit) -> ExtractedValue {
        let mut props = Vec::with_capacity(obj.props.len());
        for prop in &obj.props {
            match prop {
                PropOrSpread::Spread(s) => {
                    props.push(("...".to_string(), self.code(&s.expr)));
                }
                PropOrSpread::Prop(p) => match &**p {
                    Prop::KeyValue(kv) => props.push((self.prop_name(&kv.key), self.read(&kv.value))),
                    Prop::Shorthand(ident) => {
                        props.push((ident.sym.to_string(), ExtractedValue::Code(ident.sym.to_string())));
                    }
                    Prop::Method(m) => props.push((
                        self.prop_name(&m.key),
                        ExtractedValue::Function(self.function_signature(&m.function)),
                    )),
                    Prop::Getter(g) => props.push((
                        self.prop_name(&g.key),
                        ExtractedValue::Function("get function()".to_string()),
                    )),
                    Prop::Setter(s) => props.push((
                        self.prop_name(&s.key),
                        ExtractedValue::Function(format!(
                            "set function({})",
                            self.source.slice(s.param.span()).unwrap_or("value")
                        )),
                    )),
                    Prop::Assign(a) => props.push((
                        a.key.sym.to_string(),
                        ExtractedValue::Unknown("AssignProp".to_string()),
                    )),
                },
            }
        }
        ExtractedValue::Object(props)
    }

    /// Key text of a property name.
    #[must_use]
    pub fn prop_name(&self, name: &PropName) -> String {
        match name {
            PropName::Ident(i) => i.sym.to_string(),
            PropName::Str(s) => s.value.to_string(),
            PropName::Num(n) => number_key(n.value),
            other => self
                .source
                .slice(other.span())
                .unwrap_or("[computed]")
                .to_string(),
        }
    }

    /// `function(a, b)` signature of a function node.
    #[must_use]
    pub fn function_signature(&self, function: &Function) -> String {
        self.signature(function.params.iter().map(|p| &p.pat), function.is_async)
    }

    /// Parameter source texts of a function node.
    #[must_use]
    pub fn params<'p>(&self, pats: impl Iterator<Item = &'p Pat>) -> Vec<String> {
        pats.map(|p| self.source.slice(p.span()).unwrap_or("_").to_string())
            .collect()
    }

    fn signature<'p>(&self, pats: impl Iterator<Item = &'p Pat>, is_async: bool) -> String {
        let params = self.params(pats).join(", ");
        if is_async {
            format!("async function({params})")
        } else {
            format!("function({params})")
        }
    }

    fn code(&self, expr: &Expr) -> ExtractedValue {
        self.code_span(expr.span())
    }

    fn code_span(&self, span: swc_common::Span) -> ExtractedValue {
        match self.source.slice(span) {
            Some(text) => ExtractedValue::Code(text.to_string()),
            None => ExtractedValue::Unknown("Expression".to_string()),
        }
    }
}

/// Cooked text of a template literal without substitutions.
fn template_string(tpl: &Tpl) -> Option<String> {
    if !tpl.exprs.is_empty() {
        return None;
    }
    tpl.quasis.first().map(|q| {
        q.cooked
            .as_ref()
            .map_or_else(|| q.raw.to_string(), ToString::to_string)
    })
}

fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Node type name for unrecognized expressions.
fn expr_kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::SuperProp(_) => "SuperPropExpression",
        Expr::MetaProp(_) => "MetaPropertyExpression",
        Expr::Yield(_) => "YieldExpression",
        Expr::PrivateName(_) => "PrivateName",
        Expr::TsTypeAssertion(_) => "TsTypeAssertion",
        Expr::TsInstantiation(_) => "TsInstantiation",
        Expr::JSXMember(_) | Expr::JSXNamespacedName(_) | Expr::JSXEmpty(_) => "JSXExpression",
        Expr::Invalid(_) => "Invalid",
        _ => "Expression",
    }
}
