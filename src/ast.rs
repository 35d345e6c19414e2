//! Typed Python syntax tree.
//!
//! The converter owns its statement/expression types instead of working on
//! raw tree-sitter nodes: transforms mutate these values in place and the
//! emitter prints them back to source. String and number literals keep their
//! raw source text, so emission never has to re-encode escapes, prefixes or
//! digit separators.

use std::collections::HashSet;

/// One Python statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return(Option<Expr>),
    Delete(Vec<Expr>),
    Assign { targets: Vec<Expr>, value: Expr },
    AugAssign { target: Expr, op: String, value: Expr },
    AnnAssign { target: Expr, annotation: Expr, value: Option<Expr> },
    For(For),
    While(While),
    If(If),
    With(With),
    Raise { exc: Option<Expr>, cause: Option<Expr> },
    Try(Try),
    Assert { test: Expr, msg: Option<Expr> },
    Import { names: Vec<Alias> },
    ImportFrom { module: String, names: Vec<Alias>, wildcard: bool },
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    Expr(Expr),
    Pass,
    Break,
    Continue,
    /// Statement kinds the converter never inspects (e.g. `match`), carried
    /// through as raw source.
    Verbatim(Verbatim),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Params,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub returns: Option<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<CallArg>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct For {
    pub target: Expr,
    pub iter: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub is_async: bool,
}

#[derive(Debug, Clone)]
pub struct While {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct If {
    pub test: Expr,
    pub body: Vec<Stmt>,
    /// `elif` chains lower to a nested `If` as the sole `orelse` statement.
    pub orelse: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct With {
    pub items: Vec<WithItem>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
}

#[derive(Debug, Clone)]
pub struct WithItem {
    pub expr: Expr,
    pub alias: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Try {
    pub body: Vec<Stmt>,
    pub handlers: Vec<ExceptHandler>,
    pub orelse: Vec<Stmt>,
    pub finalbody: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ExceptHandler {
    pub typ: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

/// Raw source carried through unmodified. `base_col` is the column the node
/// started at, so continuation lines can be re-indented; `protected` holds
/// byte ranges (relative to `raw`) of string tokens whose interior newlines
/// must never be re-indented.
#[derive(Debug, Clone)]
pub struct Verbatim {
    pub raw: String,
    pub base_col: usize,
    pub protected: Vec<(usize, usize)>,
}

/// Function parameters. Keyword-only parameters follow a `*` or `*args`
/// marker; a bare `*` is a vararg with an empty name.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub args: Vec<Param>,
    pub posonly_count: usize,
    pub vararg: Option<Param>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<Param>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

impl Param {
    pub fn new(name: &str) -> Self {
        Param {
            name: name.to_string(),
            annotation: None,
            default: None,
        }
    }
}

impl Params {
    /// Positional parameters `(a, b, ...)` with no annotations or defaults.
    pub fn positional(names: &[&str]) -> Self {
        Params {
            args: names.iter().map(|n| Param::new(n)).collect(),
            ..Params::default()
        }
    }
}

/// One Python expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Name(String),
    /// Raw number literal text (`42`, `0x1F`, `1_000.5e3`).
    Num(String),
    Str(StrLit),
    Bool(bool),
    NoneLit,
    Ellipsis,
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<DictItem>),
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, index: Box<Expr> },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call { func: Box<Expr>, args: Vec<CallArg> },
    BinOp { left: Box<Expr>, op: String, right: Box<Expr> },
    UnaryOp { op: String, operand: Box<Expr> },
    BoolOp { op: String, values: Vec<Expr> },
    Compare {
        left: Box<Expr>,
        ops: Vec<String>,
        comparators: Vec<Expr>,
    },
    IfExp {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda { params: Box<Params>, body: Box<Expr> },
    Comp(Box<Comp>),
    Starred(Box<Expr>),
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
    Named { target: Box<Expr>, value: Box<Expr> },
    Verbatim(Verbatim),
}

/// A string literal, kept as raw source text (prefix and quotes included).
/// For f-strings the interpolated expressions are also parsed out — they are
/// used for analysis only, never for emission.
#[derive(Debug, Clone)]
pub struct StrLit {
    pub raw: String,
    pub interpolations: Vec<Expr>,
}

impl StrLit {
    /// Plain (non-f) string literal from an already-quoted source fragment.
    pub fn raw(raw: &str) -> Self {
        StrLit {
            raw: raw.to_string(),
            interpolations: Vec::new(),
        }
    }

    pub fn is_fstring(&self) -> bool {
        !self.interpolations.is_empty()
            || self
                .raw
                .chars()
                .take_while(|c| *c != '"' && *c != '\'')
                .any(|c| c == 'f' || c == 'F')
    }

    /// Decoded value for plain literals with no escapes worth interpreting
    /// beyond the common ones. Returns `None` for raw/byte/f-strings, where
    /// the caller must not rely on the value.
    pub fn simple_value(&self) -> Option<String> {
        let raw = self.raw.trim();
        let prefix: String = raw
            .chars()
            .take_while(|c| *c != '"' && *c != '\'')
            .collect();
        let lowered = prefix.to_ascii_lowercase();
        if lowered.contains('f') || lowered.contains('b') || lowered.contains('r') {
            return None;
        }
        let body = &raw[prefix.len()..];
        let inner = if body.len() >= 6 && (body.starts_with("\"\"\"") || body.starts_with("'''")) {
            &body[3..body.len() - 3]
        } else if body.len() >= 2
            && (body.starts_with('"') || body.starts_with('\''))
            && body.ends_with(&body[..1])
        {
            &body[1..body.len() - 1]
        } else {
            return None;
        };
        let mut out = String::new();
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return None,
                }
            } else {
                out.push(c);
            }
        }
        Some(out)
    }
}

#[derive(Debug, Clone)]
pub enum DictItem {
    Pair(Expr, Expr),
    Unpack(Expr),
}

#[derive(Debug, Clone)]
pub enum CallArg {
    Pos(Expr),
    Star(Expr),
    Kw(String, Expr),
    KwStar(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompKind {
    List,
    Set,
    Dict,
    Generator,
}

#[derive(Debug, Clone)]
pub struct Comp {
    pub kind: CompKind,
    /// Key for dict comprehensions; `None` otherwise.
    pub key: Option<Expr>,
    pub elt: Expr,
    pub generators: Vec<Generator>,
}

#[derive(Debug, Clone)]
pub struct Generator {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

impl Expr {
    pub fn name(id: &str) -> Expr {
        Expr::Name(id.to_string())
    }

    pub fn attribute(value: Expr, attr: &str) -> Expr {
        Expr::Attribute {
            value: Box::new(value),
            attr: attr.to_string(),
        }
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            func: Box::new(func),
            args: args.into_iter().map(CallArg::Pos).collect(),
        }
    }

    /// `(idx, <row>)` — the worker-function result tuple.
    pub fn index_row_tuple(row: &str) -> Expr {
        Expr::Tuple(vec![Expr::name("idx"), Expr::name(row)])
    }

    /// Literal in the defining sense of the original converter: constants
    /// only, no names or containers.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::NoneLit | Expr::Ellipsis
        )
    }
}

/// Callee name as the original converter's `_get_func_name`: the bare name of
/// a `Name` callee, or the attribute of an `Attribute` callee.
pub fn func_name(func: &Expr) -> Option<&str> {
    match func {
        Expr::Name(id) => Some(id),
        Expr::Attribute { attr, .. } => Some(attr),
        _ => None,
    }
}

/// Qualified callee name: `name` or `module.attr` when the attribute hangs
/// off a bare name, mirroring `_get_full_func_name`.
pub fn full_func_name(func: &Expr) -> Option<String> {
    match func {
        Expr::Name(id) => Some(id.clone()),
        Expr::Attribute { value, attr } => match value.as_ref() {
            Expr::Name(base) => Some(format!("{}.{}", base, attr)),
            _ => None,
        },
        _ => None,
    }
}

/// Post-order mutable walk over an expression and every sub-expression,
/// including lambda bodies, comprehension clauses and f-string
/// interpolations.
pub fn walk_exprs_mut(expr: &mut Expr, f: &mut dyn FnMut(&mut Expr)) {
    match expr {
        Expr::Name(_)
        | Expr::Num(_)
        | Expr::Bool(_)
        | Expr::NoneLit
        | Expr::Ellipsis
        | Expr::Verbatim(_) => {}
        Expr::Str(lit) => {
            for interp in &mut lit.interpolations {
                walk_exprs_mut(interp, f);
            }
        }
        Expr::Tuple(elts) | Expr::List(elts) | Expr::Set(elts) => {
            for e in elts {
                walk_exprs_mut(e, f);
            }
        }
        Expr::Dict(items) => {
            for item in items {
                match item {
                    DictItem::Pair(k, v) => {
                        walk_exprs_mut(k, f);
                        walk_exprs_mut(v, f);
                    }
                    DictItem::Unpack(e) => walk_exprs_mut(e, f),
                }
            }
        }
        Expr::Attribute { value, .. } => walk_exprs_mut(value, f),
        Expr::Subscript { value, index } => {
            walk_exprs_mut(value, f);
            walk_exprs_mut(index, f);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                walk_exprs_mut(part, f);
            }
        }
        Expr::Call { func, args } => {
            walk_exprs_mut(func, f);
            for arg in args {
                match arg {
                    CallArg::Pos(e) | CallArg::Star(e) | CallArg::Kw(_, e) | CallArg::KwStar(e) => {
                        walk_exprs_mut(e, f)
                    }
                }
            }
        }
        Expr::BinOp { left, right, .. } => {
            walk_exprs_mut(left, f);
            walk_exprs_mut(right, f);
        }
        Expr::UnaryOp { operand, .. } => walk_exprs_mut(operand, f),
        Expr::BoolOp { values, .. } => {
            for v in values {
                walk_exprs_mut(v, f);
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            walk_exprs_mut(left, f);
            for c in comparators {
                walk_exprs_mut(c, f);
            }
        }
        Expr::IfExp { body, test, orelse } => {
            walk_exprs_mut(body, f);
            walk_exprs_mut(test, f);
            walk_exprs_mut(orelse, f);
        }
        Expr::Lambda { params, body } => {
            for p in &mut params.args {
                if let Some(d) = &mut p.default {
                    walk_exprs_mut(d, f);
                }
            }
            walk_exprs_mut(body, f);
        }
        Expr::Comp(comp) => {
            if let Some(k) = &mut comp.key {
                walk_exprs_mut(k, f);
            }
            walk_exprs_mut(&mut comp.elt, f);
            for gen in &mut comp.generators {
                walk_exprs_mut(&mut gen.target, f);
                walk_exprs_mut(&mut gen.iter, f);
                for cond in &mut gen.ifs {
                    walk_exprs_mut(cond, f);
                }
            }
        }
        Expr::Starred(e) | Expr::Await(e) | Expr::YieldFrom(e) => walk_exprs_mut(e, f),
        Expr::Yield(value) => {
            if let Some(e) = value {
                walk_exprs_mut(e, f);
            }
        }
        Expr::Named { target, value } => {
            walk_exprs_mut(target, f);
            walk_exprs_mut(value, f);
        }
    }
    f(expr);
}

/// True when the expression reads any of `names`. Purely syntactic — no
/// scope analysis — matching the original converter's `_uses_removed_var`.
pub fn expr_uses_name(expr: &Expr, names: &HashSet<String>) -> bool {
    if names.is_empty() {
        return false;
    }
    let mut found = false;
    // Walk an owned clone so the shared walker can be reused; expressions in
    // these scripts are small.
    let mut probe = expr.clone();
    walk_exprs_mut(&mut probe, &mut |e| {
        if let Expr::Name(id) = e {
            if names.contains(id.as_str()) {
                found = true;
            }
        }
    });
    found
}

/// Names bound by an assignment target (bare names only — subscript and
/// attribute targets bind nothing new).
pub fn target_names(target: &Expr) -> Vec<String> {
    match target {
        Expr::Name(id) => vec![id.clone()],
        Expr::Tuple(elts) | Expr::List(elts) => {
            elts.iter().flat_map(target_names).collect()
        }
        Expr::Starred(inner) => target_names(inner),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_func_name_forms() {
        let bare = Expr::name("read_excel");
        assert_eq!(func_name(&bare), Some("read_excel"));

        let qualified = Expr::attribute(Expr::name("requests"), "get");
        assert_eq!(func_name(&qualified), Some("get"));
        assert_eq!(full_func_name(&qualified).as_deref(), Some("requests.get"));

        let deep = Expr::attribute(Expr::attribute(Expr::name("a"), "b"), "get");
        assert_eq!(full_func_name(&deep), None);
    }

    #[test]
    fn test_expr_uses_name_walks_nested() {
        let mut names = HashSet::new();
        names.insert("wb".to_string());

        let expr = Expr::call(
            Expr::name("list"),
            vec![Expr::attribute(Expr::name("wb"), "sheetnames")],
        );
        assert!(expr_uses_name(&expr, &names));

        let clean = Expr::call(Expr::name("list"), vec![Expr::name("rows")]);
        assert!(!expr_uses_name(&clean, &names));
    }

    #[test]
    fn test_target_names_tuple_unpack() {
        let target = Expr::Tuple(vec![Expr::name("idx"), Expr::name("row")]);
        assert_eq!(target_names(&target), vec!["idx", "row"]);
    }

    #[test]
    fn test_simple_value_decodes_plain_strings() {
        assert_eq!(
            StrLit::raw("'__main__'").simple_value().as_deref(),
            Some("__main__")
        );
        assert_eq!(
            StrLit::raw("\"a\\nb\"").simple_value().as_deref(),
            Some("a\nb")
        );
        assert_eq!(StrLit::raw("r'\\d+'").simple_value(), None);
    }
}
