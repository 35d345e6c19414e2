//! Default-argument normalization.
//!
//! Module-level code moves into a nested function during reassembly, so a
//! parameter default that reads a module variable would be evaluated in a
//! scope where that variable may not exist yet. Any non-literal default
//! becomes `None`, with a `if p is None: p = <expr>` prologue restoring the
//! value at call time instead of definition time.

use crate::ast::*;

/// Normalize every function definition in the statement list, recursively.
pub fn normalize_stmts(stmts: &mut Vec<Stmt>) {
    for stmt in stmts.iter_mut() {
        normalize_stmt(stmt);
    }
}

fn normalize_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::FunctionDef(f) => {
            normalize_function(f);
            normalize_stmts(&mut f.body);
        }
        Stmt::ClassDef(c) => normalize_stmts(&mut c.body),
        Stmt::If(i) => {
            normalize_stmts(&mut i.body);
            normalize_stmts(&mut i.orelse);
        }
        Stmt::For(f) => {
            normalize_stmts(&mut f.body);
            normalize_stmts(&mut f.orelse);
        }
        Stmt::While(w) => {
            normalize_stmts(&mut w.body);
            normalize_stmts(&mut w.orelse);
        }
        Stmt::With(w) => normalize_stmts(&mut w.body),
        Stmt::Try(t) => {
            normalize_stmts(&mut t.body);
            for handler in &mut t.handlers {
                normalize_stmts(&mut handler.body);
            }
            normalize_stmts(&mut t.orelse);
            normalize_stmts(&mut t.finalbody);
        }
        _ => {}
    }
}

fn normalize_function(f: &mut FunctionDef) {
    let mut prologue = Vec::new();
    for param in &mut f.params.args {
        let Some(default) = param.default.take() else {
            continue;
        };
        if default.is_literal() {
            param.default = Some(default);
            continue;
        }
        param.default = Some(Expr::NoneLit);
        prologue.push(Stmt::If(If {
            test: Expr::Compare {
                left: Box::new(Expr::Name(param.name.clone())),
                ops: vec!["is".to_string()],
                comparators: vec![Expr::NoneLit],
            },
            body: vec![Stmt::Assign {
                targets: vec![Expr::Name(param.name.clone())],
                value: default,
            }],
            orelse: Vec::new(),
        }));
    }
    if !prologue.is_empty() {
        prologue.append(&mut f.body);
        f.body = prologue;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::parser::parse_module;

    fn normalize_source(source: &str) -> String {
        let mut stmts = parse_module(source).expect("parse");
        normalize_stmts(&mut stmts);
        emit::module(&stmts)
    }

    #[test]
    fn test_variable_default_becomes_none_check() {
        let out = normalize_source("def post_row(row, url=base_url):\n    send(url, row)\n");
        assert!(out.contains("def post_row(row, url=None):"));
        assert!(out.contains("if url is None:"));
        assert!(out.contains("url = base_url"));
    }

    #[test]
    fn test_literal_defaults_untouched() {
        let source = "def f(a=1, b='x', c=None):\n    return a\n";
        let out = normalize_source(source);
        assert!(out.contains("def f(a=1, b='x', c=None):"));
        assert!(!out.contains("if a is None"));
    }

    #[test]
    fn test_call_default_is_deferred() {
        let out = normalize_source("def f(cache=make_cache()):\n    return cache\n");
        assert!(out.contains("def f(cache=None):"));
        assert!(out.contains("cache = make_cache()"));
    }

    #[test]
    fn test_nested_function_is_normalized() {
        let out = normalize_source(
            "def outer():\n    def inner(x=lookup):\n        return x\n    return inner\n",
        );
        assert!(out.contains("def inner(x=None):"));
        assert!(out.contains("x = lookup"));
    }

    #[test]
    fn test_prologue_preserves_parameter_order() {
        let out = normalize_source("def f(a=base, b=other):\n    return a + b\n");
        let a_pos = out.find("if a is None:").expect("a check");
        let b_pos = out.find("if b is None:").expect("b check");
        assert!(a_pos < b_pos);
    }
}
