//! Outbound-call rewriting.
//!
//! Every HTTP verb call is redirected to a logging wrapper injected by the
//! driver, keeping its arguments untouched; `row.iloc[i]` subscripts become
//! `_safe_iloc(row, i)` calls. Rewriting is idempotent: `_log_*` callees are
//! never matched again, so converting already-converted code cannot
//! double-wrap.

use log::debug;

use crate::ast::{walk_exprs_mut, CallArg, Expr};

const HTTP_VERBS: [&str; 4] = ["get", "post", "put", "delete"];

/// Module whose verb attributes are rewritten. Attribute calls on anything
/// else are left alone so mapping access like `row.get(key)` survives.
const HTTP_MODULE: &str = "requests";

/// Name of the injected wrapper; calls inside its body are never rewritten,
/// which keeps the wrapper from recursing into itself.
pub const LOG_WRAPPER: &str = "_log_req";

/// Rewrite every HTTP verb call and `.iloc` subscript under `expr`.
/// `skip_http` suppresses verb redirection (set inside the wrapper's own
/// body); returns the number of HTTP calls redirected.
pub fn rewrite_expr(expr: &mut Expr, skip_http: bool) -> usize {
    let mut rewritten = 0;
    walk_exprs_mut(expr, &mut |e| {
        if !skip_http {
            rewrite_http(e, &mut rewritten);
        }
        rewrite_iloc(e);
    });
    rewritten
}

fn rewrite_http(expr: &mut Expr, rewritten: &mut usize) {
    let Expr::Call { func, .. } = expr else {
        return;
    };
    let wrapper = match func.as_mut() {
        Expr::Name(id) => {
            if HTTP_VERBS.contains(&id.as_str()) {
                Some(format!("_log_{}", id))
            } else {
                None
            }
        }
        Expr::Attribute { value, attr } => match value.as_ref() {
            Expr::Name(base) if base == HTTP_MODULE && HTTP_VERBS.contains(&attr.as_str()) => {
                Some(format!("_log_{}", attr))
            }
            _ => None,
        },
        _ => None,
    };
    if let Some(wrapper) = wrapper {
        debug!("redirecting HTTP call to {}", wrapper);
        *func = Box::new(Expr::Name(wrapper));
        *rewritten += 1;
    }
}

fn rewrite_iloc(expr: &mut Expr) {
    let Expr::Subscript { value, index } = expr else {
        return;
    };
    let Expr::Attribute {
        value: base, attr, ..
    } = value.as_ref()
    else {
        return;
    };
    if attr != "iloc" {
        return;
    }
    let Expr::Name(target) = base.as_ref() else {
        return;
    };
    // A slice index has no call-argument form; leave those subscripts alone.
    if matches!(index.as_ref(), Expr::Slice { .. }) {
        return;
    }

    let replacement = Expr::Call {
        func: Box::new(Expr::name("_safe_iloc")),
        args: vec![
            CallArg::Pos(Expr::Name(target.clone())),
            CallArg::Pos(index.as_ref().clone()),
        ],
    };
    *expr = replacement;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::parser::parse_module;
    use crate::ast::Stmt;

    fn rewrite_source(source: &str) -> String {
        let mut stmts = parse_module(source).expect("parse");
        for stmt in &mut stmts {
            if let Stmt::Expr(e) = stmt {
                rewrite_expr(e, false);
            } else if let Stmt::Assign { value, .. } = stmt {
                rewrite_expr(value, false);
            }
        }
        emit::module(&stmts)
    }

    #[test]
    fn test_qualified_verb_is_rewritten() {
        let out = rewrite_source("requests.get(url, headers=h)\n");
        assert_eq!(out, "_log_get(url, headers=h)\n");
    }

    #[test]
    fn test_bare_verb_is_rewritten() {
        let out = rewrite_source("post(url, json=payload)\n");
        assert_eq!(out, "_log_post(url, json=payload)\n");
    }

    #[test]
    fn test_mapping_get_is_untouched() {
        let out = rewrite_source("value = row.get('Farmer Name')\n");
        assert_eq!(out, "value = row.get('Farmer Name')\n");
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let once = rewrite_source("requests.put(url, json=body)\n");
        let twice = rewrite_source(&once);
        assert_eq!(once, twice);
        assert!(!twice.contains("_log__log_"));
    }

    #[test]
    fn test_nested_call_arguments_are_rewritten() {
        let out = rewrite_source("result = parse(requests.get(url).json())\n");
        assert_eq!(out, "result = parse(_log_get(url).json())\n");
    }

    #[test]
    fn test_iloc_subscript_becomes_safe_call() {
        let out = rewrite_source("name = row.iloc[0]\n");
        assert_eq!(out, "name = _safe_iloc(row, 0)\n");
    }

    #[test]
    fn test_iloc_slice_left_alone() {
        let out = rewrite_source("part = row.iloc[0:2]\n");
        assert_eq!(out, "part = row.iloc[0:2]\n");
    }
}
