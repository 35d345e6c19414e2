//! Main-loop extraction.
//!
//! The top-level `for` that iterates the input rows is lifted into a
//! standalone `process_row(idx, row)` worker. Loop-control statements in the
//! captured body become early returns: once the body runs once per row,
//! `continue` means "done with this row" — and `break` is treated the same
//! way, since no mechanism exists for one row's processing to terminate the
//! whole batch.

use std::collections::HashSet;

use log::debug;

use crate::ast::*;

/// Name of the synthesized per-row worker.
pub const WORKER_NAME: &str = "process_row";

/// Reserved name of the platform-provided row list.
pub const DATA_NAME: &str = "data";

/// Loader calls whose iteration marks the main data loop.
const LOOP_SOURCES: [&str; 3] = ["read_excel", "iter_rows", "iterrows"];

/// True when a top-level `for` iterates the input data: a recognized loader
/// call, the bare `data` name, or anything that reads a deleted legacy
/// variable (the loop then depended on setup code that no longer exists).
pub fn is_data_loop(iter: &Expr, removed: &HashSet<String>, ignored_funcs: &[&str]) -> bool {
    if let Expr::Call { func, .. } = iter {
        if let Some(name) = func_name(func) {
            if LOOP_SOURCES.contains(&name) || ignored_funcs.contains(&name) {
                return true;
            }
        }
    }
    if matches!(iter, Expr::Name(n) if n == DATA_NAME) {
        return true;
    }
    expr_uses_name(iter, removed)
}

/// The loop variable holding the row: a bare name, or the second element of
/// a two-element unpack (`for idx, row in ...`).
pub fn loop_row_target(target: &Expr) -> Option<String> {
    match target {
        Expr::Name(name) => Some(name.clone()),
        Expr::Tuple(elts) | Expr::List(elts) if elts.len() == 2 => match &elts[1] {
            Expr::Name(name) => Some(name.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// What `replace_loop_controls` rewrote.
#[derive(Debug, Default, Clone, Copy)]
pub struct ControlRewrite {
    pub rewrote_continue: bool,
    pub rewrote_break: bool,
}

/// Replace `continue`/`break` with `return (idx, <row>)`. Nested loops keep
/// their own control statements; nested function definitions are their own
/// scope and are never entered.
pub fn replace_loop_controls(stmts: &mut [Stmt], row: &str) -> ControlRewrite {
    let mut stats = ControlRewrite::default();
    walk(stmts, row, &mut stats);
    stats
}

fn walk(stmts: &mut [Stmt], row: &str, stats: &mut ControlRewrite) {
    for stmt in stmts {
        match stmt {
            Stmt::Continue => {
                stats.rewrote_continue = true;
                *stmt = early_return(row);
            }
            Stmt::Break => {
                stats.rewrote_break = true;
                *stmt = early_return(row);
            }
            Stmt::If(i) => {
                walk(&mut i.body, row, stats);
                walk(&mut i.orelse, row, stats);
            }
            Stmt::Try(t) => {
                walk(&mut t.body, row, stats);
                for handler in &mut t.handlers {
                    walk(&mut handler.body, row, stats);
                }
                walk(&mut t.orelse, row, stats);
                walk(&mut t.finalbody, row, stats);
            }
            Stmt::With(w) => walk(&mut w.body, row, stats),
            // For/While own their loop controls; defs own their scope.
            _ => {}
        }
    }
}

fn early_return(row: &str) -> Stmt {
    Stmt::Return(Some(Expr::index_row_tuple(row)))
}

/// True when any raw `continue`/`break` remains outside a nested loop —
/// the condition the worker body must never be in.
pub fn contains_raw_controls(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::Continue | Stmt::Break => true,
        Stmt::If(i) => contains_raw_controls(&i.body) || contains_raw_controls(&i.orelse),
        Stmt::Try(t) => {
            contains_raw_controls(&t.body)
                || t.handlers.iter().any(|h| contains_raw_controls(&h.body))
                || contains_raw_controls(&t.orelse)
                || contains_raw_controls(&t.finalbody)
        }
        Stmt::With(w) => contains_raw_controls(&w.body),
        _ => false,
    })
}

/// Wrap a captured loop body into the worker function. Every exit path
/// yields `(idx, <row>)`; the trailing return covers normal fall-through.
pub fn synthesize_worker(mut body: Vec<Stmt>, row: &str) -> (FunctionDef, ControlRewrite) {
    let stats = replace_loop_controls(&mut body, row);
    if stats.rewrote_break {
        debug!("`break` in extracted loop narrowed to per-row early return");
    }
    body.push(Stmt::Return(Some(Expr::index_row_tuple(row))));
    (
        FunctionDef {
            name: WORKER_NAME.to_string(),
            params: Params::positional(&["idx", row]),
            body,
            decorators: Vec::new(),
            returns: None,
            is_async: false,
        },
        stats,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::parser::parse_module;

    fn body_of(source: &str) -> Vec<Stmt> {
        let stmts = parse_module(source).expect("parse");
        match stmts.into_iter().next() {
            Some(Stmt::For(f)) => f.body,
            other => panic!("expected for loop, got {other:?}"),
        }
    }

    #[test]
    fn test_detects_loader_call_and_data_name() {
        let removed = HashSet::new();
        let ignored = ["get_bearer_token", "load_workbook", "read_excel", "get_access_token"];

        let call = Expr::call(
            Expr::attribute(Expr::name("sheet"), "iter_rows"),
            Vec::new(),
        );
        assert!(is_data_loop(&call, &removed, &ignored));
        assert!(is_data_loop(&Expr::name("data"), &removed, &ignored));
        assert!(!is_data_loop(&Expr::name("records"), &removed, &ignored));
    }

    #[test]
    fn test_detects_removed_variable_dependency() {
        let mut removed = HashSet::new();
        removed.insert("sheet".to_string());
        let iter = Expr::call(
            Expr::attribute(Expr::name("sheet"), "rows"),
            Vec::new(),
        );
        assert!(is_data_loop(&iter, &removed, &[]));
    }

    #[test]
    fn test_row_target_forms() {
        assert_eq!(
            loop_row_target(&Expr::name("row")).as_deref(),
            Some("row")
        );
        let unpack = Expr::Tuple(vec![Expr::name("i"), Expr::name("record")]);
        assert_eq!(loop_row_target(&unpack).as_deref(), Some("record"));
        let triple = Expr::Tuple(vec![Expr::name("a"), Expr::name("b"), Expr::name("c")]);
        assert_eq!(loop_row_target(&triple), None);
    }

    #[test]
    fn test_continue_becomes_early_return() {
        let body = body_of(
            "for row in data:\n    if not row['x']:\n        continue\n    row['y'] = 1\n",
        );
        let (worker, stats) = synthesize_worker(body, "row");
        assert!(stats.rewrote_continue);
        assert!(!stats.rewrote_break);
        assert!(!contains_raw_controls(&worker.body));

        let emitted = emit::module(&[Stmt::FunctionDef(worker)]);
        assert!(emitted.starts_with("def process_row(idx, row):"));
        assert_eq!(emitted.matches("return (idx, row)").count(), 2);
    }

    #[test]
    fn test_nested_loop_keeps_its_controls() {
        let body = body_of(
            "for row in data:\n    for item in row['items']:\n        if bad(item):\n            break\n    continue\n",
        );
        let (worker, stats) = synthesize_worker(body, "row");
        assert!(stats.rewrote_continue);
        // The nested for's break is its own; it must not be rewritten.
        assert!(!stats.rewrote_break);
        let emitted = emit::module(&[Stmt::FunctionDef(worker.clone())]);
        assert!(emitted.contains("break"));
        assert!(!contains_raw_controls(&worker.body));
    }

    #[test]
    fn test_break_is_narrowed_to_early_return() {
        let body = body_of("for row in data:\n    if row['stop']:\n        break\n    work(row)\n");
        let (worker, stats) = synthesize_worker(body, "row");
        assert!(stats.rewrote_break);
        let emitted = emit::module(&[Stmt::FunctionDef(worker)]);
        assert!(!emitted.contains("break"));
    }
}
