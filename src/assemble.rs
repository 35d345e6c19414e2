//! Statement classification and reassembly.
//!
//! Top-level statements are partitioned into imports, definitions, literal
//! constants and execution, then re-emitted inside a single `run(data,
//! token, env_config)` function in dependency-safe order: names are always
//! bound before the execution bucket reads them, while the original
//! relative order survives within each bucket.

use log::debug;

use crate::ast::*;
use crate::cleaner::DISPATCH_MARK;
use crate::runtime;

/// Reserved name of the synthesized entry point.
pub const RUN_NAME: &str = "run";

/// A user-authored entry point is renamed to this and invoked internally.
pub const USER_RUN_NAME: &str = "_user_run";

#[derive(Default)]
pub struct Buckets {
    pub imports: Vec<Stmt>,
    pub constants: Vec<Stmt>,
    pub definitions: Vec<Stmt>,
    pub execution: Vec<Stmt>,
    pub main_guard: Option<If>,
}

/// Partition cleaned top-level statements. Order within each bucket is the
/// original statement order; only one main guard is kept (the last one
/// encountered, matching the original converter's single guard slot).
pub fn classify(body: Vec<Stmt>) -> Buckets {
    let mut buckets = Buckets::default();
    for stmt in body {
        match stmt {
            Stmt::Import { .. } | Stmt::ImportFrom { .. } => buckets.imports.push(stmt),
            Stmt::FunctionDef(_) | Stmt::ClassDef(_) => buckets.definitions.push(stmt),
            Stmt::If(i) if is_main_guard(&i.test) => {
                if buckets.main_guard.replace(i).is_some() {
                    debug!("multiple __name__ guards; keeping the last");
                }
            }
            stmt if is_constant_assign(&stmt) => buckets.constants.push(stmt),
            stmt => buckets.execution.push(stmt),
        }
    }
    buckets
}

/// Side-effect-free at definition time: literals, names, attribute access,
/// string interpolation of safe parts, containers of safe parts, and
/// unary/binary operations over them.
pub fn is_safe_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Num(_) | Expr::Bool(_) | Expr::NoneLit | Expr::Ellipsis => true,
        Expr::Str(lit) => lit.interpolations.iter().all(is_safe_expr),
        Expr::Name(_) => true,
        Expr::Attribute { .. } => true,
        Expr::BinOp { left, right, .. } => is_safe_expr(left) && is_safe_expr(right),
        Expr::UnaryOp { operand, .. } => is_safe_expr(operand),
        Expr::List(elts) | Expr::Tuple(elts) => elts.iter().all(is_safe_expr),
        Expr::Dict(items) => items.iter().all(|item| match item {
            DictItem::Pair(k, v) => is_safe_expr(k) && is_safe_expr(v),
            DictItem::Unpack(_) => false,
        }),
        _ => false,
    }
}

/// A single-target, bare-name assignment whose value is provably safe.
pub fn is_constant_assign(stmt: &Stmt) -> bool {
    let Stmt::Assign { targets, value } = stmt else {
        return false;
    };
    targets.len() == 1 && matches!(targets[0], Expr::Name(_)) && is_safe_expr(value)
}

fn is_main_guard(test: &Expr) -> bool {
    matches!(
        test,
        Expr::Compare { left, .. } if matches!(left.as_ref(), Expr::Name(n) if n == "__name__")
    )
}

fn is_dispatch_mark(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(Expr::Name(n)) if n == DISPATCH_MARK)
}

/// Assemble the final entry point. Returns the synthesized `run` definition
/// and whether a user-authored `run` was renamed and chained.
pub fn build_run(
    mut buckets: Buckets,
    worker: Option<FunctionDef>,
    sequential: bool,
) -> (Stmt, bool) {
    let has_pandas = buckets.imports.iter().any(|stmt| {
        matches!(stmt, Stmt::Import { names } if names.iter().any(|a| a.name == "pandas"))
    });

    let mut user_run = false;
    for stmt in &mut buckets.definitions {
        if let Stmt::FunctionDef(f) = stmt {
            if f.name == RUN_NAME {
                f.name = USER_RUN_NAME.to_string();
                user_run = true;
                break;
            }
        }
    }

    // Splice the dispatch block where the extracted loop stood.
    let worker_present = worker.is_some();
    let mut execution = Vec::with_capacity(buckets.execution.len());
    let mut dispatched = false;
    for stmt in buckets.execution {
        if is_dispatch_mark(&stmt) {
            if worker_present && !dispatched {
                execution.extend(runtime::dispatch_stmts(sequential));
                dispatched = true;
            }
        } else {
            execution.push(stmt);
        }
    }
    if let Some(worker) = worker {
        buckets.definitions.push(Stmt::FunctionDef(worker));
        if !dispatched {
            execution.extend(runtime::dispatch_stmts(sequential));
        }
    }

    let mut body = Vec::new();
    body.extend(runtime::header_imports(has_pandas));
    body.append(&mut buckets.imports);
    body.extend(runtime::wrapper_defs());
    body.extend(runtime::setup_stmts());
    body.append(&mut buckets.constants);
    body.append(&mut buckets.definitions);
    body.extend(execution);

    if let Some(mut guard) = buckets.main_guard {
        guard.test = Expr::Bool(true);
        body.push(Stmt::If(guard));
    }

    if user_run {
        body.push(Stmt::Assign {
            targets: vec![Expr::name("res")],
            value: Expr::call(
                Expr::name(USER_RUN_NAME),
                vec![
                    Expr::name("data"),
                    Expr::name("token"),
                    Expr::name("env_config"),
                ],
            ),
        });
        body.extend(runtime::sync_stmts(true));
        body.push(Stmt::Return(Some(Expr::name("res"))));
    } else {
        body.extend(runtime::sync_stmts(false));
        body.push(Stmt::Return(Some(Expr::name("data"))));
    }

    let run = FunctionDef {
        name: RUN_NAME.to_string(),
        params: Params::positional(&["data", "token", "env_config"]),
        body,
        decorators: Vec::new(),
        returns: None,
        is_async: false,
    };
    (Stmt::FunctionDef(run), user_run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    fn classify_source(source: &str) -> Buckets {
        classify(parse_module(source).expect("parse"))
    }

    #[test]
    fn test_buckets_preserve_relative_order() {
        let buckets = classify_source(
            "import a\nX = 1\ndef f():\n    pass\nimport b\nY = 2\nwork()\ndef g():\n    pass\n",
        );
        assert_eq!(buckets.imports.len(), 2);
        assert_eq!(buckets.constants.len(), 2);
        assert_eq!(buckets.definitions.len(), 2);
        assert_eq!(buckets.execution.len(), 1);

        let Stmt::Assign { targets, .. } = &buckets.constants[0] else {
            panic!("expected assign")
        };
        assert!(matches!(&targets[0], Expr::Name(n) if n == "X"));
    }

    #[test]
    fn test_safe_expr_rules() {
        let safe = parse_module(
            "A = 5\nB = 'x'\nC = base + '/v2'\nD = [1, 2]\nE = {'k': name}\nF = f'{base}/api'\n",
        )
        .expect("parse");
        for stmt in &safe {
            assert!(is_constant_assign(stmt), "expected constant: {stmt:?}");
        }

        let unsafe_stmts =
            parse_module("G = fetch()\nH = rows[0]\nI = [x for x in rows]\nJ = f'{fetch()}'\n")
                .expect("parse");
        for stmt in &unsafe_stmts {
            assert!(!is_constant_assign(stmt), "expected execution: {stmt:?}");
        }
    }

    #[test]
    fn test_main_guard_is_lifted() {
        let buckets = classify_source(
            "if __name__ == '__main__':\n    main()\n",
        );
        assert!(buckets.main_guard.is_some());
        assert!(buckets.execution.is_empty());
    }

    #[test]
    fn test_guard_forced_true_and_last() {
        let buckets = classify_source("if __name__ == '__main__':\n    main()\n");
        let (run, _) = build_run(buckets, None, true);
        let Stmt::FunctionDef(run) = run else {
            panic!("expected def")
        };
        let guard = run
            .body
            .iter()
            .find_map(|s| match s {
                Stmt::If(i) if matches!(i.test, Expr::Bool(true)) => Some(i),
                _ => None,
            })
            .expect("guard present");
        assert_eq!(guard.orelse.len(), 0);
    }

    #[test]
    fn test_user_run_is_renamed_and_chained() {
        let buckets = classify_source("def run(data, token, env_config):\n    return data\n");
        let (run, user_run) = build_run(buckets, None, true);
        assert!(user_run);
        let Stmt::FunctionDef(run) = run else {
            panic!("expected def")
        };
        assert_eq!(run.name, "run");
        let has_renamed = run
            .body
            .iter()
            .any(|s| matches!(s, Stmt::FunctionDef(f) if f.name == USER_RUN_NAME));
        assert!(has_renamed);
        assert!(matches!(
            run.body.last(),
            Some(Stmt::Return(Some(Expr::Name(n)))) if n == "res"
        ));
    }

    #[test]
    fn test_without_user_run_data_is_returned() {
        let buckets = classify_source("x = compute()\n");
        let (run, user_run) = build_run(buckets, None, true);
        assert!(!user_run);
        let Stmt::FunctionDef(run) = run else {
            panic!("expected def")
        };
        assert!(matches!(
            run.body.last(),
            Some(Stmt::Return(Some(Expr::Name(n)))) if n == "data"
        ));
    }
}
