//! Python source emission.
//!
//! Prints the typed AST back to source text. Output is deterministic: the
//! same tree always serializes to the same bytes. Expressions are
//! parenthesized by a precedence table; literals are emitted from their raw
//! source text; verbatim nodes are re-indented line by line, except for
//! lines that start inside a string token.

use crate::ast::*;

const INDENT: &str = "    ";

// Precedence levels, higher binds tighter.
const P_LOWEST: u8 = 1; // yield
const P_LAMBDA: u8 = 2;
const P_TERNARY: u8 = 3;
const P_OR: u8 = 4;
const P_AND: u8 = 5;
const P_NOT: u8 = 6;
const P_CMP: u8 = 7;
const P_UNARY: u8 = 14;
const P_POWER: u8 = 15;
const P_AWAIT: u8 = 16;
const P_POSTFIX: u8 = 17;
const P_ATOM: u8 = 18;

fn bin_prec(op: &str) -> (u8, bool) {
    // (precedence, right-associative)
    match op {
        "|" => (8, false),
        "^" => (9, false),
        "&" => (10, false),
        "<<" | ">>" => (11, false),
        "+" | "-" => (12, false),
        "*" | "/" | "//" | "%" | "@" => (13, false),
        "**" => (P_POWER, true),
        _ => (12, false),
    }
}

/// Emit a whole module.
pub fn module(stmts: &[Stmt]) -> String {
    let mut emitter = Emitter {
        out: String::new(),
        indent: 0,
    };
    for stmt in stmts {
        emitter.stmt(stmt);
    }
    emitter.out
}

struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.indent += 1;
        if stmts.is_empty() {
            self.line_start();
            self.out.push_str("pass\n");
        } else {
            for stmt in stmts {
                self.stmt(stmt);
            }
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(f) => self.function_def(f),
            Stmt::ClassDef(c) => self.class_def(c),
            Stmt::Return(value) => {
                self.line_start();
                match value {
                    Some(v) => {
                        self.out.push_str("return ");
                        self.expr(v, P_LOWEST);
                    }
                    None => self.out.push_str("return"),
                }
                self.out.push('\n');
            }
            Stmt::Delete(targets) => {
                self.line_start();
                self.out.push_str("del ");
                self.comma_exprs(targets);
                self.out.push('\n');
            }
            Stmt::Assign { targets, value } => {
                self.line_start();
                for target in targets {
                    self.target(target);
                    self.out.push_str(" = ");
                }
                self.expr(value, P_LOWEST);
                self.out.push('\n');
            }
            Stmt::AugAssign { target, op, value } => {
                self.line_start();
                self.expr(target, P_LOWEST);
                self.out.push(' ');
                self.out.push_str(op);
                self.out.push(' ');
                self.expr(value, P_LOWEST);
                self.out.push('\n');
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
            } => {
                self.line_start();
                self.expr(target, P_LOWEST);
                self.out.push_str(": ");
                self.expr(annotation, P_LOWEST);
                if let Some(value) = value {
                    self.out.push_str(" = ");
                    self.expr(value, P_LOWEST);
                }
                self.out.push('\n');
            }
            Stmt::For(f) => {
                self.line_start();
                if f.is_async {
                    self.out.push_str("async ");
                }
                self.out.push_str("for ");
                self.target(&f.target);
                self.out.push_str(" in ");
                self.expr(&f.iter, P_LOWEST);
                self.out.push_str(":\n");
                self.block(&f.body);
                if !f.orelse.is_empty() {
                    self.line_start();
                    self.out.push_str("else:\n");
                    self.block(&f.orelse);
                }
            }
            Stmt::While(w) => {
                self.line_start();
                self.out.push_str("while ");
                self.expr(&w.test, P_LOWEST);
                self.out.push_str(":\n");
                self.block(&w.body);
                if !w.orelse.is_empty() {
                    self.line_start();
                    self.out.push_str("else:\n");
                    self.block(&w.orelse);
                }
            }
            Stmt::If(i) => self.if_stmt(i),
            Stmt::With(w) => {
                self.line_start();
                if w.is_async {
                    self.out.push_str("async ");
                }
                self.out.push_str("with ");
                for (pos, item) in w.items.iter().enumerate() {
                    if pos > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(&item.expr, P_LAMBDA);
                    if let Some(alias) = &item.alias {
                        self.out.push_str(" as ");
                        self.expr(alias, P_LAMBDA);
                    }
                }
                self.out.push_str(":\n");
                self.block(&w.body);
            }
            Stmt::Raise { exc, cause } => {
                self.line_start();
                self.out.push_str("raise");
                if let Some(exc) = exc {
                    self.out.push(' ');
                    self.expr(exc, P_LAMBDA);
                }
                if let Some(cause) = cause {
                    self.out.push_str(" from ");
                    self.expr(cause, P_LAMBDA);
                }
                self.out.push('\n');
            }
            Stmt::Try(t) => {
                self.line_start();
                self.out.push_str("try:\n");
                self.block(&t.body);
                for handler in &t.handlers {
                    self.line_start();
                    self.out.push_str("except");
                    if let Some(typ) = &handler.typ {
                        self.out.push(' ');
                        self.expr(typ, P_LAMBDA);
                        if let Some(name) = &handler.name {
                            self.out.push_str(" as ");
                            self.out.push_str(name);
                        }
                    }
                    self.out.push_str(":\n");
                    self.block(&handler.body);
                }
                if !t.orelse.is_empty() {
                    self.line_start();
                    self.out.push_str("else:\n");
                    self.block(&t.orelse);
                }
                if !t.finalbody.is_empty() {
                    self.line_start();
                    self.out.push_str("finally:\n");
                    self.block(&t.finalbody);
                }
            }
            Stmt::Assert { test, msg } => {
                self.line_start();
                self.out.push_str("assert ");
                self.expr(test, P_LAMBDA);
                if let Some(msg) = msg {
                    self.out.push_str(", ");
                    self.expr(msg, P_LAMBDA);
                }
                self.out.push('\n');
            }
            Stmt::Import { names } => {
                self.line_start();
                self.out.push_str("import ");
                self.aliases(names);
                self.out.push('\n');
            }
            Stmt::ImportFrom {
                module,
                names,
                wildcard,
            } => {
                self.line_start();
                self.out.push_str("from ");
                self.out.push_str(module);
                self.out.push_str(" import ");
                if *wildcard {
                    self.out.push('*');
                } else {
                    self.aliases(names);
                }
                self.out.push('\n');
            }
            Stmt::Global(names) => {
                self.line_start();
                self.out.push_str("global ");
                self.out.push_str(&names.join(", "));
                self.out.push('\n');
            }
            Stmt::Nonlocal(names) => {
                self.line_start();
                self.out.push_str("nonlocal ");
                self.out.push_str(&names.join(", "));
                self.out.push('\n');
            }
            Stmt::Expr(expr) => {
                self.line_start();
                self.expr(expr, P_LOWEST);
                self.out.push('\n');
            }
            Stmt::Pass => {
                self.line_start();
                self.out.push_str("pass\n");
            }
            Stmt::Break => {
                self.line_start();
                self.out.push_str("break\n");
            }
            Stmt::Continue => {
                self.line_start();
                self.out.push_str("continue\n");
            }
            Stmt::Verbatim(v) => self.verbatim_stmt(v),
        }
    }

    fn if_stmt(&mut self, i: &If) {
        self.line_start();
        self.out.push_str("if ");
        self.expr(&i.test, P_LOWEST);
        self.out.push_str(":\n");
        self.block(&i.body);
        // `elif` chains live as a single nested If in orelse.
        let mut orelse = &i.orelse;
        loop {
            match orelse.as_slice() {
                [] => break,
                [Stmt::If(nested)] => {
                    self.line_start();
                    self.out.push_str("elif ");
                    self.expr(&nested.test, P_LOWEST);
                    self.out.push_str(":\n");
                    self.block(&nested.body);
                    orelse = &nested.orelse;
                }
                other => {
                    self.line_start();
                    self.out.push_str("else:\n");
                    self.block(other);
                    break;
                }
            }
        }
    }

    fn function_def(&mut self, f: &FunctionDef) {
        for decorator in &f.decorators {
            self.line_start();
            self.out.push('@');
            self.expr(decorator, P_POSTFIX);
            self.out.push('\n');
        }
        self.line_start();
        if f.is_async {
            self.out.push_str("async ");
        }
        self.out.push_str("def ");
        self.out.push_str(&f.name);
        self.out.push('(');
        self.params(&f.params);
        self.out.push(')');
        if let Some(returns) = &f.returns {
            self.out.push_str(" -> ");
            self.expr(returns, P_LOWEST);
        }
        self.out.push_str(":\n");
        self.block(&f.body);
    }

    fn class_def(&mut self, c: &ClassDef) {
        for decorator in &c.decorators {
            self.line_start();
            self.out.push('@');
            self.expr(decorator, P_POSTFIX);
            self.out.push('\n');
        }
        self.line_start();
        self.out.push_str("class ");
        self.out.push_str(&c.name);
        if !c.bases.is_empty() {
            self.out.push('(');
            self.call_args(&c.bases);
            self.out.push(')');
        }
        self.out.push_str(":\n");
        self.block(&c.body);
    }

    fn params(&mut self, params: &Params) {
        let mut first = true;
        let sep = |out: &mut String, first: &mut bool| {
            if !*first {
                out.push_str(", ");
            }
            *first = false;
        };

        for (pos, param) in params.args.iter().enumerate() {
            sep(&mut self.out, &mut first);
            self.param(param);
            if params.posonly_count > 0 && pos + 1 == params.posonly_count {
                sep(&mut self.out, &mut first);
                self.out.push('/');
            }
        }
        if let Some(vararg) = &params.vararg {
            sep(&mut self.out, &mut first);
            self.out.push('*');
            self.out.push_str(&vararg.name);
        }
        for param in &params.kwonly {
            sep(&mut self.out, &mut first);
            self.param(param);
        }
        if let Some(kwarg) = &params.kwarg {
            sep(&mut self.out, &mut first);
            self.out.push_str("**");
            self.out.push_str(&kwarg.name);
        }
    }

    fn param(&mut self, param: &Param) {
        self.out.push_str(&param.name);
        if let Some(annotation) = &param.annotation {
            self.out.push_str(": ");
            self.expr(annotation, P_LOWEST);
            if let Some(default) = &param.default {
                self.out.push_str(" = ");
                self.expr(default, P_LOWEST);
            }
        } else if let Some(default) = &param.default {
            self.out.push('=');
            self.expr(default, P_LAMBDA);
        }
    }

    fn aliases(&mut self, names: &[Alias]) {
        for (pos, alias) in names.iter().enumerate() {
            if pos > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(&alias.name);
            if let Some(asname) = &alias.asname {
                self.out.push_str(" as ");
                self.out.push_str(asname);
            }
        }
    }

    fn comma_exprs(&mut self, exprs: &[Expr]) {
        for (pos, expr) in exprs.iter().enumerate() {
            if pos > 0 {
                self.out.push_str(", ");
            }
            self.expr(expr, P_LAMBDA);
        }
    }

    fn call_args(&mut self, args: &[CallArg]) {
        for (pos, arg) in args.iter().enumerate() {
            if pos > 0 {
                self.out.push_str(", ");
            }
            match arg {
                CallArg::Pos(e) => self.expr(e, P_LAMBDA),
                CallArg::Star(e) => {
                    self.out.push('*');
                    self.expr(e, P_UNARY);
                }
                CallArg::Kw(name, e) => {
                    self.out.push_str(name);
                    self.out.push('=');
                    self.expr(e, P_LAMBDA);
                }
                CallArg::KwStar(e) => {
                    self.out.push_str("**");
                    self.expr(e, P_UNARY);
                }
            }
        }
    }

    fn expr(&mut self, expr: &Expr, min: u8) {
        let prec = expr_prec(expr);
        let needs_parens = prec < min;
        if needs_parens {
            self.out.push('(');
        }
        self.expr_inner(expr);
        if needs_parens {
            self.out.push(')');
        }
    }

    fn expr_inner(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(id) => self.out.push_str(id),
            Expr::Num(raw) => self.out.push_str(raw),
            Expr::Str(lit) => self.out.push_str(&lit.raw),
            Expr::Bool(true) => self.out.push_str("True"),
            Expr::Bool(false) => self.out.push_str("False"),
            Expr::NoneLit => self.out.push_str("None"),
            Expr::Ellipsis => self.out.push_str("..."),
            Expr::Tuple(elts) => {
                self.out.push('(');
                self.comma_exprs(elts);
                if elts.len() == 1 {
                    self.out.push(',');
                }
                self.out.push(')');
            }
            Expr::List(elts) => {
                self.out.push('[');
                self.comma_exprs(elts);
                self.out.push(']');
            }
            Expr::Set(elts) => {
                if elts.is_empty() {
                    self.out.push_str("set()");
                } else {
                    self.out.push('{');
                    self.comma_exprs(elts);
                    self.out.push('}');
                }
            }
            Expr::Dict(items) => {
                self.out.push('{');
                for (pos, item) in items.iter().enumerate() {
                    if pos > 0 {
                        self.out.push_str(", ");
                    }
                    match item {
                        DictItem::Pair(k, v) => {
                            self.expr(k, P_LAMBDA);
                            self.out.push_str(": ");
                            self.expr(v, P_LAMBDA);
                        }
                        DictItem::Unpack(e) => {
                            self.out.push_str("**");
                            self.expr(e, P_UNARY);
                        }
                    }
                }
                self.out.push('}');
            }
            Expr::Attribute { value, attr } => {
                if matches!(value.as_ref(), Expr::Num(_)) {
                    self.out.push('(');
                    self.expr(value, P_LOWEST);
                    self.out.push(')');
                } else {
                    self.expr(value, P_POSTFIX);
                }
                self.out.push('.');
                self.out.push_str(attr);
            }
            Expr::Subscript { value, index } => {
                self.expr(value, P_POSTFIX);
                self.out.push('[');
                self.subscript_index(index);
                self.out.push(']');
            }
            Expr::Slice { .. } => self.subscript_index(expr),
            Expr::Call { func, args } => {
                self.expr(func, P_POSTFIX);
                self.out.push('(');
                self.call_args(args);
                self.out.push(')');
            }
            Expr::BinOp { left, op, right } => {
                let (prec, right_assoc) = bin_prec(op);
                let (lmin, rmin) = if right_assoc {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                self.expr(left, lmin);
                self.out.push(' ');
                self.out.push_str(op);
                self.out.push(' ');
                self.expr(right, rmin);
            }
            Expr::UnaryOp { op, operand } => {
                if op == "not" {
                    self.out.push_str("not ");
                    self.expr(operand, P_NOT);
                } else {
                    self.out.push_str(op);
                    self.expr(operand, P_UNARY);
                }
            }
            Expr::BoolOp { op, values } => {
                let prec = if op == "or" { P_OR } else { P_AND };
                for (pos, value) in values.iter().enumerate() {
                    if pos > 0 {
                        self.out.push(' ');
                        self.out.push_str(op);
                        self.out.push(' ');
                    }
                    self.expr(value, prec + 1);
                }
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                self.expr(left, P_CMP + 1);
                for (op, comparator) in ops.iter().zip(comparators) {
                    self.out.push(' ');
                    self.out.push_str(op);
                    self.out.push(' ');
                    self.expr(comparator, P_CMP + 1);
                }
            }
            Expr::IfExp { body, test, orelse } => {
                self.expr(body, P_OR);
                self.out.push_str(" if ");
                self.expr(test, P_OR);
                self.out.push_str(" else ");
                self.expr(orelse, P_TERNARY);
            }
            Expr::Lambda { params, body } => {
                self.out.push_str("lambda");
                if !(params.args.is_empty()
                    && params.vararg.is_none()
                    && params.kwonly.is_empty()
                    && params.kwarg.is_none())
                {
                    self.out.push(' ');
                    self.params(params);
                }
                self.out.push_str(": ");
                self.expr(body, P_LAMBDA);
            }
            Expr::Comp(comp) => {
                let (open, close) = match comp.kind {
                    CompKind::List => ("[", "]"),
                    CompKind::Set | CompKind::Dict => ("{", "}"),
                    CompKind::Generator => ("(", ")"),
                };
                self.out.push_str(open);
                if let Some(key) = &comp.key {
                    self.expr(key, P_LAMBDA);
                    self.out.push_str(": ");
                }
                self.expr(&comp.elt, P_LAMBDA);
                for generator in &comp.generators {
                    if generator.is_async {
                        self.out.push_str(" async");
                    }
                    self.out.push_str(" for ");
                    self.target(&generator.target);
                    self.out.push_str(" in ");
                    self.expr(&generator.iter, P_OR);
                    for cond in &generator.ifs {
                        self.out.push_str(" if ");
                        self.expr(cond, P_OR);
                    }
                }
                self.out.push_str(close);
            }
            Expr::Starred(inner) => {
                self.out.push('*');
                self.expr(inner, P_UNARY);
            }
            Expr::Await(inner) => {
                self.out.push_str("await ");
                self.expr(inner, P_POSTFIX);
            }
            Expr::Yield(value) => {
                self.out.push_str("yield");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expr(value, P_LAMBDA);
                }
            }
            Expr::YieldFrom(value) => {
                self.out.push_str("yield from ");
                self.expr(value, P_LAMBDA);
            }
            Expr::Named { target, value } => {
                self.out.push('(');
                self.expr(target, P_POSTFIX);
                self.out.push_str(" := ");
                self.expr(value, P_LAMBDA);
                self.out.push(')');
            }
            Expr::Verbatim(v) => self.out.push_str(&v.raw),
        }
    }

    /// Binding position (`for x, y in ...`, `a, b = ...`): tuples print
    /// without parentheses, the way Python sources write them.
    fn target(&mut self, target: &Expr) {
        match target {
            Expr::Tuple(elts) if elts.len() > 1 => self.comma_exprs(elts),
            other => self.expr(other, P_LAMBDA),
        }
    }

    /// Subscript index position: slices print bare (`a[1:2]`), tuples of
    /// slices comma-join, everything else is a normal expression.
    fn subscript_index(&mut self, index: &Expr) {
        match index {
            Expr::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    self.expr(lower, P_LAMBDA);
                }
                self.out.push(':');
                if let Some(upper) = upper {
                    self.expr(upper, P_LAMBDA);
                }
                if let Some(step) = step {
                    self.out.push(':');
                    self.expr(step, P_LAMBDA);
                }
            }
            Expr::Tuple(elts) if elts.iter().any(|e| matches!(e, Expr::Slice { .. })) => {
                for (pos, elt) in elts.iter().enumerate() {
                    if pos > 0 {
                        self.out.push_str(", ");
                    }
                    self.subscript_index(elt);
                }
            }
            other => self.expr(other, P_LOWEST),
        }
    }

    fn verbatim_stmt(&mut self, v: &Verbatim) {
        self.line_start();
        let bytes = v.raw.as_bytes();
        let mut line_begin = 0usize;
        let mut offset = 0usize;
        let mut first = true;
        while offset <= bytes.len() {
            let at_end = offset == bytes.len();
            if at_end || bytes[offset] == b'\n' {
                let line = &v.raw[line_begin..offset];
                if first {
                    self.out.push_str(line);
                    first = false;
                } else if inside_ranges(line_begin, &v.protected) {
                    // Line begins inside a string literal: keep as written.
                    self.out.push_str(line);
                } else {
                    let stripped = strip_columns(line, v.base_col);
                    for _ in 0..self.indent {
                        self.out.push_str(INDENT);
                    }
                    self.out.push_str(stripped);
                }
                if at_end {
                    break;
                }
                self.out.push('\n');
                line_begin = offset + 1;
            }
            offset += 1;
        }
        self.out.push('\n');
    }
}

fn inside_ranges(offset: usize, ranges: &[(usize, usize)]) -> bool {
    ranges
        .iter()
        .any(|(start, end)| offset > *start && offset < *end)
}

/// Drop up to `cols` leading whitespace characters.
fn strip_columns(line: &str, cols: usize) -> &str {
    let mut taken = 0;
    let mut index = 0;
    for (pos, c) in line.char_indices() {
        if taken >= cols || !c.is_whitespace() || c == '\n' {
            index = pos;
            break;
        }
        taken += 1;
        index = pos + c.len_utf8();
    }
    &line[index..]
}

fn expr_prec(expr: &Expr) -> u8 {
    match expr {
        Expr::Name(_)
        | Expr::Num(_)
        | Expr::Str(_)
        | Expr::Bool(_)
        | Expr::NoneLit
        | Expr::Ellipsis
        | Expr::Tuple(_)
        | Expr::List(_)
        | Expr::Set(_)
        | Expr::Dict(_)
        | Expr::Comp(_)
        | Expr::Named { .. }
        | Expr::Verbatim(_) => P_ATOM,
        Expr::Attribute { .. } | Expr::Subscript { .. } | Expr::Call { .. } => P_POSTFIX,
        Expr::Await(_) => P_AWAIT,
        Expr::BinOp { op, .. } => bin_prec(op).0,
        Expr::UnaryOp { op, .. } => {
            if op == "not" {
                P_NOT
            } else {
                P_UNARY
            }
        }
        Expr::BoolOp { op, .. } => {
            if op == "or" {
                P_OR
            } else {
                P_AND
            }
        }
        Expr::Compare { .. } => P_CMP,
        Expr::IfExp { .. } => P_TERNARY,
        Expr::Lambda { .. } => P_LAMBDA,
        Expr::Starred(_) => P_UNARY,
        Expr::Yield(_) | Expr::YieldFrom(_) => P_LOWEST,
        Expr::Slice { .. } => P_LOWEST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    fn round_trip(source: &str) -> String {
        let stmts = parse_module(source).expect("parse input");
        let emitted = module(&stmts);
        parse_module(&emitted).expect("emitted code parses");
        emitted
    }

    #[test]
    fn test_emits_call_with_keywords() {
        let out = round_trip("requests.get(url, headers=h, timeout=30)\n");
        assert_eq!(out, "requests.get(url, headers=h, timeout=30)\n");
    }

    #[test]
    fn test_preserves_precedence_with_parens() {
        let out = round_trip("x = (a + b) * c\n");
        assert_eq!(out, "x = (a + b) * c\n");
        let flat = round_trip("x = a + b * c\n");
        assert_eq!(flat, "x = a + b * c\n");
    }

    #[test]
    fn test_chained_compare_in_ternary() {
        let out = round_trip("icon = '+' if 200 <= code < 300 else '-'\n");
        assert_eq!(out, "icon = '+' if 200 <= code < 300 else '-'\n");
    }

    #[test]
    fn test_fstring_is_verbatim() {
        let out = round_trip("print(f\"[Row {idx}] value: {row['x']}\")\n");
        assert_eq!(out, "print(f\"[Row {idx}] value: {row['x']}\")\n");
    }

    #[test]
    fn test_slice_emission() {
        let out = round_trip("snippet = text[:4000]\n");
        assert_eq!(out, "snippet = text[:4000]\n");
    }

    #[test]
    fn test_dict_comprehension() {
        let out = round_trip("futures = {pool.submit(work, i, r): i for i, r in enumerate(rows)}\n");
        assert_eq!(
            out,
            "futures = {pool.submit(work, i, r): i for i, r in enumerate(rows)}\n"
        );
    }

    #[test]
    fn test_empty_bodies_get_pass() {
        let stmts = vec![Stmt::If(If {
            test: Expr::Bool(true),
            body: Vec::new(),
            orelse: Vec::new(),
        })];
        assert_eq!(module(&stmts), "if True:\n    pass\n");
    }

    #[test]
    fn test_class_with_decorated_methods() {
        let source = "\
class MockCell:

    def __init__(self, row_data, key):
        self.row_data = row_data
        self.key = key

    @property
    def value(self):
        return self.row_data.get(self.key)

    @value.setter
    def value(self, val):
        self.row_data[self.key] = val
";
        let stmts = parse_module(source).expect("parse");
        let emitted = module(&stmts);
        parse_module(&emitted).expect("emitted parses");
        assert!(emitted.contains("@value.setter"));
        assert!(emitted.contains("def __init__(self, row_data, key):"));
    }

    #[test]
    fn test_try_except_finally() {
        let out = round_trip(
            "try:\n    risky()\nexcept Exception as e:\n    print(e)\nfinally:\n    done()\n",
        );
        assert!(out.contains("except Exception as e:"));
        assert!(out.contains("finally:"));
    }

    #[test]
    fn test_deterministic_output() {
        let source = "for row in data:\n    if not row.get('x'):\n        continue\n    row['y'] = 1\n";
        assert_eq!(round_trip(source), round_trip(source));
    }
}
