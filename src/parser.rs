//! Python parsing and lowering.
//!
//! Source text is parsed with tree-sitter and lowered into the crate's typed
//! AST. Parsing is fail-fast: any error node in the tree aborts the whole
//! conversion with a location-carrying diagnostic. Lowering, by contrast, is
//! total — node kinds the converter does not model are carried through as
//! verbatim source so structural surprises degrade instead of failing.

use log::debug;
use tree_sitter::{Node, Parser};

use crate::ast::*;
use crate::error::ConvertError;

/// Parse a whole script into a statement list.
pub fn parse_module(source: &str) -> Result<Vec<Stmt>, ConvertError> {
    let mut parser = Parser::new();
    let language = tree_sitter_python::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| ConvertError::Language(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ConvertError::Language("parser produced no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        let (line, column, snippet) = first_error(root, source);
        return Err(ConvertError::Syntax {
            line,
            column,
            snippet,
        });
    }

    let lowerer = Lowerer { src: source };
    Ok(lowerer.block(root))
}

/// Locate the first error or missing node for the syntax diagnostic.
fn first_error(node: Node, source: &str) -> (usize, usize, String) {
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        let text = node
            .utf8_text(source.as_bytes())
            .unwrap_or("")
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(60)
            .collect::<String>();
        return (pos.row + 1, pos.column + 1, text);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            return first_error(child, source);
        }
    }
    let pos = node.start_position();
    (pos.row + 1, pos.column + 1, String::new())
}

struct Lowerer<'a> {
    src: &'a str,
}

impl<'a> Lowerer<'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.src.as_bytes()).unwrap_or("")
    }

    fn named_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .collect()
    }

    /// Lower a `module` or `block` node into statements.
    fn block(&self, node: Node) -> Vec<Stmt> {
        self.named_children(node)
            .into_iter()
            .map(|child| self.stmt(child))
            .collect()
    }

    fn stmt(&self, node: Node) -> Stmt {
        match node.kind() {
            "function_definition" => self.function_def(node, Vec::new()),
            "class_definition" => self.class_def(node, Vec::new()),
            "decorated_definition" => self.decorated(node),
            "if_statement" => self.if_stmt(node),
            "for_statement" => self.for_stmt(node),
            "while_statement" => self.while_stmt(node),
            "try_statement" => self.try_stmt(node),
            "with_statement" => self.with_stmt(node),
            "import_statement" => self.import_stmt(node),
            "import_from_statement" => self.import_from(node, None),
            "future_import_statement" => self.import_from(node, Some("__future__")),
            "expression_statement" => self.expr_stmt(node),
            "return_statement" => Stmt::Return(self.optional_value(node)),
            "delete_statement" => Stmt::Delete(self.expr_list_items(node)),
            "raise_statement" => self.raise_stmt(node),
            "assert_statement" => {
                let parts = self.named_children(node);
                Stmt::Assert {
                    test: parts
                        .first()
                        .map(|n| self.expr(*n))
                        .unwrap_or(Expr::Bool(true)),
                    msg: parts.get(1).map(|n| self.expr(*n)),
                }
            }
            "global_statement" => {
                Stmt::Global(self.named_children(node).iter().map(|n| self.text(*n).to_string()).collect())
            }
            "nonlocal_statement" => {
                Stmt::Nonlocal(self.named_children(node).iter().map(|n| self.text(*n).to_string()).collect())
            }
            "pass_statement" => Stmt::Pass,
            "break_statement" => Stmt::Break,
            "continue_statement" => Stmt::Continue,
            other => {
                debug!("lowering `{}` statement verbatim", other);
                Stmt::Verbatim(self.verbatim(node))
            }
        }
    }

    fn decorated(&self, node: Node) -> Stmt {
        let mut decorators = Vec::new();
        for child in self.named_children(node) {
            if child.kind() == "decorator" {
                if let Some(inner) = self.named_children(child).first() {
                    decorators.push(self.expr(*inner));
                }
            }
        }
        match node.child_by_field_name("definition") {
            Some(def) if def.kind() == "function_definition" => self.function_def(def, decorators),
            Some(def) if def.kind() == "class_definition" => self.class_def(def, decorators),
            _ => Stmt::Verbatim(self.verbatim(node)),
        }
    }

    fn function_def(&self, node: Node, decorators: Vec<Expr>) -> Stmt {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.params(p))
            .unwrap_or_default();
        let returns = node.child_by_field_name("return_type").map(|r| self.expr(r));
        let body = node
            .child_by_field_name("body")
            .map(|b| self.block(b))
            .unwrap_or_default();
        Stmt::FunctionDef(FunctionDef {
            name,
            params,
            body,
            decorators,
            returns,
            is_async: self.has_token(node, "async"),
        })
    }

    fn class_def(&self, node: Node, decorators: Vec<Expr>) -> Stmt {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let bases = node
            .child_by_field_name("superclasses")
            .map(|args| self.call_args(args))
            .unwrap_or_default();
        let body = node
            .child_by_field_name("body")
            .map(|b| self.block(b))
            .unwrap_or_default();
        Stmt::ClassDef(ClassDef {
            name,
            bases,
            body,
            decorators,
        })
    }

    fn if_stmt(&self, node: Node) -> Stmt {
        let test = node
            .child_by_field_name("condition")
            .map(|c| self.expr(c))
            .unwrap_or(Expr::Bool(true));
        let body = node
            .child_by_field_name("consequence")
            .map(|b| self.block(b))
            .unwrap_or_default();

        let mut cursor = node.walk();
        let clauses: Vec<Node> = node
            .children_by_field_name("alternative", &mut cursor)
            .collect();

        // Fold elif/else clauses from the back into nested orelse lists.
        let mut orelse: Vec<Stmt> = Vec::new();
        for clause in clauses.into_iter().rev() {
            match clause.kind() {
                "else_clause" => {
                    orelse = clause
                        .child_by_field_name("body")
                        .map(|b| self.block(b))
                        .unwrap_or_default();
                }
                "elif_clause" => {
                    let elif_test = clause
                        .child_by_field_name("condition")
                        .map(|c| self.expr(c))
                        .unwrap_or(Expr::Bool(true));
                    let elif_body = clause
                        .child_by_field_name("consequence")
                        .map(|b| self.block(b))
                        .unwrap_or_default();
                    orelse = vec![Stmt::If(If {
                        test: elif_test,
                        body: elif_body,
                        orelse,
                    })];
                }
                _ => {}
            }
        }

        Stmt::If(If { test, body, orelse })
    }

    fn for_stmt(&self, node: Node) -> Stmt {
        let target = node
            .child_by_field_name("left")
            .map(|t| self.expr(t))
            .unwrap_or(Expr::name("_"));
        let iter = node
            .child_by_field_name("right")
            .map(|i| self.expr(i))
            .unwrap_or(Expr::NoneLit);
        let body = node
            .child_by_field_name("body")
            .map(|b| self.block(b))
            .unwrap_or_default();
        let orelse = node
            .child_by_field_name("alternative")
            .and_then(|e| e.child_by_field_name("body"))
            .map(|b| self.block(b))
            .unwrap_or_default();
        Stmt::For(For {
            target,
            iter,
            body,
            orelse,
            is_async: self.has_token(node, "async"),
        })
    }

    fn while_stmt(&self, node: Node) -> Stmt {
        let test = node
            .child_by_field_name("condition")
            .map(|c| self.expr(c))
            .unwrap_or(Expr::Bool(true));
        let body = node
            .child_by_field_name("body")
            .map(|b| self.block(b))
            .unwrap_or_default();
        let orelse = node
            .child_by_field_name("alternative")
            .and_then(|e| e.child_by_field_name("body"))
            .map(|b| self.block(b))
            .unwrap_or_default();
        Stmt::While(While { test, body, orelse })
    }

    fn try_stmt(&self, node: Node) -> Stmt {
        let body = node
            .child_by_field_name("body")
            .map(|b| self.block(b))
            .unwrap_or_default();
        let mut handlers = Vec::new();
        let mut orelse = Vec::new();
        let mut finalbody = Vec::new();

        for child in self.named_children(node) {
            match child.kind() {
                "except_clause" => {
                    let parts = self.named_children(child);
                    let mut typ = None;
                    let mut name = None;
                    let mut handler_body = Vec::new();
                    for part in parts {
                        if part.kind() == "block" {
                            handler_body = self.block(part);
                        } else if typ.is_none() {
                            typ = Some(self.expr(part));
                        } else {
                            name = Some(self.text(part).to_string());
                        }
                    }
                    handlers.push(ExceptHandler {
                        typ,
                        name,
                        body: handler_body,
                    });
                }
                "else_clause" => {
                    orelse = child
                        .child_by_field_name("body")
                        .map(|b| self.block(b))
                        .unwrap_or_default();
                }
                "finally_clause" => {
                    finalbody = self
                        .named_children(child)
                        .iter()
                        .find(|n| n.kind() == "block")
                        .map(|b| self.block(*b))
                        .unwrap_or_default();
                }
                _ => {}
            }
        }

        Stmt::Try(Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn with_stmt(&self, node: Node) -> Stmt {
        let mut items = Vec::new();
        for child in self.named_children(node) {
            if child.kind() != "with_clause" {
                continue;
            }
            for item in self.named_children(child) {
                if item.kind() != "with_item" {
                    continue;
                }
                let value = item
                    .child_by_field_name("value")
                    .or_else(|| self.named_children(item).first().copied());
                let Some(value) = value else { continue };
                if value.kind() == "as_pattern" {
                    let inner = self.named_children(value);
                    let expr = inner
                        .first()
                        .map(|n| self.expr(*n))
                        .unwrap_or(Expr::NoneLit);
                    let alias = value
                        .child_by_field_name("alias")
                        .map(|a| {
                            self.named_children(a)
                                .first()
                                .map(|n| self.expr(*n))
                                .unwrap_or_else(|| Expr::name(self.text(a)))
                        })
                        .or_else(|| inner.get(1).map(|n| self.expr(*n)));
                    items.push(WithItem { expr, alias });
                } else {
                    items.push(WithItem {
                        expr: self.expr(value),
                        alias: None,
                    });
                }
            }
        }
        let body = node
            .child_by_field_name("body")
            .map(|b| self.block(b))
            .unwrap_or_default();
        Stmt::With(With {
            items,
            body,
            is_async: self.has_token(node, "async"),
        })
    }

    fn import_stmt(&self, node: Node) -> Stmt {
        let names = self
            .named_children(node)
            .into_iter()
            .map(|child| self.alias(child))
            .collect();
        Stmt::Import { names }
    }

    fn import_from(&self, node: Node, forced_module: Option<&str>) -> Stmt {
        let module = forced_module
            .map(|m| m.to_string())
            .or_else(|| {
                node.child_by_field_name("module_name")
                    .map(|m| self.text(m).to_string())
            })
            .unwrap_or_default();

        let mut wildcard = false;
        {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "wildcard_import" {
                    wildcard = true;
                }
            }
        }

        let mut cursor = node.walk();
        let names = node
            .children_by_field_name("name", &mut cursor)
            .map(|child| self.alias(child))
            .collect();

        Stmt::ImportFrom {
            module,
            names,
            wildcard,
        }
    }

    fn alias(&self, node: Node) -> Alias {
        if node.kind() == "aliased_import" {
            let name = node
                .child_by_field_name("name")
                .map(|n| self.text(n).to_string())
                .unwrap_or_default();
            let asname = node
                .child_by_field_name("alias")
                .map(|a| self.text(a).to_string());
            Alias { name, asname }
        } else {
            Alias {
                name: self.text(node).to_string(),
                asname: None,
            }
        }
    }

    fn expr_stmt(&self, node: Node) -> Stmt {
        let children = self.named_children(node);
        let Some(&inner) = children.first() else {
            return Stmt::Pass;
        };
        match inner.kind() {
            "assignment" => self.assignment(inner),
            "augmented_assignment" => {
                let target = inner
                    .child_by_field_name("left")
                    .map(|t| self.expr(t))
                    .unwrap_or(Expr::name("_"));
                let op = inner
                    .child_by_field_name("operator")
                    .map(|o| self.text(o).to_string())
                    .unwrap_or_else(|| "+=".to_string());
                let value = inner
                    .child_by_field_name("right")
                    .map(|v| self.expr(v))
                    .unwrap_or(Expr::NoneLit);
                Stmt::AugAssign { target, op, value }
            }
            _ => Stmt::Expr(self.expr(inner)),
        }
    }

    fn assignment(&self, node: Node) -> Stmt {
        let left = node.child_by_field_name("left");
        let annotation = node.child_by_field_name("type").map(|t| self.expr(t));
        let right = node.child_by_field_name("right");

        if let Some(annotation) = annotation {
            return Stmt::AnnAssign {
                target: left.map(|t| self.expr(t)).unwrap_or(Expr::name("_")),
                annotation,
                value: right.map(|v| self.expr(v)),
            };
        }

        // Chained assignment (`a = b = value`) nests on the right.
        let mut targets = Vec::new();
        if let Some(t) = left {
            targets.push(self.expr(t));
        }
        let mut current = right;
        while let Some(node) = current {
            if node.kind() == "assignment" {
                if let Some(t) = node.child_by_field_name("left") {
                    targets.push(self.expr(t));
                }
                current = node.child_by_field_name("right");
            } else {
                return Stmt::Assign {
                    targets,
                    value: self.expr(node),
                };
            }
        }
        Stmt::Assign {
            targets,
            value: Expr::NoneLit,
        }
    }

    fn raise_stmt(&self, node: Node) -> Stmt {
        let parts = self.named_children(node);
        let has_from = {
            let mut cursor = node.walk();
            let found = node.children(&mut cursor).any(|c| c.kind() == "from");
            found
        };
        Stmt::Raise {
            exc: parts.first().map(|n| self.expr(*n)),
            cause: if has_from {
                parts.get(1).map(|n| self.expr(*n))
            } else {
                None
            },
        }
    }

    /// Optional single value of `return`/`yield`-like statements; a bare
    /// expression list becomes a tuple.
    fn optional_value(&self, node: Node) -> Option<Expr> {
        self.named_children(node).first().map(|n| self.expr(*n))
    }

    fn expr_list_items(&self, node: Node) -> Vec<Expr> {
        let children = self.named_children(node);
        match children.first() {
            Some(first) if first.kind() == "expression_list" => self
                .named_children(*first)
                .iter()
                .map(|n| self.expr(*n))
                .collect(),
            Some(first) => vec![self.expr(*first)],
            None => Vec::new(),
        }
    }

    fn has_token(&self, node: Node, token: &str) -> bool {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).any(|c| c.kind() == token);
        found
    }

    // ----- expressions -------------------------------------------------

    fn expr(&self, node: Node) -> Expr {
        match node.kind() {
            "identifier" => Expr::Name(self.text(node).to_string()),
            "integer" | "float" => Expr::Num(self.text(node).to_string()),
            "true" => Expr::Bool(true),
            "false" => Expr::Bool(false),
            "none" => Expr::NoneLit,
            "ellipsis" => Expr::Ellipsis,
            "string" => Expr::Str(self.string_lit(node)),
            "concatenated_string" => {
                let mut interpolations = Vec::new();
                for child in self.named_children(node) {
                    if child.kind() == "string" {
                        interpolations.extend(self.string_lit(child).interpolations);
                    }
                }
                Expr::Str(StrLit {
                    raw: self.text(node).to_string(),
                    interpolations,
                })
            }
            "parenthesized_expression" => self
                .named_children(node)
                .first()
                .map(|n| self.expr(*n))
                .unwrap_or(Expr::NoneLit),
            "expression_list" | "tuple" | "tuple_pattern" | "pattern_list" => Expr::Tuple(
                self.named_children(node)
                    .iter()
                    .map(|n| self.expr(*n))
                    .collect(),
            ),
            "list" | "list_pattern" => Expr::List(
                self.named_children(node)
                    .iter()
                    .map(|n| self.expr(*n))
                    .collect(),
            ),
            "set" => Expr::Set(
                self.named_children(node)
                    .iter()
                    .map(|n| self.expr(*n))
                    .collect(),
            ),
            "dictionary" => {
                let mut items = Vec::new();
                for child in self.named_children(node) {
                    match child.kind() {
                        "pair" => {
                            let key = child
                                .child_by_field_name("key")
                                .map(|k| self.expr(k))
                                .unwrap_or(Expr::NoneLit);
                            let value = child
                                .child_by_field_name("value")
                                .map(|v| self.expr(v))
                                .unwrap_or(Expr::NoneLit);
                            items.push(DictItem::Pair(key, value));
                        }
                        "dictionary_splat" => {
                            if let Some(inner) = self.named_children(child).first() {
                                items.push(DictItem::Unpack(self.expr(*inner)));
                            }
                        }
                        _ => {}
                    }
                }
                Expr::Dict(items)
            }
            "attribute" => {
                let value = node
                    .child_by_field_name("object")
                    .map(|o| self.expr(o))
                    .unwrap_or(Expr::NoneLit);
                let attr = node
                    .child_by_field_name("attribute")
                    .map(|a| self.text(a).to_string())
                    .unwrap_or_default();
                Expr::Attribute {
                    value: Box::new(value),
                    attr,
                }
            }
            "subscript" => {
                let value = node
                    .child_by_field_name("value")
                    .map(|v| self.expr(v))
                    .unwrap_or(Expr::NoneLit);
                let mut cursor = node.walk();
                let mut subs: Vec<Expr> = node
                    .children_by_field_name("subscript", &mut cursor)
                    .map(|s| self.expr(s))
                    .collect();
                let index = match subs.len() {
                    0 => Expr::NoneLit,
                    1 => subs.remove(0),
                    _ => Expr::Tuple(subs),
                };
                Expr::Subscript {
                    value: Box::new(value),
                    index: Box::new(index),
                }
            }
            "slice" => self.slice(node),
            "call" => {
                let func = node
                    .child_by_field_name("function")
                    .map(|f| self.expr(f))
                    .unwrap_or(Expr::NoneLit);
                let args = node
                    .child_by_field_name("arguments")
                    .map(|a| self.call_args(a))
                    .unwrap_or_default();
                Expr::Call {
                    func: Box::new(func),
                    args,
                }
            }
            "binary_operator" => {
                let left = node
                    .child_by_field_name("left")
                    .map(|l| self.expr(l))
                    .unwrap_or(Expr::NoneLit);
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o).to_string())
                    .unwrap_or_else(|| "+".to_string());
                let right = node
                    .child_by_field_name("right")
                    .map(|r| self.expr(r))
                    .unwrap_or(Expr::NoneLit);
                Expr::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                }
            }
            "boolean_operator" => {
                let left = node
                    .child_by_field_name("left")
                    .map(|l| self.expr(l))
                    .unwrap_or(Expr::Bool(true));
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o).to_string())
                    .unwrap_or_else(|| "and".to_string());
                let right = node
                    .child_by_field_name("right")
                    .map(|r| self.expr(r))
                    .unwrap_or(Expr::Bool(true));
                // Flatten chains of the same operator into one value list.
                let mut values = Vec::new();
                match left {
                    Expr::BoolOp {
                        op: ref inner_op,
                        values: ref inner_values,
                    } if *inner_op == op => values.extend(inner_values.clone()),
                    other => values.push(other),
                }
                values.push(right);
                Expr::BoolOp { op, values }
            }
            "not_operator" => {
                let operand = node
                    .child_by_field_name("argument")
                    .map(|a| self.expr(a))
                    .unwrap_or(Expr::Bool(true));
                Expr::UnaryOp {
                    op: "not".to_string(),
                    operand: Box::new(operand),
                }
            }
            "unary_operator" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o).to_string())
                    .unwrap_or_else(|| "-".to_string());
                let operand = node
                    .child_by_field_name("argument")
                    .map(|a| self.expr(a))
                    .unwrap_or(Expr::Num("0".to_string()));
                Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                }
            }
            "comparison_operator" => self.comparison(node),
            "conditional_expression" => {
                let parts = self.named_children(node);
                Expr::IfExp {
                    body: Box::new(parts.first().map(|n| self.expr(*n)).unwrap_or(Expr::NoneLit)),
                    test: Box::new(
                        parts
                            .get(1)
                            .map(|n| self.expr(*n))
                            .unwrap_or(Expr::Bool(true)),
                    ),
                    orelse: Box::new(parts.get(2).map(|n| self.expr(*n)).unwrap_or(Expr::NoneLit)),
                }
            }
            "lambda" => {
                let params = node
                    .child_by_field_name("parameters")
                    .map(|p| self.params(p))
                    .unwrap_or_default();
                let body = node
                    .child_by_field_name("body")
                    .map(|b| self.expr(b))
                    .unwrap_or(Expr::NoneLit);
                Expr::Lambda {
                    params: Box::new(params),
                    body: Box::new(body),
                }
            }
            "named_expression" => {
                let target = node
                    .child_by_field_name("name")
                    .map(|n| self.expr(n))
                    .unwrap_or(Expr::name("_"));
                let value = node
                    .child_by_field_name("value")
                    .map(|v| self.expr(v))
                    .unwrap_or(Expr::NoneLit);
                Expr::Named {
                    target: Box::new(target),
                    value: Box::new(value),
                }
            }
            "list_comprehension" => self.comprehension(node, CompKind::List),
            "set_comprehension" => self.comprehension(node, CompKind::Set),
            "generator_expression" => self.comprehension(node, CompKind::Generator),
            "dictionary_comprehension" => self.comprehension(node, CompKind::Dict),
            "await" => {
                let inner = self
                    .named_children(node)
                    .first()
                    .map(|n| self.expr(*n))
                    .unwrap_or(Expr::NoneLit);
                Expr::Await(Box::new(inner))
            }
            "yield" => {
                let inner = self.named_children(node).first().map(|n| self.expr(*n));
                if self.has_token(node, "from") {
                    Expr::YieldFrom(Box::new(inner.unwrap_or(Expr::NoneLit)))
                } else {
                    Expr::Yield(inner.map(Box::new))
                }
            }
            "list_splat" | "list_splat_pattern" => {
                let inner = self
                    .named_children(node)
                    .first()
                    .map(|n| self.expr(*n))
                    .unwrap_or(Expr::name("_"));
                Expr::Starred(Box::new(inner))
            }
            other => {
                debug!("lowering `{}` expression verbatim", other);
                Expr::Verbatim(self.verbatim(node))
            }
        }
    }

    fn comparison(&self, node: Node) -> Expr {
        let mut operands: Vec<Expr> = Vec::new();
        let mut ops: Vec<String> = Vec::new();
        let mut pending_op: Vec<&str> = Vec::new();

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "comment" {
                continue;
            }
            if child.is_named() {
                if !operands.is_empty() {
                    ops.push(pending_op.join(" "));
                    pending_op.clear();
                }
                operands.push(self.expr(child));
            } else {
                pending_op.push(self.text(child));
            }
        }

        let mut iter = operands.into_iter();
        let left = iter.next().unwrap_or(Expr::NoneLit);
        Expr::Compare {
            left: Box::new(left),
            ops,
            comparators: iter.collect(),
        }
    }

    fn comprehension(&self, node: Node, kind: CompKind) -> Expr {
        let (key, elt) = match kind {
            CompKind::Dict => {
                let pair = node.child_by_field_name("body");
                let key = pair
                    .and_then(|p| p.child_by_field_name("key"))
                    .map(|k| self.expr(k))
                    .unwrap_or(Expr::NoneLit);
                let value = pair
                    .and_then(|p| p.child_by_field_name("value"))
                    .map(|v| self.expr(v))
                    .unwrap_or(Expr::NoneLit);
                (Some(key), value)
            }
            _ => (
                None,
                node.child_by_field_name("body")
                    .map(|b| self.expr(b))
                    .unwrap_or(Expr::NoneLit),
            ),
        };

        let mut generators: Vec<Generator> = Vec::new();
        for child in self.named_children(node) {
            match child.kind() {
                "for_in_clause" => {
                    let target = child
                        .child_by_field_name("left")
                        .map(|t| self.expr(t))
                        .unwrap_or(Expr::name("_"));
                    let iter = child
                        .child_by_field_name("right")
                        .map(|i| self.expr(i))
                        .unwrap_or(Expr::NoneLit);
                    generators.push(Generator {
                        target,
                        iter,
                        ifs: Vec::new(),
                        is_async: self.has_token(child, "async"),
                    });
                }
                "if_clause" => {
                    if let Some(cond) = self.named_children(child).first() {
                        if let Some(last) = generators.last_mut() {
                            last.ifs.push(self.expr(*cond));
                        }
                    }
                }
                _ => {}
            }
        }

        Expr::Comp(Box::new(Comp {
            kind,
            key,
            elt,
            generators,
        }))
    }

    fn slice(&self, node: Node) -> Expr {
        let mut parts: Vec<Option<Expr>> = vec![None];
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == ":" {
                parts.push(None);
            } else if child.is_named() && child.kind() != "comment" {
                if let Some(slot) = parts.last_mut() {
                    *slot = Some(self.expr(child));
                }
            }
        }
        let mut iter = parts.into_iter();
        Expr::Slice {
            lower: iter.next().flatten().map(Box::new),
            upper: iter.next().flatten().map(Box::new),
            step: iter.next().flatten().map(Box::new),
        }
    }

    fn call_args(&self, node: Node) -> Vec<CallArg> {
        if node.kind() == "generator_expression" {
            return vec![CallArg::Pos(self.comprehension(node, CompKind::Generator))];
        }
        let mut args = Vec::new();
        for child in self.named_children(node) {
            match child.kind() {
                "keyword_argument" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let value = child
                        .child_by_field_name("value")
                        .map(|v| self.expr(v))
                        .unwrap_or(Expr::NoneLit);
                    args.push(CallArg::Kw(name, value));
                }
                "list_splat" => {
                    if let Some(inner) = self.named_children(child).first() {
                        args.push(CallArg::Star(self.expr(*inner)));
                    }
                }
                "dictionary_splat" => {
                    if let Some(inner) = self.named_children(child).first() {
                        args.push(CallArg::KwStar(self.expr(*inner)));
                    }
                }
                _ => args.push(CallArg::Pos(self.expr(child))),
            }
        }
        args
    }

    fn params(&self, node: Node) -> Params {
        let mut params = Params::default();
        let mut seen_star = false;

        let mut push = |params: &mut Params, seen_star: bool, param: Param| {
            if seen_star {
                params.kwonly.push(param);
            } else {
                params.args.push(param);
            }
        };

        for child in self.named_children(node) {
            match child.kind() {
                "identifier" => {
                    push(&mut params, seen_star, Param::new(self.text(child)));
                }
                "default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let default = child.child_by_field_name("value").map(|v| self.expr(v));
                    push(
                        &mut params,
                        seen_star,
                        Param {
                            name,
                            annotation: None,
                            default,
                        },
                    );
                }
                "typed_parameter" => {
                    let name = self
                        .named_children(child)
                        .first()
                        .map(|n| self.text(*n).to_string())
                        .unwrap_or_default();
                    let annotation = child.child_by_field_name("type").map(|t| self.expr(t));
                    push(
                        &mut params,
                        seen_star,
                        Param {
                            name,
                            annotation,
                            default: None,
                        },
                    );
                }
                "typed_default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let annotation = child.child_by_field_name("type").map(|t| self.expr(t));
                    let default = child.child_by_field_name("value").map(|v| self.expr(v));
                    push(
                        &mut params,
                        seen_star,
                        Param {
                            name,
                            annotation,
                            default,
                        },
                    );
                }
                "list_splat_pattern" => {
                    let name = self
                        .named_children(child)
                        .first()
                        .map(|n| self.text(*n).to_string())
                        .unwrap_or_default();
                    params.vararg = Some(Param {
                        name,
                        annotation: None,
                        default: None,
                    });
                    seen_star = true;
                }
                "keyword_separator" => {
                    params.vararg = Some(Param::new(""));
                    seen_star = true;
                }
                "dictionary_splat_pattern" => {
                    let name = self
                        .named_children(child)
                        .first()
                        .map(|n| self.text(*n).to_string())
                        .unwrap_or_default();
                    params.kwarg = Some(Param {
                        name,
                        annotation: None,
                        default: None,
                    });
                }
                "positional_separator" => {
                    params.posonly_count = params.args.len();
                }
                other => {
                    debug!("unmodeled parameter kind `{}`", other);
                    push(&mut params, seen_star, Param::new(self.text(child)));
                }
            }
        }
        params
    }

    fn string_lit(&self, node: Node) -> StrLit {
        let mut interpolations = Vec::new();
        for child in self.named_children(node) {
            if child.kind() == "interpolation" {
                let expr_node = child
                    .child_by_field_name("expression")
                    .or_else(|| self.named_children(child).first().copied());
                if let Some(expr_node) = expr_node {
                    interpolations.push(self.expr(expr_node));
                }
            }
        }
        StrLit {
            raw: self.text(node).to_string(),
            interpolations,
        }
    }

    fn verbatim(&self, node: Node) -> Verbatim {
        let base = node.start_byte();
        let mut protected = Vec::new();
        collect_string_ranges(node, base, &mut protected);
        Verbatim {
            raw: self.text(node).to_string(),
            base_col: node.start_position().column,
            protected,
        }
    }
}

/// Record byte ranges of string tokens relative to `base` so re-indentation
/// never rewrites a line that starts inside a literal.
fn collect_string_ranges(node: Node, base: usize, out: &mut Vec<(usize, usize)>) {
    if node.kind() == "string" || node.kind() == "concatenated_string" {
        out.push((node.start_byte() - base, node.end_byte() - base));
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_string_ranges(child, base, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Stmt {
        let mut stmts = parse_module(source).expect("parse");
        assert_eq!(stmts.len(), 1, "expected one statement in {:?}", source);
        stmts.remove(0)
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let err = parse_module("def broken(:\n    pass\n").unwrap_err();
        match err {
            ConvertError::Syntax { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lowers_for_over_data() {
        let stmt = parse_one("for row in data:\n    row['x'] = 1\n");
        let Stmt::For(f) = stmt else {
            panic!("expected for")
        };
        assert!(matches!(f.target, Expr::Name(ref n) if n == "row"));
        assert!(matches!(f.iter, Expr::Name(ref n) if n == "data"));
        assert_eq!(f.body.len(), 1);
    }

    #[test]
    fn test_lowers_tuple_unpack_target() {
        let stmt = parse_one("for idx, row in enumerate(data):\n    pass\n");
        let Stmt::For(f) = stmt else {
            panic!("expected for")
        };
        let Expr::Tuple(elts) = &f.target else {
            panic!("expected tuple target, got {:?}", f.target)
        };
        assert_eq!(elts.len(), 2);
    }

    #[test]
    fn test_lowers_qualified_call_with_keywords() {
        let stmt = parse_one("requests.get(url, headers=h, timeout=30)\n");
        let Stmt::Expr(Expr::Call { func, args }) = stmt else {
            panic!("expected call")
        };
        assert_eq!(full_func_name(&func).as_deref(), Some("requests.get"));
        assert_eq!(args.len(), 3);
        assert!(matches!(&args[1], CallArg::Kw(name, _) if name == "headers"));
    }

    #[test]
    fn test_lowers_chained_comparison() {
        let stmt = parse_one("ok = 200 <= status < 300\n");
        let Stmt::Assign { value, .. } = stmt else {
            panic!("expected assign")
        };
        let Expr::Compare { ops, .. } = value else {
            panic!("expected compare")
        };
        assert_eq!(ops, vec!["<=", "<"]);
    }

    #[test]
    fn test_lowers_not_in_operator() {
        let stmt = parse_one("missing = key not in row\n");
        let Stmt::Assign { value, .. } = stmt else {
            panic!("expected assign")
        };
        let Expr::Compare { ops, .. } = value else {
            panic!("expected compare")
        };
        assert_eq!(ops, vec!["not in"]);
    }

    #[test]
    fn test_elif_folds_into_orelse() {
        let stmt = parse_one("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        let Stmt::If(outer) = stmt else {
            panic!("expected if")
        };
        assert_eq!(outer.orelse.len(), 1);
        let Stmt::If(inner) = &outer.orelse[0] else {
            panic!("expected nested elif")
        };
        assert_eq!(inner.orelse.len(), 1);
    }

    #[test]
    fn test_fstring_interpolations_are_parsed() {
        let stmt = parse_one("msg = f\"row {idx} of {total}\"\n");
        let Stmt::Assign { value, .. } = stmt else {
            panic!("expected assign")
        };
        let Expr::Str(lit) = value else {
            panic!("expected string")
        };
        assert_eq!(lit.interpolations.len(), 2);
        assert!(lit.is_fstring());
    }

    #[test]
    fn test_unknown_statement_survives_verbatim() {
        let source = "match point:\n    case (0, 0):\n        x = 1\n    case _:\n        x = 2\n";
        let stmts = parse_module(source).expect("parse");
        assert!(matches!(&stmts[0], Stmt::Verbatim(v) if v.raw.starts_with("match point:")));
    }

    #[test]
    fn test_default_parameters() {
        let stmt = parse_one("def f(a, b=1, *rest, c=2, **kw):\n    pass\n");
        let Stmt::FunctionDef(f) = stmt else {
            panic!("expected def")
        };
        assert_eq!(f.params.args.len(), 2);
        assert!(f.params.args[1].default.is_some());
        assert_eq!(f.params.vararg.as_ref().map(|p| p.name.as_str()), Some("rest"));
        assert_eq!(f.params.kwonly.len(), 1);
        assert!(f.params.kwarg.is_some());
    }
}
