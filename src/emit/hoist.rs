// ABOUTME: Pre-scan of block scopes for declarations that must hoist to a leading `let`

use crate::ir::{IrKind, IrNode, ObjectProp, TypeExpr};

/// A name hoisted to the top of a block scope. The type annotation rides
/// along so top-level bindings stay typed at the hoisted site.
#[derive(Debug, Clone, PartialEq)]
pub struct HoistedName {
    pub name: String,
    pub ty: Option<TypeExpr>,
}

/// Collect every binding declared in this block scope, in declaration
/// order, without descending into nested scopes (function bodies and
/// nested blocks own their bindings).
///
/// Declarations found in expression position (`(foo (let x 1))`) hoist
/// exactly like statement-position ones: the source language treats both
/// as expressions yielding the bound value.
pub fn collect_scope_bindings(stmts: &[IrNode]) -> Vec<HoistedName> {
    let mut names = Vec::new();
    for stmt in stmts {
        scan_stmt(stmt, &mut names);
    }
    names
}

fn push_unique(names: &mut Vec<HoistedName>, name: String, ty: Option<TypeExpr>) {
    if !names.iter().any(|h| h.name == name) {
        names.push(HoistedName { name, ty });
    }
}

/// Names bound by a declaration target pattern
pub fn pattern_names(pattern: &IrNode, out: &mut Vec<String>) {
    match &pattern.kind {
        IrKind::Identifier { name, .. } => out.push(name.clone()),
        IrKind::ArrayPattern(elements) => {
            for el in elements {
                pattern_names(el, out);
            }
        }
        IrKind::ObjectPattern { props, rest } => {
            for prop in props {
                pattern_names(&prop.value, out);
            }
            if let Some(r) = rest {
                pattern_names(r, out);
            }
        }
        IrKind::RestElement(inner) => pattern_names(inner, out),
        IrKind::AssignmentPattern { target, .. } => pattern_names(target, out),
        _ => {}
    }
}

fn scan_stmt(stmt: &IrNode, names: &mut Vec<HoistedName>) {
    match &stmt.kind {
        IrKind::VariableDecl { name, ty, init, .. } => {
            let mut bound = Vec::new();
            pattern_names(name, &mut bound);
            let simple = bound.len() == 1 && matches!(name.kind, IrKind::Identifier { .. });
            for b in bound {
                push_unique(names, b, if simple { ty.clone() } else { None });
            }
            if let Some(init) = init {
                scan_expr(init, names);
            }
        }
        IrKind::ExprStmt(e) | IrKind::Throw(e) => scan_expr(e, names),
        IrKind::Return(Some(e)) => scan_expr(e, names),
        IrKind::Return(None) => {}
        // Non-block branches share the enclosing scope
        IrKind::If {
            test,
            consequent,
            alternate,
        } => {
            scan_expr(test, names);
            if !matches!(consequent.kind, IrKind::Block(_)) {
                scan_stmt(consequent, names);
            }
            if let Some(a) = alternate {
                if !matches!(a.kind, IrKind::Block(_)) {
                    scan_stmt(a, names);
                }
            }
        }
        IrKind::While { test, .. } => scan_expr(test, names),
        IrKind::ForOf { iterable, .. } => scan_expr(iterable, names),
        IrKind::Switch { discriminant, .. } => scan_expr(discriminant, names),
        IrKind::Labeled { body, .. } => {
            if !matches!(body.kind, IrKind::Block(_)) {
                scan_stmt(body, names);
            }
        }
        IrKind::ExportDecl(decl) => scan_stmt(decl, names),
        IrKind::ExportBinding { value, .. } => scan_expr(value, names),
        kind if is_expression(kind) => {
            scan_expr(stmt, names);
        }
        _ => {}
    }
}

/// Expression-position scan: declarations found here hoist into the
/// current scope; function bodies and blocks are scope boundaries
fn scan_expr(expr: &IrNode, names: &mut Vec<HoistedName>) {
    match &expr.kind {
        IrKind::VariableDecl { name, ty, init, .. } => {
            let mut bound = Vec::new();
            pattern_names(name, &mut bound);
            let simple = bound.len() == 1 && matches!(name.kind, IrKind::Identifier { .. });
            for b in bound {
                push_unique(names, b, if simple { ty.clone() } else { None });
            }
            if let Some(init) = init {
                scan_expr(init, names);
            }
        }
        IrKind::FnDecl { name, .. }
        | IrKind::FunctionDecl { name, .. }
        | IrKind::ClassDecl { name, .. }
        | IrKind::EnumDecl { name, .. } => {
            push_unique(names, name.clone(), None);
        }
        IrKind::Sequence(exprs) => {
            for e in exprs {
                scan_expr(e, names);
            }
        }
        IrKind::Binary { left, right, .. } | IrKind::Logical { left, right, .. } => {
            scan_expr(left, names);
            scan_expr(right, names);
        }
        IrKind::Unary { operand, .. } => scan_expr(operand, names),
        IrKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            scan_expr(test, names);
            scan_expr(consequent, names);
            scan_expr(alternate, names);
        }
        IrKind::Call { callee, args } | IrKind::New { callee, args } => {
            scan_expr(callee, names);
            for a in args {
                scan_expr(a, names);
            }
        }
        IrKind::OptionalCall { callee, args } => {
            scan_expr(callee, names);
            for a in args {
                scan_expr(a, names);
            }
        }
        IrKind::Member { object, property, computed, .. } => {
            scan_expr(object, names);
            if *computed {
                scan_expr(property, names);
            }
        }
        IrKind::ArrayLit(items) => {
            for i in items {
                scan_expr(i, names);
            }
        }
        IrKind::ObjectLit(props) => {
            for p in props {
                match p {
                    ObjectProp::KeyValue { value, .. } => scan_expr(value, names),
                    ObjectProp::Shorthand(v) | ObjectProp::Spread(v) => scan_expr(v, names),
                }
            }
        }
        IrKind::Assignment { target, value, .. } => {
            scan_expr(target, names);
            scan_expr(value, names);
        }
        IrKind::Await(e) | IrKind::Spread(e) => scan_expr(e, names),
        IrKind::Yield { argument, .. } => {
            if let Some(a) = argument {
                scan_expr(a, names);
            }
        }
        IrKind::TemplateLit { exprs, .. } => {
            for e in exprs {
                scan_expr(e, names);
            }
        }
        IrKind::InteropGet { object, .. } => scan_expr(object, names),
        IrKind::InteropCall { object, args, .. } => {
            scan_expr(object, names);
            for a in args {
                scan_expr(a, names);
            }
        }
        // Function bodies are their own scope
        IrKind::Function { .. } => {}
        _ => {}
    }
}

fn is_expression(kind: &IrKind) -> bool {
    !matches!(
        kind,
        IrKind::Block(_)
            | IrKind::If { .. }
            | IrKind::While { .. }
            | IrKind::For { .. }
            | IrKind::ForOf { .. }
            | IrKind::Switch { .. }
            | IrKind::Try { .. }
            | IrKind::Labeled { .. }
            | IrKind::Continue(_)
            | IrKind::Break(_)
            | IrKind::Import { .. }
            | IrKind::ExportNamed(_)
            | IrKind::FnDecl { .. }
            | IrKind::FunctionDecl { .. }
            | IrKind::ClassDecl { .. }
            | IrKind::EnumDecl { .. }
            | IrKind::TypeAlias { .. }
            | IrKind::InterfaceDecl { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower_module;
    use crate::reader::read_program;

    fn scope_names(text: &str) -> Vec<String> {
        let forms = read_program(text, "t.quill").unwrap();
        let module = lower_module(&forms).unwrap();
        collect_scope_bindings(&module.body)
            .into_iter()
            .map(|h| h.name)
            .collect()
    }

    #[test]
    fn test_statement_position_bindings_hoist() {
        assert_eq!(scope_names("(let x 3) (let y 4)"), vec!["x", "y"]);
    }

    #[test]
    fn test_expression_position_binding_hoists() {
        assert_eq!(
            scope_names("(let x 3) (let y (+ 1 (let z 2) z)) y"),
            vec!["x", "y", "z"]
        );
    }

    #[test]
    fn test_function_bodies_are_scope_boundaries() {
        assert_eq!(scope_names("(fn f [] (let inner 1))"), Vec::<String>::new());
    }

    #[test]
    fn test_destructuring_names_hoist() {
        assert_eq!(scope_names("(let [a b & r] xs)"), vec!["a", "b", "r"]);
    }

    #[test]
    fn test_no_duplicates() {
        assert_eq!(scope_names("(let x 1) (set! x 2) (let x 3)"), vec!["x"]);
    }
}
