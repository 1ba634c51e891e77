// ABOUTME: Self-recursion TCO: rewrites tail self-calls into a while(true) loop

use crate::ir::{IrKind, IrNode, Param};
use tracing::debug;

/// Rewrite a declaration whose body tail-calls itself into a loop.
///
/// `function f(a) { … return f(x); … }` becomes
/// `function f(a) { while (true) { … a = x; continue; … } }`.
/// Non-tail self-calls are left intact, as are tail calls inside nested
/// loops or try blocks (a plain `continue` would bind to the wrong
/// construct there).
pub fn rewrite_self_recursion(node: IrNode) -> IrNode {
    let IrNode { kind, pos } = node;
    let kind = match kind {
        IrKind::FnDecl {
            name,
            params,
            json_params,
            body,
            is_async,
            return_type,
        } => {
            if eligible(&params, json_params) && body_has_tail_self_call(&body, &name) {
                debug!(name = %name, "applying self-recursion TCO");
                let new_body = loop_body(*body, &name, &params, &pos);
                IrKind::FnDecl {
                    name,
                    params,
                    json_params,
                    body: Box::new(new_body),
                    is_async,
                    return_type,
                }
            } else {
                IrKind::FnDecl {
                    name,
                    params,
                    json_params,
                    body,
                    is_async,
                    return_type,
                }
            }
        }
        IrKind::FunctionDecl {
            name,
            params,
            body,
            is_async,
            return_type,
        } => {
            if eligible(&params, false) && body_has_tail_self_call(&body, &name) {
                debug!(name = %name, "applying self-recursion TCO");
                let new_body = loop_body(*body, &name, &params, &pos);
                IrKind::FunctionDecl {
                    name,
                    params,
                    body: Box::new(new_body),
                    is_async,
                    return_type,
                }
            } else {
                IrKind::FunctionDecl {
                    name,
                    params,
                    body,
                    is_async,
                    return_type,
                }
            }
        }
        IrKind::ExportDecl(decl) => {
            IrKind::ExportDecl(Box::new(rewrite_self_recursion(*decl)))
        }
        other => other,
    };
    IrNode { kind, pos }
}

/// Loop parameter rebinding only works for plain identifier parameters
fn eligible(params: &[Param], json_params: bool) -> bool {
    !json_params
        && params.iter().all(|p| {
            p.default.is_none() && matches!(p.pattern.kind, IrKind::Identifier { .. })
        })
}

fn param_names(params: &[Param]) -> Vec<String> {
    params
        .iter()
        .filter_map(|p| p.pattern.identifier_name().map(|n| n.to_string()))
        .collect()
}

/// Does any tail return in this body call `name` directly?
fn body_has_tail_self_call(body: &IrNode, name: &str) -> bool {
    match &body.kind {
        IrKind::Block(stmts) => stmts.iter().any(|s| stmt_has_tail_self_call(s, name)),
        _ => false,
    }
}

fn stmt_has_tail_self_call(stmt: &IrNode, name: &str) -> bool {
    match &stmt.kind {
        IrKind::Return(Some(value)) => expr_has_tail_self_call(value, name),
        IrKind::If {
            consequent,
            alternate,
            ..
        } => {
            stmt_has_tail_self_call(consequent, name)
                || alternate
                    .as_deref()
                    .is_some_and(|a| stmt_has_tail_self_call(a, name))
        }
        IrKind::Block(stmts) => stmts.iter().any(|s| stmt_has_tail_self_call(s, name)),
        // Tail calls under try/loops are not rewritten, so they do not
        // count toward eligibility either
        _ => false,
    }
}

/// Mirrors exactly what `rewrite_return` can rewrite. A self-call in the
/// right operand of a logical operator stays a plain call: looping it
/// would force the left operand to evaluate twice.
fn expr_has_tail_self_call(expr: &IrNode, name: &str) -> bool {
    match &expr.kind {
        IrKind::Call { callee, .. } => callee.identifier_name() == Some(name),
        IrKind::Conditional {
            consequent,
            alternate,
            ..
        } => {
            expr_has_tail_self_call(consequent, name) || expr_has_tail_self_call(alternate, name)
        }
        IrKind::Sequence(exprs) => exprs
            .last()
            .is_some_and(|e| expr_has_tail_self_call(e, name)),
        _ => false,
    }
}

/// Wrap the rewritten statements in `while (true) { … }`
fn loop_body(
    body: IrNode,
    name: &str,
    params: &[Param],
    pos: &crate::ast::Position,
) -> IrNode {
    let names = param_names(params);
    let stmts = match body.kind {
        IrKind::Block(stmts) => stmts,
        other => vec![IrNode::new(other, body.pos)],
    };
    let rewritten: Vec<IrNode> = stmts
        .into_iter()
        .map(|s| rewrite_stmt(s, name, &names))
        .collect();

    let loop_stmt = IrNode::new(
        IrKind::While {
            test: Box::new(IrNode::bool(true, pos.clone())),
            body: Box::new(IrNode::block(rewritten, pos.clone())),
        },
        pos.clone(),
    );
    IrNode::block(vec![loop_stmt], pos.clone())
}

fn rewrite_stmt(stmt: IrNode, name: &str, params: &[String]) -> IrNode {
    let IrNode { kind, pos } = stmt;
    let kind = match kind {
        IrKind::Return(Some(value)) => {
            return rewrite_return(*value, name, params, pos);
        }
        IrKind::If {
            test,
            consequent,
            alternate,
        } => IrKind::If {
            test,
            consequent: Box::new(rewrite_stmt(*consequent, name, params)),
            alternate: alternate.map(|a| Box::new(rewrite_stmt(*a, name, params))),
        },
        IrKind::Block(stmts) => IrKind::Block(
            stmts
                .into_iter()
                .map(|s| rewrite_stmt(s, name, params))
                .collect(),
        ),
        other => other,
    };
    IrNode { kind, pos }
}

/// Rewrite `return <value>` when the value tail-calls the function.
///
/// Conditional tail positions split into if/else statements so each arm
/// can independently become a rebind-and-continue or a plain return;
/// comma sequences split into statements ahead of the rewritten final
/// expression.
fn rewrite_return(
    value: IrNode,
    name: &str,
    params: &[String],
    pos: crate::ast::Position,
) -> IrNode {
    if !expr_has_tail_self_call(&value, name) {
        return IrNode::new(IrKind::Return(Some(Box::new(value))), pos);
    }
    match value.kind {
        IrKind::Call { callee, args } if callee.identifier_name() == Some(name) => {
            rebind_and_continue(args, params, &value.pos)
        }
        IrKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let cons_pos = consequent.pos.clone();
            let alt_pos = alternate.pos.clone();
            IrNode::new(
                IrKind::If {
                    test,
                    consequent: Box::new(rewrite_return(*consequent, name, params, cons_pos)),
                    alternate: Some(Box::new(rewrite_return(*alternate, name, params, alt_pos))),
                },
                pos,
            )
        }
        IrKind::Sequence(mut exprs) => match exprs.pop() {
            Some(last) => {
                let mut stmts: Vec<IrNode> = exprs
                    .into_iter()
                    .map(|e| {
                        let stmt_pos = e.pos.clone();
                        IrNode::new(IrKind::ExprStmt(Box::new(e)), stmt_pos)
                    })
                    .collect();
                let last_pos = last.pos.clone();
                stmts.push(rewrite_return(last, name, params, last_pos));
                IrNode::block(stmts, pos)
            }
            None => IrNode::new(
                IrKind::Return(Some(Box::new(IrNode::new(
                    IrKind::Sequence(Vec::new()),
                    value.pos,
                )))),
                pos,
            ),
        },
        other => IrNode::new(
            IrKind::Return(Some(Box::new(IrNode::new(other, value.pos)))),
            pos,
        ),
    }
}

/// `a = x; continue;` for one parameter, `[a, b] = [x, y]; continue;`
/// for several, plain `continue` for none
fn rebind_and_continue(
    args: Vec<IrNode>,
    params: &[String],
    pos: &crate::ast::Position,
) -> IrNode {
    let mut stmts = Vec::with_capacity(2);
    match params.len() {
        0 => {}
        1 => {
            let target = IrNode::ident(params[0].clone(), pos.clone());
            let value = args
                .into_iter()
                .next()
                .unwrap_or_else(|| IrNode::new(IrKind::NullLit, pos.clone()));
            stmts.push(IrNode::new(
                IrKind::ExprStmt(Box::new(IrNode::new(
                    IrKind::Assignment {
                        op: "=",
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    pos.clone(),
                ))),
                pos.clone(),
            ));
        }
        _ => {
            let targets: Vec<IrNode> = params
                .iter()
                .map(|p| IrNode::ident(p.clone(), pos.clone()))
                .collect();
            stmts.push(IrNode::new(
                IrKind::ExprStmt(Box::new(IrNode::new(
                    IrKind::Assignment {
                        op: "=",
                        target: Box::new(IrNode::new(IrKind::ArrayPattern(targets), pos.clone())),
                        value: Box::new(IrNode::new(IrKind::ArrayLit(args), pos.clone())),
                    },
                    pos.clone(),
                ))),
                pos.clone(),
            ));
        }
    }
    stmts.push(IrNode::new(IrKind::Continue(None), pos.clone()));
    IrNode::block(stmts, pos.clone())
}
