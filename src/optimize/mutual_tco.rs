// ABOUTME: Mutual-recursion TCO: tail-call graph, Tarjan SCC, thunk and trampoline rewriting

use crate::ast::Position;
use crate::ir::{IrKind, IrNode, ObjectProp};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Rewrite mutually tail-recursive top-level functions.
///
/// Tail calls between distinct members of a recursion group become
/// zero-arg thunks; every other call to a group member goes through the
/// trampoline helper, which keeps invoking returned thunks until a
/// non-function value appears. Self-tail-calls are left for the
/// self-recursion pass.
pub fn rewrite_mutual_recursion(body: Vec<IrNode>) -> Vec<IrNode> {
    let functions = collect_top_level_functions(&body);
    if functions.len() < 2 {
        return body;
    }

    let graph = tail_call_graph(&body, &functions);
    let groups: Vec<HashSet<String>> = tarjan_sccs(&functions, &graph)
        .into_iter()
        .filter(|scc| scc.len() >= 2)
        .map(|scc| scc.into_iter().collect())
        .collect();
    if groups.is_empty() {
        return body;
    }
    for group in &groups {
        let mut names: Vec<&String> = group.iter().collect();
        names.sort();
        debug!(?names, "mutual-recursion group");
    }

    body.into_iter()
        .map(|node| rewrite_node(node, &groups, None))
        .collect()
}

/// Names of function declarations at module top level (including
/// exported ones)
fn collect_top_level_functions(body: &[IrNode]) -> Vec<String> {
    let mut names = Vec::new();
    for node in body {
        let kind = match &node.kind {
            IrKind::ExportDecl(decl) => &decl.kind,
            other => other,
        };
        match kind {
            IrKind::FnDecl { name, .. } | IrKind::FunctionDecl { name, .. } => {
                names.push(name.clone());
            }
            _ => {}
        }
    }
    names
}

/// Edges `caller -> callee` restricted to tail calls between top-level
/// functions
fn tail_call_graph(body: &[IrNode], functions: &[String]) -> HashMap<String, Vec<String>> {
    let known: HashSet<&str> = functions.iter().map(|s| s.as_str()).collect();
    let mut graph: HashMap<String, Vec<String>> = HashMap::new();
    for node in body {
        let kind = match &node.kind {
            IrKind::ExportDecl(decl) => &decl.kind,
            _ => &node.kind,
        };
        if let IrKind::FnDecl { name, body, .. } | IrKind::FunctionDecl { name, body, .. } = kind {
            let mut callees = Vec::new();
            collect_tail_callees(body, &known, &mut callees);
            graph.insert(name.clone(), callees);
        }
    }
    graph
}

fn collect_tail_callees(stmt: &IrNode, known: &HashSet<&str>, out: &mut Vec<String>) {
    match &stmt.kind {
        IrKind::Block(stmts) => {
            for s in stmts {
                collect_tail_callees(s, known, out);
            }
        }
        IrKind::If {
            consequent,
            alternate,
            ..
        } => {
            collect_tail_callees(consequent, known, out);
            if let Some(a) = alternate {
                collect_tail_callees(a, known, out);
            }
        }
        IrKind::Return(Some(value)) => collect_tail_exprs(value, known, out),
        _ => {}
    }
}

fn collect_tail_exprs(expr: &IrNode, known: &HashSet<&str>, out: &mut Vec<String>) {
    match &expr.kind {
        IrKind::Call { callee, .. } => {
            if let Some(name) = callee.identifier_name() {
                if known.contains(name) {
                    out.push(name.to_string());
                }
            }
        }
        IrKind::Conditional {
            consequent,
            alternate,
            ..
        } => {
            collect_tail_exprs(consequent, known, out);
            collect_tail_exprs(alternate, known, out);
        }
        IrKind::Sequence(exprs) => {
            if let Some(last) = exprs.last() {
                collect_tail_exprs(last, known, out);
            }
        }
        IrKind::Logical { right, .. } => collect_tail_exprs(right, known, out),
        _ => {}
    }
}

// ============================================================================
// Tarjan's Strongly Connected Components
// ============================================================================

struct TarjanState<'a> {
    graph: &'a HashMap<String, Vec<String>>,
    index: HashMap<String, usize>,
    lowlink: HashMap<String, usize>,
    on_stack: HashSet<String>,
    stack: Vec<String>,
    next_index: usize,
    sccs: Vec<Vec<String>>,
}

fn tarjan_sccs(nodes: &[String], graph: &HashMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut state = TarjanState {
        graph,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        next_index: 0,
        sccs: Vec::new(),
    };
    for node in nodes {
        if !state.index.contains_key(node) {
            strong_connect(node, &mut state);
        }
    }
    state.sccs
}

fn strong_connect(v: &str, state: &mut TarjanState<'_>) {
    state.index.insert(v.to_string(), state.next_index);
    state.lowlink.insert(v.to_string(), state.next_index);
    state.next_index += 1;
    state.stack.push(v.to_string());
    state.on_stack.insert(v.to_string());

    let successors = state.graph.get(v).cloned().unwrap_or_default();
    for w in &successors {
        if !state.index.contains_key(w) {
            strong_connect(w, state);
            let w_low = state.lowlink[w];
            let v_low = state.lowlink[v];
            state.lowlink.insert(v.to_string(), v_low.min(w_low));
        } else if state.on_stack.contains(w) {
            let w_index = state.index[w];
            let v_low = state.lowlink[v];
            state.lowlink.insert(v.to_string(), v_low.min(w_index));
        }
    }

    if state.lowlink[v] == state.index[v] {
        let mut scc = Vec::new();
        while let Some(w) = state.stack.pop() {
            state.on_stack.remove(&w);
            let done = w == v;
            scc.push(w);
            if done {
                break;
            }
        }
        state.sccs.push(scc);
    }
}

// ============================================================================
// Rewriting
// ============================================================================

fn group_of<'a>(groups: &'a [HashSet<String>], name: &str) -> Option<&'a HashSet<String>> {
    groups.iter().find(|g| g.contains(name))
}

/// Walk the whole module. `current_fn` names the enclosing top-level
/// function when inside one.
fn rewrite_node(node: IrNode, groups: &[HashSet<String>], current_fn: Option<&str>) -> IrNode {
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
            let inner = rewrite_stmt(*body, groups, Some(&name), true);
            IrKind::FnDecl {
                name,
                params,
                json_params,
                body: Box::new(inner),
                is_async,
                return_type,
            }
        }
        IrKind::FunctionDecl {
            name,
            params,
            body,
            is_async,
            return_type,
        } => {
            let inner = rewrite_stmt(*body, groups, Some(&name), true);
            IrKind::FunctionDecl {
                name,
                params,
                body: Box::new(inner),
                is_async,
                return_type,
            }
        }
        IrKind::ExportDecl(decl) => {
            IrKind::ExportDecl(Box::new(rewrite_node(*decl, groups, current_fn)))
        }
        other => {
            let node = IrNode { kind: other, pos };
            return rewrite_stmt(node, groups, current_fn, false);
        }
    };
    IrNode { kind, pos }
}

/// Statement-position rewriting; `in_tail` marks positions whose
/// `return` values are tail positions of the current function
fn rewrite_stmt(
    stmt: IrNode,
    groups: &[HashSet<String>],
    current_fn: Option<&str>,
    in_tail: bool,
) -> IrNode {
    let IrNode { kind, pos } = stmt;
    let kind = match kind {
        IrKind::Block(stmts) => IrKind::Block(
            stmts
                .into_iter()
                .map(|s| rewrite_stmt(s, groups, current_fn, in_tail))
                .collect(),
        ),
        IrKind::If {
            test,
            consequent,
            alternate,
        } => IrKind::If {
            test: Box::new(rewrite_expr(*test, groups, current_fn, false)),
            consequent: Box::new(rewrite_stmt(*consequent, groups, current_fn, in_tail)),
            alternate: alternate.map(|a| Box::new(rewrite_stmt(*a, groups, current_fn, in_tail))),
        },
        IrKind::Return(value) => IrKind::Return(
            value.map(|v| Box::new(rewrite_expr(*v, groups, current_fn, in_tail))),
        ),
        IrKind::ExprStmt(e) => {
            IrKind::ExprStmt(Box::new(rewrite_expr(*e, groups, current_fn, false)))
        }
        IrKind::VariableDecl {
            kind,
            name,
            ty,
            init,
        } => IrKind::VariableDecl {
            kind,
            name,
            ty,
            init: init.map(|i| Box::new(rewrite_expr(*i, groups, current_fn, false))),
        },
        IrKind::While { test, body } => IrKind::While {
            test: Box::new(rewrite_expr(*test, groups, current_fn, false)),
            body: Box::new(rewrite_stmt(*body, groups, current_fn, false)),
        },
        IrKind::ForOf {
            kind,
            binding,
            iterable,
            body,
        } => IrKind::ForOf {
            kind,
            binding,
            iterable: Box::new(rewrite_expr(*iterable, groups, current_fn, false)),
            body: Box::new(rewrite_stmt(*body, groups, current_fn, false)),
        },
        IrKind::Try {
            block,
            handler,
            finalizer,
        } => IrKind::Try {
            block: Box::new(rewrite_stmt(*block, groups, current_fn, false)),
            handler: handler.map(|h| crate::ir::CatchClause {
                param: h.param,
                body: Box::new(rewrite_stmt(*h.body, groups, current_fn, false)),
            }),
            finalizer: finalizer.map(|f| Box::new(rewrite_stmt(*f, groups, current_fn, false))),
        },
        IrKind::Throw(e) => IrKind::Throw(Box::new(rewrite_expr(*e, groups, current_fn, false))),
        other => {
            // Expression-shaped nodes in statement position
            let node = IrNode { kind: other, pos: pos.clone() };
            if is_expression_kind(&node.kind) {
                return rewrite_expr(node, groups, current_fn, false);
            }
            return node;
        }
    };
    IrNode { kind, pos }
}

fn is_expression_kind(kind: &IrKind) -> bool {
    matches!(
        kind,
        IrKind::Call { .. }
            | IrKind::OptionalCall { .. }
            | IrKind::Binary { .. }
            | IrKind::Logical { .. }
            | IrKind::Unary { .. }
            | IrKind::Conditional { .. }
            | IrKind::Sequence(_)
            | IrKind::Assignment { .. }
            | IrKind::Member { .. }
            | IrKind::ArrayLit(_)
            | IrKind::ObjectLit(_)
            | IrKind::Await(_)
            | IrKind::Spread(_)
            | IrKind::TemplateLit { .. }
            | IrKind::InteropGet { .. }
            | IrKind::InteropCall { .. }
            | IrKind::New { .. }
    )
}

/// Expression rewriting. In tail position, a call to a different member
/// of the caller's own group becomes a thunk; everywhere else, calls to
/// group members are trampolined.
fn rewrite_expr(
    expr: IrNode,
    groups: &[HashSet<String>],
    current_fn: Option<&str>,
    in_tail: bool,
) -> IrNode {
    let IrNode { kind, pos } = expr;
    let kind = match kind {
        IrKind::Call { callee, args } => {
            let args: Vec<IrNode> = args
                .into_iter()
                .map(|a| rewrite_expr(a, groups, current_fn, false))
                .collect();
            if let Some(target) = callee.identifier_name() {
                if let Some(group) = group_of(groups, target) {
                    let same_group = current_fn.is_some_and(|f| group.contains(f));
                    let is_self = current_fn == Some(target);
                    let call = IrNode::new(
                        IrKind::Call {
                            callee: callee.clone(),
                            args,
                        },
                        pos.clone(),
                    );
                    if in_tail && same_group && !is_self {
                        return thunk(call, &pos);
                    }
                    if is_self && in_tail {
                        // Left intact for the self-recursion pass
                        return call;
                    }
                    return trampoline_call(call, &pos);
                }
            }
            let callee = Box::new(rewrite_expr(*callee, groups, current_fn, false));
            IrKind::Call { callee, args }
        }
        IrKind::Conditional {
            test,
            consequent,
            alternate,
        } => IrKind::Conditional {
            test: Box::new(rewrite_expr(*test, groups, current_fn, false)),
            consequent: Box::new(rewrite_expr(*consequent, groups, current_fn, in_tail)),
            alternate: Box::new(rewrite_expr(*alternate, groups, current_fn, in_tail)),
        },
        IrKind::Sequence(exprs) => {
            let len = exprs.len();
            IrKind::Sequence(
                exprs
                    .into_iter()
                    .enumerate()
                    .map(|(i, e)| {
                        rewrite_expr(e, groups, current_fn, in_tail && i + 1 == len)
                    })
                    .collect(),
            )
        }
        IrKind::Logical { op, left, right } => IrKind::Logical {
            op,
            left: Box::new(rewrite_expr(*left, groups, current_fn, false)),
            right: Box::new(rewrite_expr(*right, groups, current_fn, in_tail)),
        },
        IrKind::Binary { op, left, right } => IrKind::Binary {
            op,
            left: Box::new(rewrite_expr(*left, groups, current_fn, false)),
            right: Box::new(rewrite_expr(*right, groups, current_fn, false)),
        },
        IrKind::Unary { op, operand } => IrKind::Unary {
            op,
            operand: Box::new(rewrite_expr(*operand, groups, current_fn, false)),
        },
        IrKind::Assignment { op, target, value } => IrKind::Assignment {
            op,
            target,
            value: Box::new(rewrite_expr(*value, groups, current_fn, false)),
        },
        IrKind::ArrayLit(items) => IrKind::ArrayLit(
            items
                .into_iter()
                .map(|i| rewrite_expr(i, groups, current_fn, false))
                .collect(),
        ),
        IrKind::ObjectLit(props) => IrKind::ObjectLit(
            props
                .into_iter()
                .map(|p| match p {
                    ObjectProp::KeyValue { key, value } => ObjectProp::KeyValue {
                        key,
                        value: rewrite_expr(value, groups, current_fn, false),
                    },
                    ObjectProp::Shorthand(v) => {
                        ObjectProp::Shorthand(rewrite_expr(v, groups, current_fn, false))
                    }
                    ObjectProp::Spread(v) => {
                        ObjectProp::Spread(rewrite_expr(v, groups, current_fn, false))
                    }
                })
                .collect(),
        ),
        IrKind::Spread(e) => {
            IrKind::Spread(Box::new(rewrite_expr(*e, groups, current_fn, false)))
        }
        IrKind::Await(e) => IrKind::Await(Box::new(rewrite_expr(*e, groups, current_fn, false))),
        IrKind::Member {
            object,
            property,
            computed,
            optional,
        } => IrKind::Member {
            object: Box::new(rewrite_expr(*object, groups, current_fn, false)),
            property,
            computed,
            optional,
        },
        IrKind::New { callee, args } => IrKind::New {
            callee: Box::new(rewrite_expr(*callee, groups, current_fn, false)),
            args: args
                .into_iter()
                .map(|a| rewrite_expr(a, groups, current_fn, false))
                .collect(),
        },
        IrKind::TemplateLit { quasis, exprs } => IrKind::TemplateLit {
            quasis,
            exprs: exprs
                .into_iter()
                .map(|e| rewrite_expr(e, groups, current_fn, false))
                .collect(),
        },
        IrKind::InteropGet { object, property } => IrKind::InteropGet {
            object: Box::new(rewrite_expr(*object, groups, current_fn, false)),
            property,
        },
        IrKind::InteropCall {
            object,
            method,
            args,
        } => IrKind::InteropCall {
            object: Box::new(rewrite_expr(*object, groups, current_fn, false)),
            method,
            args: args
                .into_iter()
                .map(|a| rewrite_expr(a, groups, current_fn, false))
                .collect(),
        },
        // Nested function expressions get their own (non-tail) context
        IrKind::Function {
            name,
            params,
            body,
            uses_this,
            is_async,
            is_generator,
            return_type,
        } => IrKind::Function {
            name,
            params,
            body: Box::new(rewrite_stmt(*body, groups, None, false)),
            uses_this,
            is_async,
            is_generator,
            return_type,
        },
        other => other,
    };
    IrNode { kind, pos }
}

/// `() => target(args)`
fn thunk(call: IrNode, pos: &Position) -> IrNode {
    IrNode::new(
        IrKind::Function {
            name: None,
            params: Vec::new(),
            body: Box::new(IrNode::block(
                vec![IrNode::new(
                    IrKind::Return(Some(Box::new(call))),
                    pos.clone(),
                )],
                pos.clone(),
            )),
            uses_this: false,
            is_async: false,
            is_generator: false,
            return_type: None,
        },
        pos.clone(),
    )
}

/// `trampoline(() => target(args))`
fn trampoline_call(call: IrNode, pos: &Position) -> IrNode {
    let helper = IrNode::renamed_ident("trampoline", "trampoline", pos.clone());
    IrNode::call(helper, vec![thunk(call, pos)], pos.clone())
}

#[cfg(test)]
mod tests {
    use super::super::tests::optimized;
    use crate::ir::IrKind;

    const EVEN_ODD: &str = "(fn is-even [n] (if (= n 0) true (is-odd (- n 1))))
         (fn is-odd [n] (if (= n 0) false (is-even (- n 1))))
         (is-even 10000)";

    #[test]
    fn test_group_tail_calls_become_thunks() {
        let m = optimized(EVEN_ODD);
        let text = format!("{:?}", m.body[0]);
        // is-even's tail call to is-odd is wrapped in a zero-arg function
        assert!(text.contains("Function"));
        assert!(!text.contains("trampoline"), "tail thunks are not trampolined: {}", text);
    }

    #[test]
    fn test_outside_call_gets_trampoline() {
        let m = optimized(EVEN_ODD);
        let text = format!("{:?}", m.body[2]);
        assert!(text.contains("trampoline"), "external call site: {}", text);
    }

    #[test]
    fn test_self_recursion_not_grouped() {
        let m = optimized(
            "(fn loop-a [n] (if (= n 0) 0 (loop-a (- n 1))))
             (fn helper [x] (+ x 1))",
        );
        let text = format!("{:?}", m.body[0]);
        assert!(!text.contains("trampoline"));
    }

    #[test]
    fn test_three_way_cycle_detected() {
        let m = optimized(
            "(fn a [n] (if (= n 0) 0 (b (- n 1))))
             (fn b [n] (if (= n 0) 1 (c (- n 1))))
             (fn c [n] (if (= n 0) 2 (a (- n 1))))
             (a 99)",
        );
        let call_site = format!("{:?}", m.body[3]);
        assert!(call_site.contains("trampoline"));
    }

    #[test]
    fn test_non_tail_calls_between_functions_not_thunked() {
        // f calls g non-tail; g never calls f: no group forms
        let m = optimized(
            "(fn f [n] (+ 1 (g n)))
             (fn g [n] (* n 2))",
        );
        let text = format!("{:?}", m.body[0]);
        assert!(!text.contains("trampoline"));
        match &m.body[0].kind {
            IrKind::FnDecl { .. } => {}
            other => panic!("expected fn decl, got {:?}", other),
        }
    }
}
