// ABOUTME: Compile-time interpreter evaluating macro bodies against the S-expression AST

use crate::ast::{Ast, LiteralValue, Position};
use crate::config::LAZY_FORCE_LIMIT;
use crate::error::Diagnostic;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A compile-time value.
///
/// `Form` carries S-expressions directly, so macro templates and their
/// inputs never leave AST space; numbers and strings bridge in and out of
/// literal nodes as the builtins need them. `Closure` and the deferred
/// variants exist only during expansion and can never be spliced into
/// output without being forced to forms first.
#[derive(Debug, Clone)]
pub enum CtValue {
    Form(Ast),
    Closure {
        params: Vec<String>,
        rest: Option<String>,
        body: Vec<Ast>,
        env: Rc<CtEnv>,
    },
    /// Numeric range, possibly infinite; forced lazily and bounded
    Range {
        start: f64,
        end: Option<f64>,
        step: f64,
    },
    /// Memoized deferred computation from `delay` / `lazy-seq`
    Lazy(Rc<RefCell<LazyState>>),
}

#[derive(Debug)]
pub enum LazyState {
    Pending { body: Vec<Ast>, env: Rc<CtEnv> },
    Forced(Box<CtValue>),
}

/// Binding environment for compile-time evaluation
#[derive(Debug)]
pub struct CtEnv {
    bindings: RefCell<HashMap<String, CtValue>>,
    parent: Option<Rc<CtEnv>>,
}

impl CtEnv {
    pub fn new() -> Rc<Self> {
        Rc::new(CtEnv {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn with_parent(parent: Rc<CtEnv>) -> Rc<Self> {
        Rc::new(CtEnv {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent),
        })
    }

    pub fn define(&self, name: String, value: CtValue) {
        self.bindings.borrow_mut().insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<CtValue> {
        if let Some(v) = self.bindings.borrow().get(name) {
            return Some(v.clone());
        }
        if let Some(ref parent) = self.parent {
            return parent.get(name);
        }
        None
    }
}

/// Mutable expansion state threaded through evaluation: the session
/// gensym counter lives in the expander and is borrowed here.
pub struct InterpCx<'a> {
    pub gensym_counter: &'a mut u64,
}

impl InterpCx<'_> {
    fn fresh_symbol(&mut self, prefix: &str, pos: &Position) -> Ast {
        *self.gensym_counter += 1;
        Ast::Symbol(crate::ast::SymbolNode {
            name: prefix.to_string(),
            pos: pos.clone(),
            gensym_id: Some(*self.gensym_counter),
        })
    }
}

fn err(message: impl Into<String>, pos: &Position) -> Diagnostic {
    Diagnostic::macro_error(message, pos.clone())
}

fn truthy(value: &CtValue) -> bool {
    match value {
        CtValue::Form(Ast::Literal(l)) => !matches!(
            l.value,
            LiteralValue::Bool(false) | LiteralValue::Nil
        ),
        _ => true,
    }
}

fn nil(pos: &Position) -> CtValue {
    CtValue::Form(Ast::literal(LiteralValue::Nil, pos.clone()))
}

fn number(n: f64, pos: &Position) -> CtValue {
    CtValue::Form(Ast::literal(LiteralValue::Number(n), pos.clone()))
}

fn boolean(b: bool, pos: &Position) -> CtValue {
    CtValue::Form(Ast::literal(LiteralValue::Bool(b), pos.clone()))
}

fn as_number(value: &CtValue, who: &str, pos: &Position) -> Result<f64, Diagnostic> {
    match value {
        CtValue::Form(Ast::Literal(l)) => match l.value {
            LiteralValue::Number(n) => Ok(n),
            _ => Err(err(format!("{}: expected number, got {}", who, Ast::Literal(l.clone())), pos)),
        },
        _ => Err(err(format!("{}: expected number", who), pos)),
    }
}

fn as_string(value: &CtValue, who: &str, pos: &Position) -> Result<String, Diagnostic> {
    match value {
        CtValue::Form(Ast::Literal(l)) => match &l.value {
            LiteralValue::Str(s) => Ok(s.clone()),
            _ => Err(err(format!("{}: expected string", who), pos)),
        },
        _ => Err(err(format!("{}: expected string", who), pos)),
    }
}

/// Convert a compile-time value back into a form for splicing into
/// macro output. Deferred values are forced (bounded); closures cannot
/// appear in expansions.
pub fn to_form(value: CtValue, pos: &Position) -> Result<Ast, Diagnostic> {
    match value {
        CtValue::Form(ast) => Ok(ast),
        CtValue::Closure { .. } => Err(err("cannot splice a function value into expansion", pos)),
        other => {
            let items = force_seq(other, pos)?;
            Ok(Ast::list(items, pos.clone()))
        }
    }
}

/// Force any value into a bounded sequence of forms.
///
/// Arrays and lists pass through; strings become character strings;
/// numbers n become 0..n; ranges and lazy values are realized up to
/// `LAZY_FORCE_LIMIT` elements so infinite sequences terminate.
pub fn force_seq(value: CtValue, pos: &Position) -> Result<Vec<Ast>, Diagnostic> {
    match value {
        CtValue::Form(Ast::List(l)) => Ok(l.items),
        CtValue::Form(Ast::Vector(v)) => Ok(v.items),
        CtValue::Form(Ast::Literal(l)) => match &l.value {
            LiteralValue::Str(s) => Ok(s
                .chars()
                .map(|c| Ast::literal(LiteralValue::Str(c.to_string()), l.pos.clone()))
                .collect()),
            LiteralValue::Number(n) => {
                let count = (*n as usize).min(LAZY_FORCE_LIMIT);
                Ok((0..count)
                    .map(|i| Ast::literal(LiteralValue::Number(i as f64), l.pos.clone()))
                    .collect())
            }
            LiteralValue::Nil => Ok(Vec::new()),
            _ => Ok(vec![Ast::Literal(l)]),
        },
        CtValue::Form(other) => Ok(vec![other]),
        CtValue::Range { start, end, step } => {
            let mut items = Vec::new();
            let mut current = start;
            while items.len() < LAZY_FORCE_LIMIT {
                match end {
                    Some(limit) if step >= 0.0 && current >= limit => break,
                    Some(limit) if step < 0.0 && current <= limit => break,
                    _ => {}
                }
                items.push(Ast::literal(LiteralValue::Number(current), pos.clone()));
                current += step;
            }
            Ok(items)
        }
        CtValue::Lazy(state) => {
            let forced = force_lazy(&state, pos)?;
            force_seq(forced, pos)
        }
        CtValue::Closure { .. } => Err(err("expected a sequence, got a function", pos)),
    }
}

fn force_lazy(state: &Rc<RefCell<LazyState>>, pos: &Position) -> Result<CtValue, Diagnostic> {
    let pending = match &*state.borrow() {
        LazyState::Forced(v) => return Ok((**v).clone()),
        LazyState::Pending { body, env } => (body.clone(), env.clone()),
    };
    let mut counter = 0;
    let mut cx = InterpCx {
        gensym_counter: &mut counter,
    };
    // Lazy bodies cannot call gensym (the counter above is discarded);
    // they exist to defer sequence computation, not symbol minting.
    let mut result = nil(pos);
    for form in &pending.0 {
        result = eval(form, &pending.1, &mut cx)?;
    }
    *state.borrow_mut() = LazyState::Forced(Box::new(result.clone()));
    Ok(result)
}

/// Evaluate one macro-body form
pub fn eval(expr: &Ast, env: &Rc<CtEnv>, cx: &mut InterpCx) -> Result<CtValue, Diagnostic> {
    match expr {
        Ast::Literal(_) => Ok(CtValue::Form(expr.clone())),
        Ast::Symbol(s) => env
            .get(&s.name)
            .ok_or_else(|| err(format!("undefined symbol in macro body: {}", s.name), &s.pos)),
        Ast::Vector(v) => {
            let mut items = Vec::with_capacity(v.items.len());
            for item in &v.items {
                items.push(to_form(eval(item, env, cx)?, item.pos())?);
            }
            Ok(CtValue::Form(Ast::vector(items, v.pos.clone())))
        }
        Ast::List(l) => {
            if l.items.is_empty() {
                return Ok(nil(&l.pos));
            }
            if let Some(head) = l.items[0].as_symbol() {
                if let Some(result) = eval_special(head, l, env, cx)? {
                    return Ok(result);
                }
                if let Some(result) = eval_builtin(head, l, env, cx)? {
                    return Ok(result);
                }
            }
            // Function application
            let callee = eval(&l.items[0], env, cx)?;
            let mut args = Vec::with_capacity(l.items.len() - 1);
            for arg in &l.items[1..] {
                args.push(eval(arg, env, cx)?);
            }
            apply(callee, args, &l.pos, cx)
        }
    }
}

/// Special forms: quote, quasiquote, if, let, fn, do
fn eval_special(
    head: &str,
    list: &crate::ast::ListNode,
    env: &Rc<CtEnv>,
    cx: &mut InterpCx,
) -> Result<Option<CtValue>, Diagnostic> {
    let items = &list.items;
    let pos = &list.pos;
    let result = match head {
        "quote" => {
            if items.len() != 2 {
                return Err(err("quote: expected 1 argument", pos));
            }
            Some(CtValue::Form(items[1].clone()))
        }
        "quasiquote" => {
            if items.len() != 2 {
                return Err(err("quasiquote: expected 1 argument", pos));
            }
            Some(CtValue::Form(quasiquote(&items[1], 1, env, cx)?))
        }
        "if" => {
            if items.len() < 3 || items.len() > 4 {
                return Err(err("if: expected 2 or 3 arguments", pos));
            }
            let test = eval(&items[1], env, cx)?;
            if truthy(&test) {
                Some(eval(&items[2], env, cx)?)
            } else if items.len() == 4 {
                Some(eval(&items[3], env, cx)?)
            } else {
                Some(nil(pos))
            }
        }
        "let" => {
            let bindings = items
                .get(1)
                .and_then(|b| b.as_vector())
                .ok_or_else(|| err("let: expected a binding vector", pos))?;
            if bindings.len() % 2 != 0 {
                return Err(err("let: binding vector needs name/value pairs", pos));
            }
            let scope = CtEnv::with_parent(env.clone());
            for pair in bindings.chunks(2) {
                let name = pair[0]
                    .as_symbol()
                    .ok_or_else(|| err("let: binding name must be a symbol", pair[0].pos()))?;
                let value = eval(&pair[1], &scope, cx)?;
                scope.define(name.to_string(), value);
            }
            let mut result = nil(pos);
            for form in &items[2..] {
                result = eval(form, &scope, cx)?;
            }
            Some(result)
        }
        "fn" | "lambda" => {
            let params_vec = items
                .get(1)
                .and_then(|p| p.as_vector())
                .ok_or_else(|| err("fn: expected a parameter vector", pos))?;
            let (params, rest) = split_params(params_vec, pos)?;
            Some(CtValue::Closure {
                params,
                rest,
                body: items[2..].to_vec(),
                env: env.clone(),
            })
        }
        "do" => {
            let mut result = nil(pos);
            for form in &items[1..] {
                result = eval(form, env, cx)?;
            }
            Some(result)
        }
        "lazy-seq" | "delay" => Some(CtValue::Lazy(Rc::new(RefCell::new(LazyState::Pending {
            body: items[1..].to_vec(),
            env: env.clone(),
        })))),
        _ => None,
    };
    Ok(result)
}

fn split_params(params: &[Ast], pos: &Position) -> Result<(Vec<String>, Option<String>), Diagnostic> {
    let mut names = Vec::new();
    let mut rest = None;
    let mut iter = params.iter();
    while let Some(p) = iter.next() {
        let name = p
            .as_symbol()
            .ok_or_else(|| err("parameter must be a symbol", p.pos()))?;
        if name == "&" {
            let r = iter
                .next()
                .and_then(|p| p.as_symbol())
                .ok_or_else(|| err("expected rest parameter name after &", pos))?;
            rest = Some(r.to_string());
            if iter.next().is_some() {
                return Err(err("rest parameter must be last", pos));
            }
            break;
        }
        names.push(name.to_string());
    }
    Ok((names, rest))
}

fn apply(
    callee: CtValue,
    args: Vec<CtValue>,
    pos: &Position,
    cx: &mut InterpCx,
) -> Result<CtValue, Diagnostic> {
    match callee {
        CtValue::Closure {
            params,
            rest,
            body,
            env,
        } => {
            if args.len() < params.len() || (rest.is_none() && args.len() > params.len()) {
                return Err(err(
                    format!("expected {} arguments, got {}", params.len(), args.len()),
                    pos,
                ));
            }
            let scope = CtEnv::with_parent(env);
            for (name, value) in params.iter().zip(args.iter()) {
                scope.define(name.clone(), value.clone());
            }
            if let Some(rest_name) = rest {
                let rest_forms: Result<Vec<Ast>, Diagnostic> = args[params.len()..]
                    .iter()
                    .map(|v| to_form(v.clone(), pos))
                    .collect();
                scope.define(
                    rest_name,
                    CtValue::Form(Ast::list(rest_forms?, pos.clone())),
                );
            }
            let mut result = nil(pos);
            for form in &body {
                result = eval(form, &scope, cx)?;
            }
            Ok(result)
        }
        _ => Err(err("value is not callable in macro body", pos)),
    }
}

/// Sequence and arithmetic builtins available to macro bodies
fn eval_builtin(
    head: &str,
    list: &crate::ast::ListNode,
    env: &Rc<CtEnv>,
    cx: &mut InterpCx,
) -> Result<Option<CtValue>, Diagnostic> {
    let pos = &list.pos;
    let known = matches!(
        head,
        "list" | "first" | "rest" | "cons" | "concat" | "nth" | "count" | "reverse" | "map"
            | "filter" | "reduce" | "str" | "gensym" | "range" | "force" | "+" | "-" | "*" | "/"
            | "%" | "=" | "<" | ">" | "<=" | ">=" | "not" | "empty?" | "symbol?" | "list?"
            | "number?" | "string?"
    );
    if !known || env.get(head).is_some() {
        return Ok(None);
    }

    let mut args = Vec::with_capacity(list.items.len() - 1);
    for arg in &list.items[1..] {
        args.push(eval(arg, env, cx)?);
    }

    let result = match head {
        "list" => {
            let forms: Result<Vec<Ast>, Diagnostic> =
                args.into_iter().map(|v| to_form(v, pos)).collect();
            CtValue::Form(Ast::list(forms?, pos.clone()))
        }
        "first" => {
            let seq = force_seq(one(args, "first", pos)?, pos)?;
            match seq.into_iter().next() {
                Some(item) => CtValue::Form(item),
                None => nil(pos),
            }
        }
        "rest" => {
            let seq = force_seq(one(args, "rest", pos)?, pos)?;
            CtValue::Form(Ast::list(seq.into_iter().skip(1).collect(), pos.clone()))
        }
        "cons" => {
            if args.len() != 2 {
                return Err(err("cons: expected 2 arguments", pos));
            }
            let mut iter = args.into_iter();
            let head_form = to_form(iter.next().unwrap(), pos)?;
            let tail = force_seq(iter.next().unwrap(), pos)?;
            let mut items = vec![head_form];
            items.extend(tail);
            CtValue::Form(Ast::list(items, pos.clone()))
        }
        "concat" => {
            let mut items = Vec::new();
            for arg in args {
                items.extend(force_seq(arg, pos)?);
            }
            CtValue::Form(Ast::list(items, pos.clone()))
        }
        "nth" => {
            if args.len() != 2 {
                return Err(err("nth: expected 2 arguments", pos));
            }
            let index = as_number(&args[1], "nth", pos)? as usize;
            let seq = force_seq(args.into_iter().next().unwrap(), pos)?;
            match seq.into_iter().nth(index) {
                Some(item) => CtValue::Form(item),
                None => nil(pos),
            }
        }
        "count" => {
            let seq = force_seq(one(args, "count", pos)?, pos)?;
            number(seq.len() as f64, pos)
        }
        "reverse" => {
            let mut seq = force_seq(one(args, "reverse", pos)?, pos)?;
            seq.reverse();
            CtValue::Form(Ast::list(seq, pos.clone()))
        }
        "map" => {
            if args.len() != 2 {
                return Err(err("map: expected 2 arguments", pos));
            }
            let mut iter = args.into_iter();
            let f = iter.next().unwrap();
            let seq = force_seq(iter.next().unwrap(), pos)?;
            let mut out = Vec::with_capacity(seq.len());
            for item in seq {
                let mapped = apply(f.clone(), vec![CtValue::Form(item)], pos, cx)?;
                out.push(to_form(mapped, pos)?);
            }
            CtValue::Form(Ast::list(out, pos.clone()))
        }
        "filter" => {
            if args.len() != 2 {
                return Err(err("filter: expected 2 arguments", pos));
            }
            let mut iter = args.into_iter();
            let f = iter.next().unwrap();
            let seq = force_seq(iter.next().unwrap(), pos)?;
            let mut out = Vec::new();
            for item in seq {
                let keep = apply(f.clone(), vec![CtValue::Form(item.clone())], pos, cx)?;
                if truthy(&keep) {
                    out.push(item);
                }
            }
            CtValue::Form(Ast::list(out, pos.clone()))
        }
        "reduce" => {
            if args.len() != 3 {
                return Err(err("reduce: expected 3 arguments", pos));
            }
            let mut iter = args.into_iter();
            let f = iter.next().unwrap();
            let mut acc = iter.next().unwrap();
            let seq = force_seq(iter.next().unwrap(), pos)?;
            for item in seq {
                acc = apply(f.clone(), vec![acc, CtValue::Form(item)], pos, cx)?;
            }
            acc
        }
        "str" => {
            let mut out = String::new();
            for arg in args {
                match to_form(arg, pos)? {
                    Ast::Literal(l) => match l.value {
                        LiteralValue::Str(s) => out.push_str(&s),
                        other => out.push_str(&format!(
                            "{}",
                            Ast::literal(other, l.pos)
                        )),
                    },
                    other => out.push_str(&format!("{}", other)),
                }
            }
            CtValue::Form(Ast::literal(LiteralValue::Str(out), pos.clone()))
        }
        "gensym" => {
            let prefix = match args.first() {
                Some(v) => as_string(v, "gensym", pos)?,
                None => "g".to_string(),
            };
            CtValue::Form(cx.fresh_symbol(&prefix, pos))
        }
        "range" => match args.len() {
            0 => CtValue::Range {
                start: 0.0,
                end: None,
                step: 1.0,
            },
            1 => CtValue::Range {
                start: 0.0,
                end: Some(as_number(&args[0], "range", pos)?),
                step: 1.0,
            },
            2 => CtValue::Range {
                start: as_number(&args[0], "range", pos)?,
                end: Some(as_number(&args[1], "range", pos)?),
                step: 1.0,
            },
            3 => CtValue::Range {
                start: as_number(&args[0], "range", pos)?,
                end: Some(as_number(&args[1], "range", pos)?),
                step: as_number(&args[2], "range", pos)?,
            },
            _ => return Err(err("range: expected 0-3 arguments", pos)),
        },
        "force" => {
            let forced = force_seq(one(args, "force", pos)?, pos)?;
            CtValue::Form(Ast::list(forced, pos.clone()))
        }
        "+" | "-" | "*" | "/" | "%" => {
            let nums: Result<Vec<f64>, Diagnostic> =
                args.iter().map(|v| as_number(v, head, pos)).collect();
            let nums = nums?;
            if nums.is_empty() {
                return Err(err(format!("{}: expected at least 1 argument", head), pos));
            }
            let first = nums[0];
            let value = match head {
                "+" => nums.iter().sum(),
                "*" => nums.iter().product(),
                "-" if nums.len() == 1 => -first,
                "-" => nums[1..].iter().fold(first, |a, b| a - b),
                "/" => nums[1..].iter().fold(first, |a, b| a / b),
                _ => nums[1..].iter().fold(first, |a, b| a % b),
            };
            number(value, pos)
        }
        "=" | "<" | ">" | "<=" | ">=" => {
            if args.len() != 2 {
                return Err(err(format!("{}: expected 2 arguments", head), pos));
            }
            if head == "=" {
                let left = to_form(args[0].clone(), pos)?;
                let right = to_form(args[1].clone(), pos)?;
                boolean(left == right, pos)
            } else {
                let left = as_number(&args[0], head, pos)?;
                let right = as_number(&args[1], head, pos)?;
                let value = match head {
                    "<" => left < right,
                    ">" => left > right,
                    "<=" => left <= right,
                    _ => left >= right,
                };
                boolean(value, pos)
            }
        }
        "not" => boolean(!truthy(&one(args, "not", pos)?), pos),
        "empty?" => {
            let seq = force_seq(one(args, "empty?", pos)?, pos)?;
            boolean(seq.is_empty(), pos)
        }
        "symbol?" => boolean(
            matches!(one(args, "symbol?", pos)?, CtValue::Form(Ast::Symbol(_))),
            pos,
        ),
        "list?" => boolean(
            matches!(one(args, "list?", pos)?, CtValue::Form(Ast::List(_))),
            pos,
        ),
        "number?" => boolean(
            matches!(
                one(args, "number?", pos)?,
                CtValue::Form(Ast::Literal(crate::ast::LiteralNode {
                    value: LiteralValue::Number(_),
                    ..
                }))
            ),
            pos,
        ),
        "string?" => boolean(
            matches!(
                one(args, "string?", pos)?,
                CtValue::Form(Ast::Literal(crate::ast::LiteralNode {
                    value: LiteralValue::Str(_),
                    ..
                }))
            ),
            pos,
        ),
        _ => unreachable!("gated by `known` above"),
    };
    Ok(Some(result))
}

fn one(args: Vec<CtValue>, who: &str, pos: &Position) -> Result<CtValue, Diagnostic> {
    let mut args = args;
    if args.len() != 1 {
        return Err(err(format!("{}: expected 1 argument", who), pos));
    }
    Ok(args.remove(0))
}

/// Quasiquote walker. Depth tracks nesting: depth 1 means inside one
/// quasiquote, so its unquotes evaluate.
pub fn quasiquote(
    template: &Ast,
    depth: usize,
    env: &Rc<CtEnv>,
    cx: &mut InterpCx,
) -> Result<Ast, Diagnostic> {
    match template {
        Ast::List(l) if !l.items.is_empty() => {
            if let Some(head) = l.items[0].as_symbol() {
                match head {
                    "unquote" => {
                        if l.items.len() != 2 {
                            return Err(err("unquote: expected 1 argument", &l.pos));
                        }
                        if depth == 1 {
                            let value = eval(&l.items[1], env, cx)?;
                            return to_form(value, &l.pos);
                        }
                        let inner = quasiquote(&l.items[1], depth - 1, env, cx)?;
                        return Ok(Ast::list(
                            vec![Ast::symbol("unquote", l.pos.clone()), inner],
                            l.pos.clone(),
                        ));
                    }
                    "quasiquote" => {
                        if l.items.len() != 2 {
                            return Err(err("quasiquote: expected 1 argument", &l.pos));
                        }
                        let inner = quasiquote(&l.items[1], depth + 1, env, cx)?;
                        return Ok(Ast::list(
                            vec![Ast::symbol("quasiquote", l.pos.clone()), inner],
                            l.pos.clone(),
                        ));
                    }
                    _ => {}
                }
            }
            let items = quasiquote_items(&l.items, depth, env, cx, &l.pos)?;
            Ok(Ast::list(items, l.pos.clone()))
        }
        Ast::Vector(v) => {
            let items = quasiquote_items(&v.items, depth, env, cx, &v.pos)?;
            Ok(Ast::vector(items, v.pos.clone()))
        }
        _ => Ok(template.clone()),
    }
}

fn quasiquote_items(
    items: &[Ast],
    depth: usize,
    env: &Rc<CtEnv>,
    cx: &mut InterpCx,
    pos: &Position,
) -> Result<Vec<Ast>, Diagnostic> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Ast::List(inner) = item {
            if inner.items.len() == 2
                && inner.items[0].as_symbol() == Some("unquote-splicing")
            {
                if depth == 1 {
                    let value = eval(&inner.items[1], env, cx)?;
                    let spliced = force_seq(value, pos).map_err(|_| {
                        err("unquote-splicing: expected a sequence", &inner.pos)
                    })?;
                    out.extend(spliced);
                    continue;
                }
                let rewritten = quasiquote(&inner.items[1], depth - 1, env, cx)?;
                out.push(Ast::list(
                    vec![
                        Ast::symbol("unquote-splicing", inner.pos.clone()),
                        rewritten,
                    ],
                    inner.pos.clone(),
                ));
                continue;
            }
        }
        out.push(quasiquote(item, depth, env, cx)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_one;

    fn eval_str(text: &str) -> CtValue {
        let ast = read_one(text, "macro-body.quill").expect("parse");
        let env = CtEnv::new();
        let mut counter = 0;
        let mut cx = InterpCx {
            gensym_counter: &mut counter,
        };
        eval(&ast, &env, &mut cx).expect("eval")
    }

    fn eval_to_form(text: &str) -> Ast {
        let pos = Position::synthetic();
        to_form(eval_str(text), &pos).expect("to_form")
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(format!("{}", eval_to_form("(+ 1 2 3)")), "6");
        assert_eq!(format!("{}", eval_to_form("(- 10 3 2)")), "5");
        assert_eq!(format!("{}", eval_to_form("(* 2 3 4)")), "24");
    }

    #[test]
    fn test_sequence_ops() {
        assert_eq!(format!("{}", eval_to_form("(first '(1 2 3))")), "1");
        assert_eq!(format!("{}", eval_to_form("(rest '(1 2 3))")), "(2 3)");
        assert_eq!(format!("{}", eval_to_form("(cons 0 '(1 2))")), "(0 1 2)");
        assert_eq!(format!("{}", eval_to_form("(concat '(1) '(2 3))")), "(1 2 3)");
        assert_eq!(format!("{}", eval_to_form("(count '(1 2 3))")), "3");
        assert_eq!(format!("{}", eval_to_form("(reverse '(1 2 3))")), "(3 2 1)");
    }

    #[test]
    fn test_higher_order_ops() {
        assert_eq!(
            format!("{}", eval_to_form("(map (fn [x] (* x 2)) '(1 2 3))")),
            "(2 4 6)"
        );
        assert_eq!(
            format!("{}", eval_to_form("(filter (fn [x] (> x 1)) '(1 2 3))")),
            "(2 3)"
        );
        assert_eq!(
            format!("{}", eval_to_form("(reduce (fn [a b] (+ a b)) 0 '(1 2 3 4))")),
            "10"
        );
    }

    #[test]
    fn test_let_and_do() {
        assert_eq!(format!("{}", eval_to_form("(let [x 2 y 3] (* x y))")), "6");
        assert_eq!(format!("{}", eval_to_form("(do 1 2 3)")), "3");
    }

    #[test]
    fn test_quasiquote_unquote() {
        assert_eq!(
            format!("{}", eval_to_form("`(+ 1 ,(+ 1 1))")),
            "(+ 1 2)"
        );
    }

    #[test]
    fn test_quasiquote_splicing() {
        assert_eq!(
            format!("{}", eval_to_form("`(+ ~@(list 1 2 3))")),
            "(+ 1 2 3)"
        );
    }

    #[test]
    fn test_nested_quasiquote_preserved() {
        assert_eq!(
            format!("{}", eval_to_form("``(a ,(b))")),
            "(quasiquote (a (unquote (b))))"
        );
    }

    #[test]
    fn test_infinite_range_is_bounded() {
        let pos = Position::synthetic();
        let forced = force_seq(eval_str("(range)"), &pos).unwrap();
        assert_eq!(forced.len(), LAZY_FORCE_LIMIT);
    }

    #[test]
    fn test_lazy_seq_memoized_and_forced() {
        assert_eq!(
            format!("{}", eval_to_form("(force (lazy-seq (list 1 2)))")),
            "(1 2)"
        );
    }

    #[test]
    fn test_gensym_produces_tagged_symbols() {
        let ast = read_one("(list (gensym) (gensym))", "m.quill").unwrap();
        let env = CtEnv::new();
        let mut counter = 0;
        let mut cx = InterpCx {
            gensym_counter: &mut counter,
        };
        let result = eval(&ast, &env, &mut cx).unwrap();
        let forms = force_seq(result, &Position::synthetic()).unwrap();
        match (&forms[0], &forms[1]) {
            (Ast::Symbol(a), Ast::Symbol(b)) => {
                assert_ne!(a.gensym_id, b.gensym_id);
                assert!(a.gensym_id.is_some());
            }
            _ => panic!("expected symbols"),
        }
        assert_eq!(counter, 2);
    }

    #[test]
    fn test_undefined_symbol_is_macro_error() {
        let ast = read_one("(+ x 1)", "m.quill").unwrap();
        let env = CtEnv::new();
        let mut counter = 0;
        let mut cx = InterpCx {
            gensym_counter: &mut counter,
        };
        let e = eval(&ast, &env, &mut cx).unwrap_err();
        assert!(e.to_string().contains("undefined symbol"));
    }
}
