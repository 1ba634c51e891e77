// ABOUTME: AST-to-IR lowering: desugars special forms, resolves references, threads types

mod classes;
mod forms;
mod types;

use crate::ast::{Ast, ListNode, LiteralValue, Position};
use crate::error::Diagnostic;
use crate::helpers;
use crate::ir::{IrKind, IrNode, ObjectProp, PropKey};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;

/// A lowered module: IR body plus the export names it statically declares
#[derive(Debug)]
pub struct IrModule {
    pub body: Vec<IrNode>,
    pub exports: Vec<String>,
}

/// Operator classification driving expression lowering
#[derive(Debug, Clone, Copy)]
enum OpKind {
    /// Left-folds over 2+ operands
    Binary(&'static str),
    /// Comparison; chains expand to `a < b && b < c`
    Compare(&'static str),
    Logical(&'static str),
    Unary(&'static str),
}

static OPERATORS: Lazy<HashMap<&'static str, OpKind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("+", OpKind::Binary("+"));
    m.insert("-", OpKind::Binary("-"));
    m.insert("*", OpKind::Binary("*"));
    m.insert("/", OpKind::Binary("/"));
    m.insert("%", OpKind::Binary("%"));
    m.insert("**", OpKind::Binary("**"));
    m.insert("=", OpKind::Compare("==="));
    m.insert("!=", OpKind::Compare("!=="));
    m.insert("<", OpKind::Compare("<"));
    m.insert(">", OpKind::Compare(">"));
    m.insert("<=", OpKind::Compare("<="));
    m.insert(">=", OpKind::Compare(">="));
    m.insert("and", OpKind::Logical("&&"));
    m.insert("or", OpKind::Logical("||"));
    m.insert("??", OpKind::Logical("??"));
    m.insert("not", OpKind::Unary("!"));
    m.insert("typeof", OpKind::Unary("typeof"));
    m.insert("void", OpKind::Unary("void"));
    m.insert("delete", OpKind::Unary("delete"));
    m.insert("bit-not", OpKind::Unary("~"));
    m.insert("bit-and", OpKind::Binary("&"));
    m.insert("bit-or", OpKind::Binary("|"));
    m.insert("bit-xor", OpKind::Binary("^"));
    m.insert("<<", OpKind::Binary("<<"));
    m.insert(">>", OpKind::Binary(">>"));
    m.insert(">>>", OpKind::Binary(">>>"));
    m.insert("instanceof", OpKind::Binary("instanceof"));
    m.insert("in", OpKind::Binary("in"));
    m
});

/// Expression vs statement position, threaded through lowering.
///
/// Statement position exists at module top level and in non-final block
/// slots; everywhere else the source language demands a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Stmt,
    Expr,
}

pub struct Lowerer {
    exports: Vec<String>,
}

/// Lower a fully macro-expanded module
pub fn lower_module(forms: &[Ast]) -> Result<IrModule, Diagnostic> {
    let mut lowerer = Lowerer {
        exports: Vec::new(),
    };
    let mut body = Vec::with_capacity(forms.len());
    for form in forms {
        let node = lowerer.lower(form, Slot::Stmt)?;
        body.push(node);
    }
    debug!(statements = body.len(), exports = lowerer.exports.len(), "lowered module");
    Ok(IrModule {
        body,
        exports: lowerer.exports,
    })
}

/// Rename a Quill identifier to a valid TypeScript identifier.
///
/// Hyphens become underscores; predicate and mutation suffixes get
/// textual markers. Returns the name unchanged when already valid.
pub fn ts_name(name: &str) -> String {
    let valid = name
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c == '$' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if valid && !name.is_empty() {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '-' | '/' => out.push('_'),
            '?' => out.push_str("_p"),
            '!' => out.push_str("_bang"),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '$' => out.push(c),
            _ => out.push('_'),
        }
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Identifier node for a source symbol, renaming when needed and keeping
/// the original spelling for source maps
pub fn ident_for(name: &str, gensym_id: Option<u64>, pos: &Position) -> IrNode {
    if let Some(id) = gensym_id {
        let fresh = format!("{}__g{}", ts_name(name), id);
        return IrNode::renamed_ident(fresh, name, pos.clone());
    }
    if let Some(helper) = helpers::by_source_name(name) {
        return IrNode::renamed_ident(helper.emitted_name, name, pos.clone());
    }
    let renamed = ts_name(name);
    if renamed == name {
        IrNode::ident(name, pos.clone())
    } else {
        IrNode::renamed_ident(renamed, name, pos.clone())
    }
}

impl Lowerer {
    pub(crate) fn record_export(&mut self, name: String) {
        if !self.exports.contains(&name) {
            self.exports.push(name);
        }
    }

    /// Main dispatch
    pub fn lower(&mut self, form: &Ast, slot: Slot) -> Result<IrNode, Diagnostic> {
        match form {
            Ast::Literal(l) => Ok(lower_literal(&l.value, &l.pos)),
            Ast::Symbol(s) => Ok(self.lower_symbol_ref(&s.name, s.gensym_id, &s.pos)),
            Ast::Vector(v) => {
                let elements: Result<Vec<IrNode>, Diagnostic> = v
                    .items
                    .iter()
                    .map(|item| self.lower(item, Slot::Expr))
                    .collect();
                Ok(IrNode::new(IrKind::ArrayLit(elements?), v.pos.clone()))
            }
            Ast::List(l) => self.lower_list(l, slot),
        }
    }

    fn lower_list(&mut self, list: &ListNode, slot: Slot) -> Result<IrNode, Diagnostic> {
        let pos = &list.pos;
        if list.items.is_empty() {
            return Ok(IrNode::null(pos.clone()));
        }

        if let Some(head) = list.items[0].as_symbol() {
            let args = &list.items[1..];
            match head {
                "let" => return self.lower_binding(crate::ir::VarKind::Let, args, pos),
                "const" | "def" => {
                    return self.lower_binding(crate::ir::VarKind::Const, args, pos)
                }
                "var" => return self.lower_binding(crate::ir::VarKind::Var, args, pos),
                "do" => return self.lower_do(args, slot, pos),
                "if" => return self.lower_if(args, slot, pos),
                "fn" => return self.lower_fn(args, false, pos),
                "lambda" => return self.lower_lambda(args, false, pos),
                "async" => return self.lower_async(args, pos),
                "while" => return self.lower_while(args, slot, pos),
                "for" => return self.lower_for(args, slot, pos),
                "break" => return Ok(IrNode::new(IrKind::Break(label_of(args)), pos.clone())),
                "continue" => {
                    return Ok(IrNode::new(IrKind::Continue(label_of(args)), pos.clone()))
                }
                "return" => return self.lower_return(args, pos),
                "throw" => return self.lower_throw(args, pos),
                "try" => return self.lower_try(args, slot, pos),
                "await" => return self.lower_await(args, pos),
                "yield" => return self.lower_yield(args, false, pos),
                "yield*" => return self.lower_yield(args, true, pos),
                "new" => return self.lower_new(args, pos),
                "set!" => return self.lower_set(args, pos),
                "class" => return self.lower_class(args, pos),
                "enum" => return self.lower_enum(args, pos),
                "type" => return self.lower_type_alias(args, pos),
                "interface" => return self.lower_interface(args, pos),
                "import" => return self.lower_import(args, pos),
                "import-dynamic" => return self.lower_dynamic_import(args, pos),
                "export" => return self.lower_export(args, pos),
                "quote" => return self.lower_quote(args, pos),
                "quasiquote" => return self.lower_quasiquote(args, pos),
                "template" => return self.lower_template(args, pos),
                "hash-map" => return self.lower_hash_map(args, pos),
                "..." => return self.lower_spread(args, pos),
                "?." => return self.lower_optional_member(args, pos),
                _ => {}
            }

            if let Some(op) = OPERATORS.get(head) {
                return self.lower_operator(head, *op, args, pos);
            }

            // `(.member obj)` reads a property that may be a zero-arg
            // method; with arguments it is a dynamic method call
            if let Some(prop) = head.strip_prefix('.') {
                if !prop.is_empty() && !prop.contains('.') {
                    return self.lower_accessor(prop, args, pos);
                }
            }
        }

        // Plain application
        let callee = self.lower(&list.items[0], Slot::Expr)?;
        let args: Result<Vec<IrNode>, Diagnostic> = list.items[1..]
            .iter()
            .map(|arg| self.lower(arg, Slot::Expr))
            .collect();
        Ok(IrNode::new(
            IrKind::Call {
                callee: Box::new(callee),
                args: args?,
            },
            pos.clone(),
        ))
    }

    /// A symbol in value position: keyword, dotted interop chain,
    /// first-class operator, helper, or plain reference
    fn lower_symbol_ref(&mut self, name: &str, gensym_id: Option<u64>, pos: &Position) -> IrNode {
        if let Some(key) = name.strip_prefix(':') {
            return IrNode::string(key, pos.clone());
        }
        if name == "this" {
            return IrNode::ident("this", pos.clone());
        }
        // Operator referenced as a value becomes a get-op lookup
        if OPERATORS.contains_key(name) && helpers::by_source_name(name).is_none() {
            let get_op = IrNode::renamed_ident("getOp", "get-op", pos.clone());
            return IrNode::call(get_op, vec![IrNode::string(name, pos.clone())], pos.clone());
        }
        if name.contains('.') && !name.starts_with('.') && gensym_id.is_none() {
            return self.lower_dotted_chain(name, pos);
        }
        ident_for(name, gensym_id, pos)
    }

    /// `a.b.c` becomes a member chain rooted at identifier `a`
    fn lower_dotted_chain(&mut self, name: &str, pos: &Position) -> IrNode {
        let mut parts = name.split('.');
        let root = parts.next().unwrap_or_default();
        let mut node = ident_for(root, None, pos);
        for part in parts {
            node = IrNode::new(
                IrKind::Member {
                    object: Box::new(node),
                    property: Box::new(IrNode::ident(part, pos.clone())),
                    computed: false,
                    optional: false,
                },
                pos.clone(),
            );
        }
        node
    }

    fn lower_operator(
        &mut self,
        name: &str,
        op: OpKind,
        args: &[Ast],
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        match op {
            OpKind::Unary(ts) => {
                if args.len() != 1 {
                    return Err(Diagnostic::lower(
                        format!("{}: expected 1 argument, got {}", name, args.len()),
                        pos.clone(),
                    ));
                }
                let operand = self.lower(&args[0], Slot::Expr)?;
                Ok(IrNode::new(
                    IrKind::Unary {
                        op: ts,
                        operand: Box::new(operand),
                    },
                    pos.clone(),
                ))
            }
            OpKind::Binary(ts) => {
                if name == "-" && args.len() == 1 {
                    let operand = self.lower(&args[0], Slot::Expr)?;
                    return Ok(IrNode::new(
                        IrKind::Unary {
                            op: "-",
                            operand: Box::new(operand),
                        },
                        pos.clone(),
                    ));
                }
                if args.len() < 2 {
                    return Err(Diagnostic::lower(
                        format!("{}: expected at least 2 arguments", name),
                        pos.clone(),
                    ));
                }
                let mut node = self.lower(&args[0], Slot::Expr)?;
                for arg in &args[1..] {
                    let right = self.lower(arg, Slot::Expr)?;
                    node = IrNode::new(
                        IrKind::Binary {
                            op: ts,
                            left: Box::new(node),
                            right: Box::new(right),
                        },
                        pos.clone(),
                    );
                }
                Ok(node)
            }
            OpKind::Compare(ts) => {
                if args.len() < 2 {
                    return Err(Diagnostic::lower(
                        format!("{}: expected at least 2 arguments", name),
                        pos.clone(),
                    ));
                }
                // Chained comparisons and-together pairwise
                let mut pairs = Vec::new();
                for window in args.windows(2) {
                    let left = self.lower(&window[0], Slot::Expr)?;
                    let right = self.lower(&window[1], Slot::Expr)?;
                    pairs.push(IrNode::new(
                        IrKind::Binary {
                            op: ts,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        pos.clone(),
                    ));
                }
                let mut iter = pairs.into_iter();
                let mut node = iter.next().expect("at least one pair");
                for next in iter {
                    node = IrNode::new(
                        IrKind::Logical {
                            op: "&&",
                            left: Box::new(node),
                            right: Box::new(next),
                        },
                        pos.clone(),
                    );
                }
                Ok(node)
            }
            OpKind::Logical(ts) => {
                if args.len() < 2 {
                    return Err(Diagnostic::lower(
                        format!("{}: expected at least 2 arguments", name),
                        pos.clone(),
                    ));
                }
                let mut node = self.lower(&args[0], Slot::Expr)?;
                for arg in &args[1..] {
                    let right = self.lower(arg, Slot::Expr)?;
                    node = IrNode::new(
                        IrKind::Logical {
                            op: ts,
                            left: Box::new(node),
                            right: Box::new(right),
                        },
                        pos.clone(),
                    );
                }
                Ok(node)
            }
        }
    }

    /// `(.prop obj)` — property or zero-arg method, receiver evaluated
    /// once; `(.m obj a b)` — dynamic method call through the helper
    fn lower_accessor(
        &mut self,
        prop: &str,
        args: &[Ast],
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        if args.is_empty() {
            return Err(Diagnostic::lower(
                format!(".{}: expected a receiver", prop),
                pos.clone(),
            ));
        }
        let object = self.lower(&args[0], Slot::Expr)?;
        if args.len() == 1 {
            return Ok(IrNode::new(
                IrKind::InteropGet {
                    object: Box::new(object),
                    property: prop.to_string(),
                },
                pos.clone(),
            ));
        }
        let rest: Result<Vec<IrNode>, Diagnostic> = args[1..]
            .iter()
            .map(|arg| self.lower(arg, Slot::Expr))
            .collect();
        Ok(IrNode::new(
            IrKind::InteropCall {
                object: Box::new(object),
                method: prop.to_string(),
                args: rest?,
            },
            pos.clone(),
        ))
    }

    fn lower_optional_member(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.len() != 2 {
            return Err(Diagnostic::lower(
                "?.: expected (?. object property)",
                pos.clone(),
            ));
        }
        let object = self.lower(&args[0], Slot::Expr)?;
        let prop = args[1]
            .as_symbol()
            .ok_or_else(|| Diagnostic::lower("?.: property must be a symbol", args[1].pos().clone()))?;
        let prop = prop.strip_prefix(':').unwrap_or(prop);
        Ok(IrNode::new(
            IrKind::Member {
                object: Box::new(object),
                property: Box::new(IrNode::ident(prop, pos.clone())),
                computed: false,
                optional: true,
            },
            pos.clone(),
        ))
    }

    fn lower_spread(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.len() != 1 {
            return Err(Diagnostic::lower("spread expects one expression", pos.clone()));
        }
        let inner = self.lower(&args[0], Slot::Expr)?;
        Ok(IrNode::new(IrKind::Spread(Box::new(inner)), pos.clone()))
    }

    fn lower_hash_map(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let mut props = Vec::new();
        let mut i = 0;
        while i < args.len() {
            // `{...other :a 1}` merges another object
            if args[i].is_form("...") {
                let inner = args[i].as_list().expect("spread form is a list");
                let spread = self.lower(&inner[1], Slot::Expr)?;
                props.push(ObjectProp::Spread(spread));
                i += 1;
                continue;
            }
            if i + 1 >= args.len() {
                return Err(Diagnostic::lower(
                    "map literal needs key/value pairs",
                    args[i].pos().clone(),
                ));
            }
            let key = match &args[i] {
                Ast::Symbol(s) => {
                    PropKey::Ident(s.name.strip_prefix(':').unwrap_or(&s.name).to_string())
                }
                Ast::Literal(l) => match &l.value {
                    LiteralValue::Str(s) => PropKey::Ident(s.clone()),
                    LiteralValue::Number(n) => {
                        PropKey::Ident(format!("{}", Ast::literal(LiteralValue::Number(*n), l.pos.clone())))
                    }
                    _ => {
                        return Err(Diagnostic::lower(
                            "map key must be a keyword, string, or number",
                            l.pos.clone(),
                        ))
                    }
                },
                Ast::Vector(v) if v.items.len() == 1 => {
                    PropKey::Computed(self.lower(&v.items[0], Slot::Expr)?)
                }
                other => {
                    return Err(Diagnostic::lower(
                        "map key must be a keyword, string, number, or [computed]",
                        other.pos().clone(),
                    ));
                }
            };
            let value = self.lower(&args[i + 1], Slot::Expr)?;
            props.push(ObjectProp::KeyValue { key, value });
            i += 2;
        }
        Ok(IrNode::new(IrKind::ObjectLit(props), pos.clone()))
    }

    fn lower_template(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        for (i, part) in args.iter().enumerate() {
            if i % 2 == 0 {
                let text = part.as_string_literal().ok_or_else(|| {
                    Diagnostic::lower("template: malformed text part", part.pos().clone())
                })?;
                quasis.push(text.to_string());
            } else {
                exprs.push(self.lower(part, Slot::Expr)?);
            }
        }
        if quasis.len() != exprs.len() + 1 {
            return Err(Diagnostic::lower("template: malformed parts", pos.clone()));
        }
        Ok(IrNode::new(IrKind::TemplateLit { quasis, exprs }, pos.clone()))
    }

    /// Quoted data becomes literal construction: symbols as strings,
    /// lists as arrays
    fn lower_quote(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.len() != 1 {
            return Err(Diagnostic::lower("quote: expected 1 argument", pos.clone()));
        }
        Ok(quote_to_ir(&args[0]))
    }

    fn lower_quasiquote(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.len() != 1 {
            return Err(Diagnostic::lower(
                "quasiquote: expected 1 argument",
                pos.clone(),
            ));
        }
        self.quasiquote_to_ir(&args[0])
    }

    /// Runtime quasiquote: unquotes evaluate, splices spread
    fn quasiquote_to_ir(&mut self, template: &Ast) -> Result<IrNode, Diagnostic> {
        match template {
            Ast::List(l) if !l.items.is_empty() => {
                if l.items[0].as_symbol() == Some("unquote") && l.items.len() == 2 {
                    return self.lower(&l.items[1], Slot::Expr);
                }
                let mut elements = Vec::with_capacity(l.items.len());
                for item in &l.items {
                    if let Ast::List(inner) = item {
                        if inner.items.len() == 2
                            && inner.items[0].as_symbol() == Some("unquote-splicing")
                        {
                            let spliced = self.lower(&inner.items[1], Slot::Expr)?;
                            elements.push(IrNode::new(
                                IrKind::Spread(Box::new(spliced)),
                                inner.pos.clone(),
                            ));
                            continue;
                        }
                    }
                    elements.push(self.quasiquote_to_ir(item)?);
                }
                Ok(IrNode::new(IrKind::ArrayLit(elements), l.pos.clone()))
            }
            Ast::Vector(v) => {
                let elements: Result<Vec<IrNode>, Diagnostic> =
                    v.items.iter().map(|item| self.quasiquote_to_ir(item)).collect();
                Ok(IrNode::new(IrKind::ArrayLit(elements?), v.pos.clone()))
            }
            other => Ok(quote_to_ir(other)),
        }
    }
}

fn lower_literal(value: &LiteralValue, pos: &Position) -> IrNode {
    let kind = match value {
        LiteralValue::Number(n) => IrKind::NumberLit(*n),
        LiteralValue::BigInt(digits) => IrKind::BigIntLit(digits.clone()),
        LiteralValue::Str(s) => IrKind::StringLit(s.clone()),
        LiteralValue::Bool(b) => IrKind::BoolLit(*b),
        LiteralValue::Nil => IrKind::NullLit,
    };
    IrNode::new(kind, pos.clone())
}

fn quote_to_ir(ast: &Ast) -> IrNode {
    match ast {
        Ast::Symbol(s) => IrNode::string(s.name.clone(), s.pos.clone()),
        Ast::Literal(l) => lower_literal(&l.value, &l.pos),
        Ast::List(l) => IrNode::new(
            IrKind::ArrayLit(l.items.iter().map(quote_to_ir).collect()),
            l.pos.clone(),
        ),
        Ast::Vector(v) => IrNode::new(
            IrKind::ArrayLit(v.items.iter().map(quote_to_ir).collect()),
            v.pos.clone(),
        ),
    }
}

fn label_of(args: &[Ast]) -> Option<String> {
    args.first().and_then(|a| a.as_symbol()).map(ts_name)
}

/// True when the function body syntactically contains `this`
pub(crate) fn mentions_this(ast: &Ast) -> bool {
    match ast {
        Ast::Symbol(s) => s.name == "this" || s.name.starts_with("this."),
        Ast::Literal(_) => false,
        // Over-approximates into nested functions
        Ast::List(l) => l.items.iter().any(mentions_this),
        Ast::Vector(v) => v.items.iter().any(mentions_this),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_program;

    pub(crate) fn lower_str(text: &str) -> IrModule {
        let forms = read_program(text, "t.quill").expect("parse");
        lower_module(&forms).expect("lower")
    }

    #[test]
    fn test_ts_name_renaming() {
        assert_eq!(ts_name("plain"), "plain");
        assert_eq!(ts_name("my-fn"), "my_fn");
        assert_eq!(ts_name("empty?"), "empty_p");
        assert_eq!(ts_name("set!"), "set_bang");
        assert_eq!(ts_name("ns/name"), "ns_name");
        assert_eq!(ts_name("1st"), "_1st");
    }

    #[test]
    fn test_operator_folding() {
        let m = lower_str("(+ 1 2 3)");
        match &m.body[0].kind {
            IrKind::Binary { op, left, .. } => {
                assert_eq!(*op, "+");
                assert!(matches!(left.kind, IrKind::Binary { .. }));
            }
            other => panic!("expected binary fold, got {:?}", other),
        }
    }

    #[test]
    fn test_equality_becomes_strict() {
        let m = lower_str("(= a b)");
        match &m.body[0].kind {
            IrKind::Binary { op, .. } => assert_eq!(*op, "==="),
            other => panic!("expected ===, got {:?}", other),
        }
    }

    #[test]
    fn test_chained_comparison() {
        let m = lower_str("(< a b c)");
        match &m.body[0].kind {
            IrKind::Logical { op, .. } => assert_eq!(*op, "&&"),
            other => panic!("expected && chain, got {:?}", other),
        }
    }

    #[test]
    fn test_operator_as_value_uses_get_op() {
        let m = lower_str("(reduce + 0 xs)");
        match &m.body[0].kind {
            IrKind::Call { args, .. } => match &args[0].kind {
                IrKind::Call { callee, args } => {
                    assert_eq!(callee.identifier_name(), Some("getOp"));
                    assert!(matches!(&args[0].kind, IrKind::StringLit(s) if s == "+"));
                }
                other => panic!("expected get-op call, got {:?}", other),
            },
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_keyword_lowers_to_string() {
        let m = lower_str(":name");
        assert!(matches!(&m.body[0].kind, IrKind::StringLit(s) if s == "name"));
    }

    #[test]
    fn test_dotted_symbol_becomes_member_chain() {
        let m = lower_str("(console.log x)");
        match &m.body[0].kind {
            IrKind::Call { callee, .. } => match &callee.kind {
                IrKind::Member { object, .. } => {
                    assert_eq!(object.identifier_name(), Some("console"));
                }
                other => panic!("expected member, got {:?}", other),
            },
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_accessor_forms() {
        let m = lower_str("(.length s)");
        assert!(matches!(&m.body[0].kind, IrKind::InteropGet { property, .. } if property == "length"));

        let m = lower_str("(.slice s 1 2)");
        match &m.body[0].kind {
            IrKind::InteropCall { method, args, .. } => {
                assert_eq!(method, "slice");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected interop call, got {:?}", other),
        }
    }

    #[test]
    fn test_helper_reference_renames() {
        let m = lower_str("(to-sequence xs)");
        match &m.body[0].kind {
            IrKind::Call { callee, .. } => {
                assert_eq!(callee.identifier_name(), Some("toSequence"));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_quote_becomes_data() {
        let m = lower_str("'(1 x \"s\")");
        match &m.body[0].kind {
            IrKind::ArrayLit(items) => {
                assert!(matches!(items[0].kind, IrKind::NumberLit(n) if n == 1.0));
                assert!(matches!(&items[1].kind, IrKind::StringLit(s) if s == "x"));
                assert!(matches!(&items[2].kind, IrKind::StringLit(s) if s == "s"));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_quasiquote_splicing_becomes_spread() {
        let m = lower_str("`(1 ~@xs 2)");
        match &m.body[0].kind {
            IrKind::ArrayLit(items) => {
                assert!(matches!(items[1].kind, IrKind::Spread(_)));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_map_literal() {
        let m = lower_str("{:a 1 \"b\" 2}");
        match &m.body[0].kind {
            IrKind::ObjectLit(props) => {
                assert_eq!(props.len(), 2);
                assert!(matches!(
                    &props[0],
                    ObjectProp::KeyValue { key: PropKey::Ident(k), .. } if k == "a"
                ));
            }
            other => panic!("expected object literal, got {:?}", other),
        }
    }

    #[test]
    fn test_mentions_this() {
        let forms = read_program("(fn [] (+ this.x 1))", "t.quill").unwrap();
        assert!(mentions_this(&forms[0]));
        let forms = read_program("(fn [] (+ x 1))", "t.quill").unwrap();
        assert!(!mentions_this(&forms[0]));
    }
}
