// ABOUTME: Lowering of binding, function, control-flow, and module forms

use crate::ast::{Ast, Position};
use crate::error::Diagnostic;
use crate::ir::{
    CatchClause, ImportSpecifier, IrKind, IrNode, ObjectPatternProp, Param, VarKind,
};
use super::{ident_for, mentions_this, ts_name, Lowerer, Slot};

impl Lowerer {
    // ========================================================================
    // Bindings and Patterns
    // ========================================================================

    /// `(let name value)`, `(let name: Type value)`, or destructuring
    /// `(let [a b & r] value)` / `(let {a :a} value)`
    pub(crate) fn lower_binding(
        &mut self,
        kind: VarKind,
        args: &[Ast],
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        if args.is_empty() {
            return Err(Diagnostic::lower("binding: expected a name", pos.clone()));
        }

        // Annotated form: name ends with ':' and the type follows
        if let Some(name) = args[0].as_symbol().and_then(|n| n.strip_suffix(':')) {
            if args.len() != 3 {
                return Err(Diagnostic::lower(
                    "binding: expected (let name: Type value)",
                    pos.clone(),
                ));
            }
            let ty = self.lower_type_expr(&args[1])?;
            let init = self.lower(&args[2], Slot::Expr)?;
            return Ok(IrNode::new(
                IrKind::VariableDecl {
                    kind,
                    name: Box::new(ident_for(name, None, args[0].pos())),
                    ty: Some(ty),
                    init: Some(Box::new(init)),
                },
                pos.clone(),
            ));
        }

        if args.len() != 2 {
            return Err(Diagnostic::lower(
                "binding: expected (let name value)",
                pos.clone(),
            ));
        }
        let name = self.lower_pattern(&args[0])?;
        let init = self.lower(&args[1], Slot::Expr)?;
        Ok(IrNode::new(
            IrKind::VariableDecl {
                kind,
                name: Box::new(name),
                ty: None,
                init: Some(Box::new(init)),
            },
            pos.clone(),
        ))
    }

    /// Binding target: identifier, `[a b & rest]`, or `{a :a}` shapes
    pub(crate) fn lower_pattern(&mut self, ast: &Ast) -> Result<IrNode, Diagnostic> {
        match ast {
            Ast::Symbol(s) => Ok(ident_for(&s.name, s.gensym_id, &s.pos)),
            Ast::Vector(v) => {
                let mut elements = Vec::with_capacity(v.items.len());
                let mut iter = v.items.iter().peekable();
                while let Some(item) = iter.next() {
                    if item.as_symbol() == Some("&") {
                        let target = iter.next().ok_or_else(|| {
                            Diagnostic::lower("destructuring: expected name after &", v.pos.clone())
                        })?;
                        let inner = self.lower_pattern(target)?;
                        elements.push(IrNode::new(
                            IrKind::RestElement(Box::new(inner)),
                            target.pos().clone(),
                        ));
                        if iter.peek().is_some() {
                            return Err(Diagnostic::lower(
                                "destructuring: rest element must be last",
                                v.pos.clone(),
                            ));
                        }
                        break;
                    }
                    // `(name default)` supplies a fallback
                    if let Some(items) = item.as_list() {
                        if items.len() == 2 && !item.is_form("hash-map") {
                            let target = self.lower_pattern(&items[0])?;
                            let default = self.lower(&items[1], Slot::Expr)?;
                            elements.push(IrNode::new(
                                IrKind::AssignmentPattern {
                                    target: Box::new(target),
                                    default: Box::new(default),
                                },
                                item.pos().clone(),
                            ));
                            continue;
                        }
                    }
                    elements.push(self.lower_pattern(item)?);
                }
                Ok(IrNode::new(IrKind::ArrayPattern(elements), v.pos.clone()))
            }
            Ast::List(l) if ast.is_form("hash-map") => {
                let entries = &l.items[1..];
                let mut props = Vec::new();
                let mut rest = None;
                let mut i = 0;
                while i < entries.len() {
                    if entries[i].as_symbol() == Some("&") {
                        let target = entries.get(i + 1).ok_or_else(|| {
                            Diagnostic::lower("destructuring: expected name after &", l.pos.clone())
                        })?;
                        rest = Some(Box::new(self.lower_pattern(target)?));
                        i += 2;
                        continue;
                    }
                    if i + 1 >= entries.len() {
                        return Err(Diagnostic::lower(
                            "map destructuring needs binding/key pairs",
                            l.pos.clone(),
                        ));
                    }
                    let target = self.lower_pattern(&entries[i])?;
                    let key = entries[i + 1]
                        .as_symbol()
                        .map(|s| s.strip_prefix(':').unwrap_or(s).to_string())
                        .or_else(|| entries[i + 1].as_string_literal().map(|s| s.to_string()))
                        .ok_or_else(|| {
                            Diagnostic::lower(
                                "map destructuring key must be a keyword or string",
                                entries[i + 1].pos().clone(),
                            )
                        })?;
                    props.push(ObjectPatternProp { key, value: target });
                    i += 2;
                }
                Ok(IrNode::new(IrKind::ObjectPattern { props, rest }, l.pos.clone()))
            }
            other => Err(Diagnostic::lower(
                format!("cannot destructure into a {}", other.kind_name()),
                other.pos().clone(),
            )),
        }
    }

    // ========================================================================
    // Blocks and Conditionals
    // ========================================================================

    pub(crate) fn lower_do(
        &mut self,
        args: &[Ast],
        slot: Slot,
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        match slot {
            Slot::Stmt => {
                let stmts: Result<Vec<IrNode>, Diagnostic> =
                    args.iter().map(|a| self.lower(a, Slot::Stmt)).collect();
                Ok(IrNode::block(stmts?, pos.clone()))
            }
            Slot::Expr => match args.len() {
                0 => Ok(IrNode::null(pos.clone())),
                1 => self.lower(&args[0], Slot::Expr),
                _ => {
                    let exprs: Result<Vec<IrNode>, Diagnostic> =
                        args.iter().map(|a| self.lower(a, Slot::Expr)).collect();
                    Ok(IrNode::new(IrKind::Sequence(exprs?), pos.clone()))
                }
            },
        }
    }

    pub(crate) fn lower_if(
        &mut self,
        args: &[Ast],
        slot: Slot,
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        if args.len() < 2 || args.len() > 3 {
            return Err(Diagnostic::lower(
                "if: expected (if test then else?)",
                pos.clone(),
            ));
        }
        let test = self.lower(&args[0], Slot::Expr)?;
        match slot {
            Slot::Stmt => {
                let consequent = self.lower(&args[1], Slot::Stmt)?;
                let alternate = match args.get(2) {
                    Some(a) => Some(Box::new(self.lower(a, Slot::Stmt)?)),
                    None => None,
                };
                Ok(IrNode::new(
                    IrKind::If {
                        test: Box::new(test),
                        consequent: Box::new(consequent),
                        alternate,
                    },
                    pos.clone(),
                ))
            }
            Slot::Expr => {
                let consequent = self.lower(&args[1], Slot::Expr)?;
                let alternate = match args.get(2) {
                    Some(a) => self.lower(a, Slot::Expr)?,
                    None => IrNode::null(pos.clone()),
                };
                Ok(IrNode::new(
                    IrKind::Conditional {
                        test: Box::new(test),
                        consequent: Box::new(consequent),
                        alternate: Box::new(alternate),
                    },
                    pos.clone(),
                ))
            }
        }
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// `(fn name [params] body…)` declares; `(fn [params] body…)` is an
    /// anonymous function expression
    pub(crate) fn lower_fn(
        &mut self,
        args: &[Ast],
        is_async: bool,
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        match args.first() {
            Some(Ast::Symbol(name)) => {
                if args.len() < 2 {
                    return Err(Diagnostic::lower(
                        "fn: expected a parameter vector",
                        pos.clone(),
                    ));
                }
                let (params, json_params) = self.lower_params(&args[1])?;
                let body = self.body_block(&args[2..], pos)?;
                Ok(IrNode::new(
                    IrKind::FnDecl {
                        name: ts_name(&name.name),
                        params,
                        json_params,
                        body: Box::new(body),
                        is_async,
                        return_type: None,
                    },
                    pos.clone(),
                ))
            }
            Some(_) => self.lower_lambda(args, is_async, pos),
            None => Err(Diagnostic::lower("fn: expected parameters", pos.clone())),
        }
    }

    /// Anonymous function; emits as an arrow unless the body uses `this`
    pub(crate) fn lower_lambda(
        &mut self,
        args: &[Ast],
        is_async: bool,
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        if args.is_empty() {
            return Err(Diagnostic::lower("fn: expected parameters", pos.clone()));
        }
        let (params, json_params) = self.lower_params(&args[0])?;
        if json_params {
            return Err(Diagnostic::lower(
                "keyword-style parameters require a named fn",
                pos.clone(),
            ));
        }
        let uses_this = args[1..].iter().any(mentions_this);
        let body = self.body_block(&args[1..], pos)?;
        Ok(IrNode::new(
            IrKind::Function {
                name: None,
                params,
                body: Box::new(body),
                uses_this,
                is_async,
                is_generator: false,
                return_type: None,
            },
            pos.clone(),
        ))
    }

    /// `(async (fn …))` marks the wrapped function async
    pub(crate) fn lower_async(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let inner = args
            .first()
            .and_then(|a| a.as_list())
            .filter(|items| {
                matches!(items.first().and_then(|h| h.as_symbol()), Some("fn" | "lambda"))
            })
            .ok_or_else(|| {
                Diagnostic::lower("async: expected (async (fn …))", pos.clone())
            })?;
        match inner[0].as_symbol() {
            Some("fn") => self.lower_fn(&inner[1..], true, pos),
            _ => self.lower_lambda(&inner[1..], true, pos),
        }
    }

    /// Parameter vector or keyword-parameter map.
    ///
    /// Vector entries: `name`, `name:` followed by a type, `(name default)`,
    /// `(name: Type default)`, `& rest`, or a destructuring pattern.
    /// A map `{name default …}` switches the function to keyword-style
    /// arguments.
    pub(crate) fn lower_params(&mut self, ast: &Ast) -> Result<(Vec<Param>, bool), Diagnostic> {
        if ast.is_form("hash-map") {
            let entries = &ast.as_list().expect("hash-map is a list")[1..];
            if entries.len() % 2 != 0 {
                return Err(Diagnostic::lower(
                    "keyword parameters need name/default pairs",
                    ast.pos().clone(),
                ));
            }
            let mut params = Vec::with_capacity(entries.len() / 2);
            for pair in entries.chunks(2) {
                let name = pair[0].as_symbol().ok_or_else(|| {
                    Diagnostic::lower("keyword parameter name must be a symbol", pair[0].pos().clone())
                })?;
                let default = self.lower(&pair[1], Slot::Expr)?;
                params.push(Param {
                    pattern: ident_for(name, None, pair[0].pos()),
                    ty: None,
                    default: Some(default),
                });
            }
            return Ok((params, true));
        }

        let items = ast.as_vector().ok_or_else(|| {
            Diagnostic::lower("expected a parameter vector", ast.pos().clone())
        })?;

        let mut params = Vec::new();
        let mut iter = items.iter().peekable();
        while let Some(item) = iter.next() {
            if item.as_symbol() == Some("&") {
                let rest = iter.next().ok_or_else(|| {
                    Diagnostic::lower("expected rest parameter after &", ast.pos().clone())
                })?;
                let inner = self.lower_pattern(rest)?;
                params.push(Param {
                    pattern: IrNode::new(IrKind::RestElement(Box::new(inner)), rest.pos().clone()),
                    ty: None,
                    default: None,
                });
                if iter.peek().is_some() {
                    return Err(Diagnostic::lower(
                        "rest parameter must be last",
                        ast.pos().clone(),
                    ));
                }
                break;
            }
            if let Some(name) = item.as_symbol().and_then(|n| n.strip_suffix(':')) {
                let ty_form = iter.next().ok_or_else(|| {
                    Diagnostic::lower("expected a type after annotated parameter", item.pos().clone())
                })?;
                let ty = self.lower_type_expr(ty_form)?;
                params.push(Param {
                    pattern: ident_for(name, None, item.pos()),
                    ty: Some(ty),
                    default: None,
                });
                continue;
            }
            if let Some(list) = item.as_list() {
                if !item.is_form("hash-map") && (list.len() == 2 || list.len() == 3) {
                    // `(name default)` or `(name: Type default)`
                    if let Some(name) = list[0].as_symbol() {
                        let (name, ty, default_idx) = match name.strip_suffix(':') {
                            Some(stripped) if list.len() == 3 => {
                                (stripped, Some(self.lower_type_expr(&list[1])?), 2)
                            }
                            _ => (name, None, 1),
                        };
                        let default = self.lower(&list[default_idx], Slot::Expr)?;
                        params.push(Param {
                            pattern: ident_for(name, None, list[0].pos()),
                            ty,
                            default: Some(default),
                        });
                        continue;
                    }
                }
            }
            params.push(Param {
                pattern: self.lower_pattern(item)?,
                ty: None,
                default: None,
            });
        }
        Ok((params, false))
    }

    /// Function body: all forms as statements, the last wrapped in a
    /// return so the body yields its final value
    pub(crate) fn body_block(&mut self, forms: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let mut stmts = Vec::with_capacity(forms.len());
        if let Some((last, init)) = forms.split_last() {
            for form in init {
                stmts.push(self.lower(form, Slot::Stmt)?);
            }
            let value = self.lower(last, Slot::Expr)?;
            stmts.push(IrNode::new(
                IrKind::Return(Some(Box::new(value))),
                last.pos().clone(),
            ));
        }
        Ok(IrNode::block(stmts, pos.clone()))
    }

    /// Zero-arg IIFE wrapping statements that have no expression form
    pub(crate) fn iife(&mut self, stmts: Vec<IrNode>, pos: &Position) -> IrNode {
        let f = IrNode::new(
            IrKind::Function {
                name: None,
                params: Vec::new(),
                body: Box::new(IrNode::block(stmts, pos.clone())),
                uses_this: false,
                is_async: false,
                is_generator: false,
                return_type: None,
            },
            pos.clone(),
        );
        IrNode::call(f, Vec::new(), pos.clone())
    }

    // ========================================================================
    // Loops
    // ========================================================================

    pub(crate) fn lower_while(
        &mut self,
        args: &[Ast],
        slot: Slot,
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        if args.is_empty() {
            return Err(Diagnostic::lower("while: expected a test", pos.clone()));
        }
        let test = self.lower(&args[0], Slot::Expr)?;
        let body_stmts: Result<Vec<IrNode>, Diagnostic> = args[1..]
            .iter()
            .map(|a| self.lower(a, Slot::Stmt))
            .collect();
        let node = IrNode::new(
            IrKind::While {
                test: Box::new(test),
                body: Box::new(IrNode::block(body_stmts?, pos.clone())),
            },
            pos.clone(),
        );
        Ok(match slot {
            Slot::Stmt => node,
            Slot::Expr => self.iife(vec![node], pos),
        })
    }

    /// `(for [x seq] body…)` iterates any sequence through the
    /// to-sequence coercion helper
    pub(crate) fn lower_for(
        &mut self,
        args: &[Ast],
        slot: Slot,
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        let binding = args
            .first()
            .and_then(|b| b.as_vector())
            .filter(|b| b.len() == 2)
            .ok_or_else(|| {
                Diagnostic::lower("for: expected (for [name seq] body…)", pos.clone())
            })?;
        let pattern = self.lower_pattern(&binding[0])?;
        let seq = self.lower(&binding[1], Slot::Expr)?;
        let to_sequence = IrNode::renamed_ident("toSequence", "to-sequence", binding[1].pos().clone());
        let iterable = IrNode::call(to_sequence, vec![seq], binding[1].pos().clone());
        let body_stmts: Result<Vec<IrNode>, Diagnostic> = args[1..]
            .iter()
            .map(|a| self.lower(a, Slot::Stmt))
            .collect();
        let node = IrNode::new(
            IrKind::ForOf {
                kind: VarKind::Const,
                binding: Box::new(pattern),
                iterable: Box::new(iterable),
                body: Box::new(IrNode::block(body_stmts?, pos.clone())),
            },
            pos.clone(),
        );
        Ok(match slot {
            Slot::Stmt => node,
            Slot::Expr => self.iife(vec![node], pos),
        })
    }

    // ========================================================================
    // Exceptional Control Flow
    // ========================================================================

    pub(crate) fn lower_return(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let value = match args.first() {
            Some(a) => Some(Box::new(self.lower(a, Slot::Expr)?)),
            None => None,
        };
        Ok(IrNode::new(IrKind::Return(value), pos.clone()))
    }

    pub(crate) fn lower_throw(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.len() != 1 {
            return Err(Diagnostic::lower("throw: expected 1 argument", pos.clone()));
        }
        let value = self.lower(&args[0], Slot::Expr)?;
        Ok(IrNode::new(IrKind::Throw(Box::new(value)), pos.clone()))
    }

    /// `(try body… (catch e handler…) (finally cleanup…))`
    pub(crate) fn lower_try(
        &mut self,
        args: &[Ast],
        slot: Slot,
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        let mut body_forms: Vec<Ast> = Vec::new();
        let mut handler = None;
        let mut finalizer = None;

        for arg in args {
            if arg.is_form("catch") {
                let items = arg.as_list().expect("catch form is a list");
                if items.len() < 2 {
                    return Err(Diagnostic::lower(
                        "catch: expected (catch name body…)",
                        arg.pos().clone(),
                    ));
                }
                let param = self.lower_pattern(&items[1])?;
                let body = match slot {
                    Slot::Expr => self.body_block(&items[2..], arg.pos())?,
                    Slot::Stmt => self.stmt_block(&items[2..], arg.pos())?,
                };
                handler = Some(CatchClause {
                    param: Some(Box::new(param)),
                    body: Box::new(body),
                });
                continue;
            }
            if arg.is_form("finally") {
                let items = arg.as_list().expect("finally form is a list");
                finalizer = Some(Box::new(self.stmt_block(&items[1..], arg.pos())?));
                continue;
            }
            if handler.is_some() || finalizer.is_some() {
                return Err(Diagnostic::lower(
                    "try: body forms must precede catch/finally",
                    arg.pos().clone(),
                ));
            }
            body_forms.push(arg.clone());
        }

        let block = match slot {
            Slot::Expr => self.body_block(&body_forms, pos)?,
            Slot::Stmt => self.stmt_block(&body_forms, pos)?,
        };

        let node = IrNode::new(
            IrKind::Try {
                block: Box::new(block),
                handler,
                finalizer,
            },
            pos.clone(),
        );
        Ok(match slot {
            Slot::Stmt => node,
            Slot::Expr => self.iife(vec![node], pos),
        })
    }

    fn stmt_block(&mut self, forms: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let stmts: Result<Vec<IrNode>, Diagnostic> =
            forms.iter().map(|a| self.lower(a, Slot::Stmt)).collect();
        Ok(IrNode::block(stmts?, pos.clone()))
    }

    pub(crate) fn lower_await(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.len() != 1 {
            return Err(Diagnostic::lower("await: expected 1 argument", pos.clone()));
        }
        let value = self.lower(&args[0], Slot::Expr)?;
        Ok(IrNode::new(IrKind::Await(Box::new(value)), pos.clone()))
    }

    pub(crate) fn lower_yield(
        &mut self,
        args: &[Ast],
        delegate: bool,
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        let argument = match args.first() {
            Some(a) => Some(Box::new(self.lower(a, Slot::Expr)?)),
            None => None,
        };
        Ok(IrNode::new(IrKind::Yield { argument, delegate }, pos.clone()))
    }

    pub(crate) fn lower_new(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.is_empty() {
            return Err(Diagnostic::lower("new: expected a constructor", pos.clone()));
        }
        let callee = self.lower(&args[0], Slot::Expr)?;
        let ctor_args: Result<Vec<IrNode>, Diagnostic> = args[1..]
            .iter()
            .map(|a| self.lower(a, Slot::Expr))
            .collect();
        Ok(IrNode::new(
            IrKind::New {
                callee: Box::new(callee),
                args: ctor_args?,
            },
            pos.clone(),
        ))
    }

    pub(crate) fn lower_set(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        if args.len() != 2 {
            return Err(Diagnostic::lower(
                "set!: expected (set! target value)",
                pos.clone(),
            ));
        }
        let target = self.lower(&args[0], Slot::Expr)?;
        let value = self.lower(&args[1], Slot::Expr)?;
        Ok(IrNode::new(
            IrKind::Assignment {
                op: "=",
                target: Box::new(target),
                value: Box::new(value),
            },
            pos.clone(),
        ))
    }

    // ========================================================================
    // Imports and Exports
    // ========================================================================

    /// `(import [a, b as c] from "path")` or `(import ns from "path")`.
    /// Anything else is rejected the way the reader grammar promises.
    pub(crate) fn lower_import(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        let malformed = || {
            Diagnostic::parse(
                "import: expected (import [names…] from \"path\") or (import name from \"path\")",
                pos.clone(),
            )
        };

        if args.len() != 3 || args[1].as_symbol() != Some("from") {
            return Err(malformed());
        }
        let source = args[2].as_string_literal().ok_or_else(malformed)?.to_string();

        match &args[0] {
            Ast::Vector(v) => {
                let mut specifiers = Vec::new();
                let mut i = 0;
                while i < v.items.len() {
                    let imported = v.items[i].as_symbol().ok_or_else(malformed)?;
                    if v.items.get(i + 1).and_then(|a| a.as_symbol()) == Some("as") {
                        let alias = v.items.get(i + 2).and_then(|a| a.as_symbol()).ok_or_else(malformed)?;
                        specifiers.push(ImportSpecifier {
                            imported: ts_name(imported),
                            local: ts_name(alias),
                        });
                        i += 3;
                    } else {
                        specifiers.push(ImportSpecifier {
                            imported: ts_name(imported),
                            local: ts_name(imported),
                        });
                        i += 1;
                    }
                }
                Ok(IrNode::new(
                    IrKind::Import {
                        specifiers,
                        namespace: None,
                        source,
                    },
                    pos.clone(),
                ))
            }
            Ast::Symbol(s) => Ok(IrNode::new(
                IrKind::Import {
                    specifiers: Vec::new(),
                    namespace: Some(ts_name(&s.name)),
                    source,
                },
                pos.clone(),
            )),
            _ => Err(malformed()),
        }
    }

    pub(crate) fn lower_dynamic_import(
        &mut self,
        args: &[Ast],
        pos: &Position,
    ) -> Result<IrNode, Diagnostic> {
        if args.len() != 1 {
            return Err(Diagnostic::lower(
                "import-dynamic: expected a specifier expression",
                pos.clone(),
            ));
        }
        let source = self.lower(&args[0], Slot::Expr)?;
        Ok(IrNode::new(IrKind::DynamicImport(Box::new(source)), pos.clone()))
    }

    /// `(export [a b])` re-exports bindings; `(export "name" expr)`
    /// evaluates and binds
    pub(crate) fn lower_export(&mut self, args: &[Ast], pos: &Position) -> Result<IrNode, Diagnostic> {
        match args.first() {
            Some(Ast::Vector(v)) => {
                let mut names = Vec::new();
                let mut i = 0;
                while i < v.items.len() {
                    let local = v.items[i].as_symbol().ok_or_else(|| {
                        Diagnostic::lower("export: expected binding names", v.items[i].pos().clone())
                    })?;
                    if v.items.get(i + 1).and_then(|a| a.as_symbol()) == Some("as") {
                        let alias = v.items.get(i + 2).and_then(|a| a.as_symbol()).ok_or_else(|| {
                            Diagnostic::lower("export: expected alias after as", v.pos.clone())
                        })?;
                        self.record_export(ts_name(alias));
                        names.push((ts_name(local), Some(ts_name(alias))));
                        i += 3;
                    } else {
                        self.record_export(ts_name(local));
                        names.push((ts_name(local), None));
                        i += 1;
                    }
                }
                Ok(IrNode::new(IrKind::ExportNamed(names), pos.clone()))
            }
            Some(name_lit) if name_lit.as_string_literal().is_some() => {
                if args.len() != 2 {
                    return Err(Diagnostic::lower(
                        "export: expected (export \"name\" expr)",
                        pos.clone(),
                    ));
                }
                let name = ts_name(name_lit.as_string_literal().expect("checked above"));
                let value = self.lower(&args[1], Slot::Expr)?;
                self.record_export(name.clone());
                Ok(IrNode::new(
                    IrKind::ExportBinding {
                        name,
                        value: Box::new(value),
                    },
                    pos.clone(),
                ))
            }
            _ => Err(Diagnostic::parse(
                "export: expected (export [names…]) or (export \"name\" expr)",
                pos.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::lower_str;
    use crate::ir::{IrKind, VarKind};

    #[test]
    fn test_simple_binding() {
        let m = lower_str("(let x 1)");
        match &m.body[0].kind {
            IrKind::VariableDecl { kind, name, init, .. } => {
                assert_eq!(*kind, VarKind::Let);
                assert_eq!(name.identifier_name(), Some("x"));
                assert!(init.is_some());
            }
            other => panic!("expected variable decl, got {:?}", other),
        }
    }

    #[test]
    fn test_annotated_binding() {
        let m = lower_str("(let total: number 0)");
        match &m.body[0].kind {
            IrKind::VariableDecl { ty, .. } => assert!(ty.is_some()),
            other => panic!("expected variable decl, got {:?}", other),
        }
    }

    #[test]
    fn test_destructuring_with_rest() {
        let m = lower_str("(let [a b & rest] xs)");
        match &m.body[0].kind {
            IrKind::VariableDecl { name, .. } => match &name.kind {
                IrKind::ArrayPattern(elements) => {
                    assert_eq!(elements.len(), 3);
                    assert!(matches!(elements[2].kind, IrKind::RestElement(_)));
                }
                other => panic!("expected array pattern, got {:?}", other),
            },
            other => panic!("expected variable decl, got {:?}", other),
        }
    }

    #[test]
    fn test_map_destructuring() {
        let m = lower_str("(let {name :name age :age} person)");
        match &m.body[0].kind {
            IrKind::VariableDecl { name, .. } => match &name.kind {
                IrKind::ObjectPattern { props, .. } => {
                    assert_eq!(props.len(), 2);
                    assert_eq!(props[0].key, "name");
                }
                other => panic!("expected object pattern, got {:?}", other),
            },
            other => panic!("expected variable decl, got {:?}", other),
        }
    }

    #[test]
    fn test_named_fn_becomes_fn_decl() {
        let m = lower_str("(fn add [a b] (+ a b))");
        match &m.body[0].kind {
            IrKind::FnDecl { name, params, json_params, body, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(!json_params);
                match &body.kind {
                    IrKind::Block(stmts) => {
                        assert!(matches!(stmts.last().unwrap().kind, IrKind::Return(Some(_))));
                    }
                    other => panic!("expected block body, got {:?}", other),
                }
            }
            other => panic!("expected fn decl, got {:?}", other),
        }
    }

    #[test]
    fn test_param_defaults_and_types() {
        let m = lower_str("(fn greet [name: string (greeting \"hi\")] greeting)");
        match &m.body[0].kind {
            IrKind::FnDecl { params, .. } => {
                assert!(params[0].ty.is_some());
                assert!(params[0].default.is_none());
                assert!(params[1].default.is_some());
            }
            other => panic!("expected fn decl, got {:?}", other),
        }
    }

    #[test]
    fn test_json_map_params() {
        let m = lower_str("(fn config {host \"localhost\" port 8080} host)");
        match &m.body[0].kind {
            IrKind::FnDecl { json_params, params, .. } => {
                assert!(*json_params);
                assert_eq!(params.len(), 2);
                assert!(params.iter().all(|p| p.default.is_some()));
            }
            other => panic!("expected fn decl, got {:?}", other),
        }
    }

    #[test]
    fn test_anonymous_fn_is_expression() {
        let m = lower_str("(fn [x] x)");
        match &m.body[0].kind {
            IrKind::Function { uses_this, .. } => assert!(!uses_this),
            other => panic!("expected function expression, got {:?}", other),
        }
    }

    #[test]
    fn test_this_marks_uses_this() {
        let m = lower_str("(fn [] this.count)");
        match &m.body[0].kind {
            IrKind::Function { uses_this, .. } => assert!(uses_this),
            other => panic!("expected function expression, got {:?}", other),
        }
    }

    #[test]
    fn test_async_fn() {
        let m = lower_str("(async (fn fetch-all [] (await (get-data))))");
        match &m.body[0].kind {
            IrKind::FnDecl { is_async, .. } => assert!(is_async),
            other => panic!("expected fn decl, got {:?}", other),
        }
    }

    #[test]
    fn test_if_in_statement_and_expression_position() {
        let m = lower_str("(if a 1 2)");
        assert!(matches!(m.body[0].kind, IrKind::If { .. }));

        let m = lower_str("(let x (if a 1 2))");
        match &m.body[0].kind {
            IrKind::VariableDecl { init, .. } => {
                assert!(matches!(init.as_ref().unwrap().kind, IrKind::Conditional { .. }));
            }
            other => panic!("expected variable decl, got {:?}", other),
        }
    }

    #[test]
    fn test_do_in_expression_position_is_sequence() {
        let m = lower_str("(let y (do (let z 2) z))");
        match &m.body[0].kind {
            IrKind::VariableDecl { init, .. } => {
                assert!(matches!(init.as_ref().unwrap().kind, IrKind::Sequence(_)));
            }
            other => panic!("expected variable decl, got {:?}", other),
        }
    }

    #[test]
    fn test_for_uses_to_sequence_helper() {
        let m = lower_str("(for [x items] (use x))");
        match &m.body[0].kind {
            IrKind::ForOf { iterable, .. } => match &iterable.kind {
                IrKind::Call { callee, .. } => {
                    assert_eq!(callee.identifier_name(), Some("toSequence"));
                }
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected for-of, got {:?}", other),
        }
    }

    #[test]
    fn test_while_in_expr_position_wraps_in_iife() {
        let m = lower_str("(let r (while c (step)))");
        match &m.body[0].kind {
            IrKind::VariableDecl { init, .. } => {
                assert!(matches!(init.as_ref().unwrap().kind, IrKind::Call { .. }));
            }
            other => panic!("expected variable decl, got {:?}", other),
        }
    }

    #[test]
    fn test_try_catch_finally() {
        let m = lower_str("(try (risky) (catch e (handle e)) (finally (cleanup)))");
        match &m.body[0].kind {
            IrKind::Try { handler, finalizer, .. } => {
                assert!(handler.is_some());
                assert!(finalizer.is_some());
            }
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_named_import() {
        let m = lower_str("(import [parse, stringify as str] from \"./json.quill\")");
        match &m.body[0].kind {
            IrKind::Import { specifiers, source, namespace } => {
                assert_eq!(specifiers.len(), 2);
                assert_eq!(specifiers[1].imported, "stringify");
                assert_eq!(specifiers[1].local, "str");
                assert_eq!(source, "./json.quill");
                assert!(namespace.is_none());
            }
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_namespace_import() {
        let m = lower_str("(import util from \"./util.quill\")");
        match &m.body[0].kind {
            IrKind::Import { namespace, .. } => {
                assert_eq!(namespace.as_deref(), Some("util"));
            }
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_import_is_parse_error() {
        let forms = crate::reader::read_program("(import \"./a.quill\")", "t.quill").unwrap();
        let err = super::super::lower_module(&forms).unwrap_err();
        assert_eq!(err.kind(), crate::error::DiagnosticKind::Parse);
    }

    #[test]
    fn test_export_forms() {
        let m = lower_str("(fn f [] 1) (export [f])");
        assert_eq!(m.exports, vec!["f"]);

        let m = lower_str("(export \"answer\" 42)");
        assert_eq!(m.exports, vec!["answer"]);
        assert!(matches!(m.body[0].kind, IrKind::ExportBinding { .. }));
    }

    #[test]
    fn test_set_assignment() {
        let m = lower_str("(set! x 5)");
        match &m.body[0].kind {
            IrKind::Assignment { op, .. } => assert_eq!(*op, "="),
            other => panic!("expected assignment, got {:?}", other),
        }
    }
}
