// ABOUTME: IR-to-TypeScript emitter: text, source maps, precedence parens, hoisting

pub mod hoist;
pub mod precedence;
pub mod sourcemap;
pub mod types;

use crate::ast::Position;
use crate::config::CompilerOptions;
use crate::error::Diagnostic;
use crate::helpers;
use crate::ir::{
    ClassMethod, EnumVariant, IrKind, IrNode, MethodKind, ObjectProp, Param, PropKey,
};
use crate::lower::IrModule;
use hoist::{collect_scope_bindings, HoistedName};
use indexmap::IndexSet;
use precedence as prec;
use sourcemap::{Mapping, SourceMapBuilder};
use tracing::debug;
use types::render_type;

/// Everything the driver needs from one emitted module
#[derive(Debug)]
pub struct EmitOutput {
    pub code: String,
    pub map_json: String,
    pub mappings: Vec<Mapping>,
    pub used_helpers: Vec<String>,
}

/// Emit a compiled module as TypeScript text plus source map.
///
/// The helper import line is computed from a pre-scan so it can be the
/// first line without disturbing mapping offsets.
pub fn emit_module(
    module: &IrModule,
    source_file: &str,
    artifact_name: &str,
    options: &CompilerOptions,
) -> Result<EmitOutput, Diagnostic> {
    let mut emitter = Emitter::new(source_file);

    let used = collect_used_helpers(&module.body);
    if !used.is_empty() {
        let names: Vec<&str> = used.iter().map(|s| s.as_str()).collect();
        emitter.write(&format!(
            "import {{ {} }} from {};\n",
            names.join(", "),
            serde_json::to_string(&options.runtime_module).expect("path serializes")
        ));
        for name in &used {
            emitter.used_helpers.insert(name.clone());
        }
    }

    emitter.emit_scope(&module.body, true)?;

    let map_json = emitter.map.to_json(artifact_name);
    debug!(
        bytes = emitter.out.len(),
        mappings = emitter.map.mappings.len(),
        helpers = emitter.used_helpers.len(),
        "emitted module"
    );
    Ok(EmitOutput {
        code: emitter.out,
        map_json,
        mappings: emitter.map.mappings,
        used_helpers: emitter.used_helpers.into_iter().collect(),
    })
}

/// Identifiers from the helper roster referenced anywhere in the body,
/// plus helpers implied by interop nodes
fn collect_used_helpers(body: &[IrNode]) -> IndexSet<String> {
    fn walk(node: &IrNode, out: &mut IndexSet<String>) {
        if let IrKind::Identifier { name, .. } = &node.kind {
            if helpers::is_helper_identifier(name) {
                out.insert(name.clone());
            }
        }
        if let IrKind::InteropCall { .. } = &node.kind {
            out.insert("dynamicCall".to_string());
        }
        each_child(node, &mut |child| walk(child, out));
    }
    let mut out = IndexSet::new();
    for node in body {
        walk(node, &mut out);
    }
    out
}

/// Visit every direct child IR node
fn each_child(node: &IrNode, f: &mut dyn FnMut(&IrNode)) {
    use IrKind::*;
    match &node.kind {
        TemplateLit { exprs, .. } => exprs.iter().for_each(|e| f(e)),
        Binary { left, right, .. } | Logical { left, right, .. } => {
            f(left);
            f(right);
        }
        Unary { operand, .. } => f(operand),
        Conditional {
            test,
            consequent,
            alternate,
        } => {
            f(test);
            f(consequent);
            f(alternate);
        }
        Call { callee, args } | OptionalCall { callee, args } | New { callee, args } => {
            f(callee);
            args.iter().for_each(|a| f(a));
        }
        Member {
            object, property, ..
        } => {
            f(object);
            f(property);
        }
        ArrayLit(items) | Sequence(items) | Block(items) | ArrayPattern(items) => {
            items.iter().for_each(|i| f(i))
        }
        ObjectLit(props) => props.iter().for_each(|p| match p {
            ObjectProp::KeyValue { key, value } => {
                if let PropKey::Computed(k) = key {
                    f(k);
                }
                f(value);
            }
            ObjectProp::Shorthand(v) | ObjectProp::Spread(v) => f(v),
        }),
        Function { params, body, .. } => {
            params.iter().for_each(|p| {
                f(&p.pattern);
                if let Some(d) = &p.default {
                    f(d);
                }
            });
            f(body);
        }
        Assignment { target, value, .. } => {
            f(target);
            f(value);
        }
        Await(e) | Spread(e) | ExprStmt(e) | Throw(e) | DynamicImport(e) | RestElement(e) => f(e),
        Yield { argument, .. } => {
            if let Some(a) = argument {
                f(a);
            }
        }
        Return(v) => {
            if let Some(v) = v {
                f(v);
            }
        }
        If {
            test,
            consequent,
            alternate,
        } => {
            f(test);
            f(consequent);
            if let Some(a) = alternate {
                f(a);
            }
        }
        While { test, body } => {
            f(test);
            f(body);
        }
        For {
            init,
            test,
            update,
            body,
        } => {
            [init, test, update].iter().for_each(|x| {
                if let Some(x) = x {
                    f(x);
                }
            });
            f(body);
        }
        ForOf {
            binding,
            iterable,
            body,
            ..
        } => {
            f(binding);
            f(iterable);
            f(body);
        }
        Switch {
            discriminant,
            cases,
        } => {
            f(discriminant);
            for case in cases {
                if let Some(t) = &case.test {
                    f(t);
                }
                case.body.iter().for_each(|s| f(s));
            }
        }
        Labeled { body, .. } => f(body),
        Try {
            block,
            handler,
            finalizer,
        } => {
            f(block);
            if let Some(h) = handler {
                if let Some(p) = &h.param {
                    f(p);
                }
                f(&h.body);
            }
            if let Some(fin) = finalizer {
                f(fin);
            }
        }
        VariableDecl { name, init, .. } => {
            f(name);
            if let Some(i) = init {
                f(i);
            }
        }
        FunctionDecl { params, body, .. } | FnDecl { params, body, .. } => {
            params.iter().for_each(|p| {
                f(&p.pattern);
                if let Some(d) = &p.default {
                    f(d);
                }
            });
            f(body);
        }
        ClassDecl {
            superclass,
            fields,
            ctor,
            methods,
            ..
        } => {
            if let Some(s) = superclass {
                f(s);
            }
            for field in fields {
                if let Some(v) = &field.value {
                    f(v);
                }
            }
            if let Some(c) = ctor {
                c.params.iter().for_each(|p| {
                    f(&p.pattern);
                    if let Some(d) = &p.default {
                        f(d);
                    }
                });
                f(&c.body);
            }
            for m in methods {
                m.params.iter().for_each(|p| {
                    f(&p.pattern);
                    if let Some(d) = &p.default {
                        f(d);
                    }
                });
                f(&m.body);
            }
        }
        EnumDecl { variants, .. } => {
            for v in variants {
                if let Some(val) = &v.value {
                    f(val);
                }
            }
        }
        ExportDecl(d) => f(d),
        ExportBinding { value, .. } => f(value),
        ObjectPattern { props, rest } => {
            props.iter().for_each(|p| f(&p.value));
            if let Some(r) = rest {
                f(r);
            }
        }
        AssignmentPattern { target, default } => {
            f(target);
            f(default);
        }
        InteropGet { object, .. } => f(object),
        InteropCall { object, args, .. } => {
            f(object);
            args.iter().for_each(|a| f(a));
        }
        StringLit(_) | NumberLit(_) | BigIntLit(_) | BoolLit(_) | NullLit | Identifier { .. }
        | Import { .. } | ExportNamed(_) | TypeAlias { .. } | InterfaceDecl { .. }
        | Continue(_) | Break(_) | Raw(_) => {}
    }
}

struct Emitter {
    out: String,
    line: u32,
    column: u32,
    indent: usize,
    map: SourceMapBuilder,
    source_index: u32,
    used_helpers: IndexSet<String>,
}

impl Emitter {
    fn new(source_file: &str) -> Self {
        let mut map = SourceMapBuilder::new();
        let source_index = map.add_source(source_file);
        Emitter {
            out: String::new(),
            line: 0,
            column: 0,
            indent: 0,
            map,
            source_index,
            used_helpers: IndexSet::new(),
        }
    }

    fn write(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.out.push_str(text);
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.write("  ");
        }
    }

    /// Record a mapping at the current cursor pointing back at `pos`
    fn map_to(&mut self, pos: &Position, name: Option<&str>) {
        if pos.is_synthetic() {
            return;
        }
        let name_index = name.map(|n| self.map.name_index(n));
        self.map.add_mapping(Mapping {
            generated_line: self.line,
            generated_column: self.column,
            source_index: self.source_index,
            source_line: pos.line.saturating_sub(1),
            source_column: pos.column.saturating_sub(1),
            name_index,
        });
    }

    fn unknown(&self, node: &IrNode, context: &str) -> Diagnostic {
        Diagnostic::codegen(node.variant_name(), format!("cannot emit in {}", context))
    }

    // ========================================================================
    // Scopes and Statements
    // ========================================================================

    /// Emit a statement list with its hoisted `let` prelude.
    /// `top_level` controls whether type annotations ride the hoist.
    fn emit_scope(&mut self, stmts: &[IrNode], top_level: bool) -> Result<(), Diagnostic> {
        self.emit_scope_excluding(stmts, top_level, &[])
    }

    /// Function bodies exclude their parameter names from the hoist: a
    /// binding that shadows a parameter assigns the parameter slot
    fn emit_scope_excluding(
        &mut self,
        stmts: &[IrNode],
        top_level: bool,
        skip: &[String],
    ) -> Result<(), Diagnostic> {
        let mut hoisted = collect_scope_bindings(stmts);
        hoisted.retain(|h| !skip.contains(&h.name));
        if !hoisted.is_empty() {
            self.write_indent();
            self.write("let ");
            for (i, HoistedName { name, ty }) in hoisted.iter().enumerate() {
                if i > 0 {
                    self.write(", ");
                }
                self.write(name);
                if top_level {
                    if let Some(ty) = ty {
                        self.write(": ");
                        self.write(&render_type(ty));
                    }
                }
            }
            self.write(";\n");
        }
        for stmt in stmts {
            self.emit_stmt(stmt)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, node: &IrNode) -> Result<(), Diagnostic> {
        match &node.kind {
            IrKind::Block(stmts) => {
                self.write_indent();
                self.write("{\n");
                self.indent += 1;
                self.emit_scope(stmts, false)?;
                self.indent -= 1;
                self.write_indent();
                self.write("}\n");
            }
            IrKind::VariableDecl { name, init, .. } => {
                // The binding itself was hoisted; the site assigns
                let Some(init) = init else {
                    return Ok(());
                };
                self.write_indent();
                self.map_to(&node.pos, None);
                let needs_parens = matches!(name.kind, IrKind::ObjectPattern { .. });
                if needs_parens {
                    self.write("(");
                }
                self.emit_pattern(name)?;
                self.write(" = ");
                self.emit_expr(init, prec::ASSIGNMENT)?;
                if needs_parens {
                    self.write(")");
                }
                self.write(";\n");
            }
            IrKind::FnDecl { .. } | IrKind::FunctionDecl { .. } => {
                self.write_indent();
                self.emit_function_decl(node, false)?;
                self.write("\n");
            }
            IrKind::ClassDecl { .. } => {
                self.write_indent();
                self.emit_class(node, false)?;
                self.write("\n");
            }
            IrKind::EnumDecl { .. } => {
                self.write_indent();
                self.emit_enum(node, false)?;
                self.write("\n");
            }
            IrKind::TypeAlias {
                name,
                type_params,
                ty,
            } => {
                self.write_indent();
                self.map_to(&node.pos, Some(name));
                self.write("type ");
                self.write(name);
                self.emit_type_params(type_params);
                self.write(" = ");
                self.write(&render_type(ty));
                self.write(";\n");
            }
            IrKind::InterfaceDecl {
                name,
                type_params,
                extends,
                members,
            } => {
                self.write_indent();
                self.map_to(&node.pos, Some(name));
                self.write("interface ");
                self.write(name);
                self.emit_type_params(type_params);
                if !extends.is_empty() {
                    let rendered: Vec<String> = extends.iter().map(render_type).collect();
                    self.write(" extends ");
                    self.write(&rendered.join(", "));
                }
                self.write(" {\n");
                self.indent += 1;
                for m in members {
                    self.write_indent();
                    self.write(&m.name);
                    if m.optional {
                        self.write("?");
                    }
                    self.write(": ");
                    self.write(&render_type(&m.ty));
                    self.write(";\n");
                }
                self.indent -= 1;
                self.write_indent();
                self.write("}\n");
            }
            IrKind::Import {
                specifiers,
                namespace,
                source,
            } => {
                self.write_indent();
                self.map_to(&node.pos, None);
                let rewritten = rewrite_import_path(source);
                let path = serde_json::to_string(&rewritten).expect("path serializes");
                if let Some(ns) = namespace {
                    self.write(&format!("import * as {} from {};\n", ns, path));
                } else {
                    let parts: Vec<String> = specifiers
                        .iter()
                        .map(|s| {
                            if s.imported == s.local {
                                s.imported.clone()
                            } else {
                                format!("{} as {}", s.imported, s.local)
                            }
                        })
                        .collect();
                    self.write(&format!("import {{ {} }} from {};\n", parts.join(", "), path));
                }
            }
            IrKind::ExportNamed(names) => {
                self.write_indent();
                self.map_to(&node.pos, None);
                let parts: Vec<String> = names
                    .iter()
                    .map(|(local, alias)| match alias {
                        Some(a) => format!("{} as {}", local, a),
                        None => local.clone(),
                    })
                    .collect();
                self.write(&format!("export {{ {} }};\n", parts.join(", ")));
            }
            IrKind::ExportDecl(decl) => {
                self.write_indent();
                self.write("export ");
                match &decl.kind {
                    IrKind::FnDecl { .. } | IrKind::FunctionDecl { .. } => {
                        self.emit_function_decl(decl, false)?
                    }
                    IrKind::ClassDecl { .. } => self.emit_class(decl, false)?,
                    IrKind::EnumDecl { .. } => self.emit_enum(decl, false)?,
                    _ => return Err(self.unknown(decl, "export declaration")),
                }
                self.write("\n");
            }
            IrKind::ExportBinding { name, value } => {
                self.write_indent();
                self.map_to(&node.pos, Some(name));
                self.write("export const ");
                self.write(name);
                self.write(" = ");
                self.emit_expr(value, prec::ASSIGNMENT)?;
                self.write(";\n");
            }
            IrKind::Return(value) => {
                self.write_indent();
                self.map_to(&node.pos, None);
                match value {
                    Some(v) => {
                        self.write("return ");
                        self.emit_expr(v, prec::COMMA)?;
                        self.write(";\n");
                    }
                    None => self.write("return;\n"),
                }
            }
            IrKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.write_indent();
                self.map_to(&node.pos, None);
                self.write("if (");
                self.emit_expr(test, prec::COMMA)?;
                self.write(") ");
                self.emit_branch(consequent)?;
                if let Some(alt) = alternate {
                    self.write_indent();
                    self.write("else ");
                    if matches!(alt.kind, IrKind::If { .. }) {
                        // Inline `else if` without re-indenting
                        self.emit_nested_if(alt)?;
                    } else {
                        self.emit_branch(alt)?;
                    }
                }
            }
            IrKind::While { test, body } => {
                self.write_indent();
                self.map_to(&node.pos, None);
                self.write("while (");
                self.emit_expr(test, prec::COMMA)?;
                self.write(") ");
                self.emit_branch(body)?;
            }
            IrKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.write_indent();
                self.map_to(&node.pos, None);
                self.write("for (");
                if let Some(i) = init {
                    self.emit_expr(i, prec::COMMA)?;
                }
                self.write("; ");
                if let Some(t) = test {
                    self.emit_expr(t, prec::COMMA)?;
                }
                self.write("; ");
                if let Some(u) = update {
                    self.emit_expr(u, prec::COMMA)?;
                }
                self.write(") ");
                self.emit_branch(body)?;
            }
            IrKind::ForOf {
                kind,
                binding,
                iterable,
                body,
            } => {
                self.write_indent();
                self.map_to(&node.pos, None);
                self.write("for (");
                self.write(kind.keyword());
                self.write(" ");
                self.emit_pattern(binding)?;
                self.write(" of ");
                self.emit_expr(iterable, prec::ASSIGNMENT)?;
                self.write(") ");
                self.emit_branch(body)?;
            }
            IrKind::Switch {
                discriminant,
                cases,
            } => {
                self.write_indent();
                self.map_to(&node.pos, None);
                self.write("switch (");
                self.emit_expr(discriminant, prec::COMMA)?;
                self.write(") {\n");
                self.indent += 1;
                for case in cases {
                    self.write_indent();
                    match &case.test {
                        Some(t) => {
                            self.write("case ");
                            self.emit_expr(t, prec::COMMA)?;
                            self.write(":\n");
                        }
                        None => self.write("default:\n"),
                    }
                    self.indent += 1;
                    for stmt in &case.body {
                        self.emit_stmt(stmt)?;
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.write_indent();
                self.write("}\n");
            }
            IrKind::Labeled { label, body } => {
                self.write_indent();
                self.write(label);
                self.write(": ");
                self.emit_branch(body)?;
            }
            IrKind::Throw(value) => {
                self.write_indent();
                self.map_to(&node.pos, None);
                self.write("throw ");
                self.emit_expr(value, prec::COMMA)?;
                self.write(";\n");
            }
            IrKind::Try {
                block,
                handler,
                finalizer,
            } => {
                self.write_indent();
                self.map_to(&node.pos, None);
                self.write("try ");
                self.emit_branch(block)?;
                if let Some(h) = handler {
                    self.write_indent();
                    self.write("catch (");
                    match &h.param {
                        Some(p) => self.emit_pattern(p)?,
                        None => self.write("_err"),
                    }
                    self.write(") ");
                    self.emit_branch(&h.body)?;
                }
                if let Some(fin) = finalizer {
                    self.write_indent();
                    self.write("finally ");
                    self.emit_branch(fin)?;
                }
            }
            IrKind::Continue(label) => {
                self.write_indent();
                self.map_to(&node.pos, None);
                match label {
                    Some(l) => self.write(&format!("continue {};\n", l)),
                    None => self.write("continue;\n"),
                }
            }
            IrKind::Break(label) => {
                self.write_indent();
                self.map_to(&node.pos, None);
                match label {
                    Some(l) => self.write(&format!("break {};\n", l)),
                    None => self.write("break;\n"),
                }
            }
            IrKind::ExprStmt(e) => self.emit_expression_statement(e)?,
            IrKind::Raw(_) => return Err(self.unknown(node, "statement position")),
            // Bare expressions in statement position
            _ => self.emit_expression_statement(node)?,
        }
        Ok(())
    }

    /// Branch body of if/while/for/try: always braced
    fn emit_branch(&mut self, body: &IrNode) -> Result<(), Diagnostic> {
        match &body.kind {
            IrKind::Block(stmts) => {
                self.write("{\n");
                self.indent += 1;
                self.emit_scope(stmts, false)?;
                self.indent -= 1;
                self.write_indent();
                self.write("}\n");
            }
            _ => {
                self.write("{\n");
                self.indent += 1;
                self.emit_stmt(body)?;
                self.indent -= 1;
                self.write_indent();
                self.write("}\n");
            }
        }
        Ok(())
    }

    fn emit_nested_if(&mut self, node: &IrNode) -> Result<(), Diagnostic> {
        let IrKind::If {
            test,
            consequent,
            alternate,
        } = &node.kind
        else {
            return Err(self.unknown(node, "else-if chain"));
        };
        self.write("if (");
        self.emit_expr(test, prec::COMMA)?;
        self.write(") ");
        self.emit_branch(consequent)?;
        if let Some(alt) = alternate {
            self.write_indent();
            self.write("else ");
            if matches!(alt.kind, IrKind::If { .. }) {
                self.emit_nested_if(alt)?;
            } else {
                self.emit_branch(alt)?;
            }
        }
        Ok(())
    }

    fn emit_expression_statement(&mut self, expr: &IrNode) -> Result<(), Diagnostic> {
        self.write_indent();
        self.map_to(&expr.pos, None);
        // A statement cannot open with `{` or `function`
        let needs_parens = matches!(
            expr.kind,
            IrKind::ObjectLit(_) | IrKind::Function { .. } | IrKind::Sequence(_)
        );
        if needs_parens {
            self.write("(");
        }
        self.emit_expr(expr, prec::COMMA)?;
        if needs_parens {
            self.write(")");
        }
        self.write(";\n");
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn own_precedence(&self, node: &IrNode) -> u8 {
        match &node.kind {
            IrKind::Sequence(_) => prec::COMMA,
            IrKind::Assignment { .. }
            | IrKind::Function { .. }
            | IrKind::Yield { .. }
            | IrKind::VariableDecl { .. }
            | IrKind::FnDecl { .. }
            | IrKind::FunctionDecl { .. }
            | IrKind::ClassDecl { .. }
            | IrKind::EnumDecl { .. } => prec::ASSIGNMENT,
            IrKind::Conditional { .. } => prec::CONDITIONAL,
            IrKind::Logical { op, .. } => prec::logical(op),
            IrKind::Binary { op, .. } => prec::binary(op),
            IrKind::Unary { .. } | IrKind::Await(_) => prec::UNARY,
            IrKind::Call { .. }
            | IrKind::OptionalCall { .. }
            | IrKind::New { .. }
            | IrKind::InteropCall { .. }
            | IrKind::InteropGet { .. }
            | IrKind::DynamicImport(_) => prec::CALL,
            IrKind::Member { .. } => prec::MEMBER,
            _ => prec::PRIMARY,
        }
    }

    /// Emit an expression, parenthesizing when its own precedence binds
    /// looser than the context requires. Hoisted declarations arrive
    /// pre-parenthesized from their emitters and are never double-wrapped.
    fn emit_expr(&mut self, node: &IrNode, min_prec: u8) -> Result<(), Diagnostic> {
        let own = self.own_precedence(node);
        let pre_parenthesized = matches!(
            node.kind,
            IrKind::VariableDecl { .. }
                | IrKind::FnDecl { .. }
                | IrKind::FunctionDecl { .. }
                | IrKind::ClassDecl { .. }
                | IrKind::EnumDecl { .. }
        );
        if own < min_prec && !pre_parenthesized {
            self.write("(");
            self.emit_expr_inner(node)?;
            self.write(")");
        } else {
            self.emit_expr_inner(node)?;
        }
        Ok(())
    }

    fn emit_expr_inner(&mut self, node: &IrNode) -> Result<(), Diagnostic> {
        match &node.kind {
            IrKind::StringLit(s) => {
                self.map_to(&node.pos, None);
                self.write(&serde_json::to_string(s).expect("string serializes"));
            }
            IrKind::NumberLit(n) => {
                self.map_to(&node.pos, None);
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    self.write(&format!("{}", *n as i64));
                } else {
                    self.write(&format!("{}", n));
                }
            }
            IrKind::BigIntLit(digits) => {
                self.map_to(&node.pos, None);
                self.write(digits);
                self.write("n");
            }
            IrKind::BoolLit(b) => {
                self.map_to(&node.pos, None);
                self.write(if *b { "true" } else { "false" });
            }
            IrKind::NullLit => {
                self.map_to(&node.pos, None);
                self.write("null");
            }
            IrKind::TemplateLit { quasis, exprs } => {
                self.map_to(&node.pos, None);
                self.write("`");
                for (i, quasi) in quasis.iter().enumerate() {
                    self.write(&escape_template(quasi));
                    if i < exprs.len() {
                        self.write("${");
                        self.emit_expr(&exprs[i], prec::COMMA)?;
                        self.write("}");
                    }
                }
                self.write("`");
            }
            IrKind::Identifier { name, original, .. } => {
                self.map_to(&node.pos, original.as_deref().or(Some(name)));
                if helpers::is_helper_identifier(name) {
                    self.used_helpers.insert(name.clone());
                }
                self.write(name);
            }
            IrKind::Binary { op, left, right } => {
                let level = prec::binary(op);
                let right_assoc = prec::is_right_associative(op);
                let (left_min, right_min) = if right_assoc {
                    (level + 1, level)
                } else {
                    (level, level + 1)
                };
                self.emit_expr(left, left_min)?;
                self.write(" ");
                self.write(op);
                self.write(" ");
                self.emit_expr(right, right_min)?;
            }
            IrKind::Logical { op, left, right } => {
                let level = prec::logical(op);
                self.emit_expr(left, level)?;
                self.write(" ");
                self.write(op);
                self.write(" ");
                self.emit_expr(right, level + 1)?;
            }
            IrKind::Unary { op, operand } => {
                self.map_to(&node.pos, None);
                self.write(op);
                if op.chars().all(|c| c.is_ascii_alphabetic()) {
                    self.write(" ");
                }
                // `- -x` must not fuse into a decrement
                let negative_operand = *op == "-"
                    && match &operand.kind {
                        IrKind::Unary { op: inner, .. } => *inner == "-",
                        IrKind::NumberLit(n) => *n < 0.0,
                        _ => false,
                    };
                if negative_operand {
                    self.write("(");
                    self.emit_expr_inner(operand)?;
                    self.write(")");
                } else {
                    self.emit_expr(operand, prec::UNARY)?;
                }
            }
            IrKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.emit_expr(test, prec::CONDITIONAL + 1)?;
                self.write(" ? ");
                self.emit_expr(consequent, prec::ASSIGNMENT)?;
                self.write(" : ");
                self.emit_expr(alternate, prec::ASSIGNMENT)?;
            }
            IrKind::Call { callee, args } => {
                self.emit_expr(callee, prec::CALL)?;
                self.write("(");
                self.emit_args(args)?;
                self.write(")");
            }
            IrKind::OptionalCall { callee, args } => {
                self.emit_expr(callee, prec::CALL)?;
                self.write("?.(");
                self.emit_args(args)?;
                self.write(")");
            }
            IrKind::New { callee, args } => {
                self.map_to(&node.pos, None);
                self.write("new ");
                self.emit_expr(callee, prec::MEMBER)?;
                self.write("(");
                self.emit_args(args)?;
                self.write(")");
            }
            IrKind::Member {
                object,
                property,
                computed,
                optional,
            } => {
                // Literal receivers would fuse with the dot
                if matches!(object.kind, IrKind::NumberLit(_)) {
                    self.write("(");
                    self.emit_expr_inner(object)?;
                    self.write(")");
                } else {
                    self.emit_expr(object, prec::MEMBER)?;
                }
                if *computed {
                    self.write(if *optional { "?.[" } else { "[" });
                    self.emit_expr(property, prec::COMMA)?;
                    self.write("]");
                } else {
                    let name = property.identifier_name().unwrap_or_default().to_string();
                    if is_valid_identifier(&name) {
                        self.write(if *optional { "?." } else { "." });
                        self.map_to(&property.pos, Some(&name));
                        self.write(&name);
                    } else {
                        self.write(if *optional { "?.[" } else { "[" });
                        self.write(&serde_json::to_string(&name).expect("key serializes"));
                        self.write("]");
                    }
                }
            }
            IrKind::ArrayLit(items) => {
                self.map_to(&node.pos, None);
                self.write("[");
                self.emit_args(items)?;
                self.write("]");
            }
            IrKind::Sequence(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.emit_expr(e, prec::ASSIGNMENT)?;
                }
            }
            IrKind::ObjectLit(props) => {
                self.map_to(&node.pos, None);
                self.write("{ ");
                for (i, p) in props.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    match p {
                        ObjectProp::KeyValue { key, value } => {
                            match key {
                                PropKey::Ident(k) if is_valid_identifier(k) => self.write(k),
                                PropKey::Ident(k) => {
                                    self.write(&serde_json::to_string(k).expect("key serializes"))
                                }
                                PropKey::Computed(k) => {
                                    self.write("[");
                                    self.emit_expr(k, prec::COMMA)?;
                                    self.write("]");
                                }
                            }
                            self.write(": ");
                            self.emit_expr(value, prec::ASSIGNMENT)?;
                        }
                        ObjectProp::Shorthand(v) => self.emit_expr(v, prec::ASSIGNMENT)?,
                        ObjectProp::Spread(v) => {
                            self.write("...");
                            self.emit_expr(v, prec::ASSIGNMENT)?;
                        }
                    }
                }
                self.write(" }");
            }
            IrKind::Function { .. } => self.emit_function_expr(node)?,
            IrKind::Assignment { op, target, value } => {
                let needs_parens = matches!(target.kind, IrKind::ObjectPattern { .. });
                if needs_parens {
                    self.write("(");
                }
                self.emit_pattern_or_expr(target)?;
                self.write(" ");
                self.write(op);
                self.write(" ");
                self.emit_expr(value, prec::ASSIGNMENT)?;
                if needs_parens {
                    self.write(")");
                }
            }
            IrKind::Await(e) => {
                self.map_to(&node.pos, None);
                self.write("await ");
                self.emit_expr(e, prec::UNARY)?;
            }
            IrKind::Yield { argument, delegate } => {
                self.map_to(&node.pos, None);
                self.write(if *delegate { "yield* " } else { "yield" });
                if let Some(a) = argument {
                    if !*delegate {
                        self.write(" ");
                    }
                    self.emit_expr(a, prec::ASSIGNMENT)?;
                }
            }
            IrKind::Spread(e) => {
                self.write("...");
                self.emit_expr(e, prec::ASSIGNMENT)?;
            }
            IrKind::DynamicImport(source) => {
                self.map_to(&node.pos, None);
                self.write("import(");
                self.emit_expr(source, prec::ASSIGNMENT)?;
                self.write(")");
            }
            // Declarations reached in expression position were hoisted;
            // they emit as named assignment expressions
            IrKind::VariableDecl { name, init, .. } => {
                self.map_to(&node.pos, None);
                self.write("(");
                self.emit_pattern(name)?;
                self.write(" = ");
                match init {
                    Some(i) => self.emit_expr(i, prec::ASSIGNMENT)?,
                    None => self.write("undefined"),
                }
                self.write(")");
            }
            IrKind::FnDecl { .. } | IrKind::FunctionDecl { .. } => {
                self.emit_function_decl(node, true)?;
            }
            IrKind::ClassDecl { .. } => self.emit_class(node, true)?,
            IrKind::EnumDecl { .. } => self.emit_enum(node, true)?,
            IrKind::Throw(value) => {
                // Expression-position throw becomes an immediately
                // invoked arrow that throws
                self.write("(() => { throw ");
                self.emit_expr(value, prec::COMMA)?;
                self.write("; })()");
            }
            IrKind::InteropGet { object, property } => {
                // Two-path read: zero-arg method or plain property, with
                // the receiver evaluated exactly once
                let access = if is_valid_identifier(property) {
                    format!("o.{}", property)
                } else {
                    format!("o[{}]", serde_json::to_string(property).expect("key serializes"))
                };
                self.map_to(&node.pos, None);
                self.write(&format!(
                    "((o) => typeof {access} === \"function\" ? {access}() : {access})(",
                    access = access
                ));
                self.emit_expr(object, prec::ASSIGNMENT)?;
                self.write(")");
            }
            IrKind::InteropCall {
                object,
                method,
                args,
            } => {
                self.map_to(&node.pos, None);
                self.used_helpers.insert("dynamicCall".to_string());
                self.write("dynamicCall(");
                self.emit_expr(object, prec::ASSIGNMENT)?;
                self.write(", ");
                self.write(&serde_json::to_string(method).expect("method serializes"));
                self.write(", [");
                self.emit_args(args)?;
                self.write("], ");
                let at = format!("{}", node.pos);
                self.write(&serde_json::to_string(&at).expect("position serializes"));
                self.write(")");
            }
            IrKind::ArrayPattern(_) | IrKind::ObjectPattern { .. } => {
                // Destructuring assignment targets produced by the
                // optimizer's rebind step
                self.emit_pattern(node)?;
            }
            IrKind::Raw(_) => return Err(self.unknown(node, "expression position")),
            _ => return Err(self.unknown(node, "expression position")),
        }
        Ok(())
    }

    fn emit_args(&mut self, args: &[IrNode]) -> Result<(), Diagnostic> {
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.emit_expr(a, prec::ASSIGNMENT)?;
        }
        Ok(())
    }

    fn emit_pattern_or_expr(&mut self, node: &IrNode) -> Result<(), Diagnostic> {
        match node.kind {
            IrKind::ArrayPattern(_)
            | IrKind::ObjectPattern { .. }
            | IrKind::RestElement(_)
            | IrKind::AssignmentPattern { .. } => self.emit_pattern(node),
            _ => self.emit_expr(node, prec::POSTFIX),
        }
    }

    // ========================================================================
    // Patterns
    // ========================================================================

    fn emit_pattern(&mut self, node: &IrNode) -> Result<(), Diagnostic> {
        match &node.kind {
            IrKind::Identifier { name, original, .. } => {
                self.map_to(&node.pos, original.as_deref().or(Some(name)));
                self.write(name);
            }
            IrKind::ArrayPattern(elements) => {
                self.write("[");
                for (i, el) in elements.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.emit_pattern(el)?;
                }
                self.write("]");
            }
            IrKind::ObjectPattern { props, rest } => {
                self.write("{ ");
                for (i, p) in props.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    let shorthand = p.value.identifier_name() == Some(p.key.as_str());
                    if shorthand {
                        self.emit_pattern(&p.value)?;
                    } else {
                        if is_valid_identifier(&p.key) {
                            self.write(&p.key);
                        } else {
                            self.write(&serde_json::to_string(&p.key).expect("key serializes"));
                        }
                        self.write(": ");
                        self.emit_pattern(&p.value)?;
                    }
                }
                if let Some(r) = rest {
                    if !props.is_empty() {
                        self.write(", ");
                    }
                    self.write("...");
                    self.emit_pattern(r)?;
                }
                self.write(" }");
            }
            IrKind::RestElement(inner) => {
                self.write("...");
                self.emit_pattern(inner)?;
            }
            IrKind::AssignmentPattern { target, default } => {
                self.emit_pattern(target)?;
                self.write(" = ");
                self.emit_expr(default, prec::ASSIGNMENT)?;
            }
            _ => return Err(self.unknown(node, "binding pattern")),
        }
        Ok(())
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn emit_params(&mut self, params: &[Param], annotate: bool) -> Result<(), Diagnostic> {
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.emit_pattern(&p.pattern)?;
            if let Some(ty) = &p.ty {
                self.write(": ");
                self.write(&render_type(ty));
            } else if annotate && !matches!(p.pattern.kind, IrKind::RestElement(_)) {
                self.write(": any");
            }
            if let Some(d) = &p.default {
                self.write(" = ");
                self.emit_expr(d, prec::ASSIGNMENT)?;
            }
        }
        Ok(())
    }

    /// `function name(…)` declarations; in expression context the whole
    /// thing becomes `(name = function name(…) { … })` so the debugger
    /// name survives hoisting
    fn emit_function_decl(&mut self, node: &IrNode, expr_ctx: bool) -> Result<(), Diagnostic> {
        let (name, params, json_params, body, is_async, return_type) = match &node.kind {
            IrKind::FnDecl {
                name,
                params,
                json_params,
                body,
                is_async,
                return_type,
            } => (name, params, *json_params, body, *is_async, return_type),
            IrKind::FunctionDecl {
                name,
                params,
                body,
                is_async,
                return_type,
            } => (name, params, false, body, *is_async, return_type),
            _ => return Err(self.unknown(node, "function declaration")),
        };

        self.map_to(&node.pos, Some(name));
        if expr_ctx {
            self.write("(");
            self.write(name);
            self.write(" = ");
        }
        if is_async {
            self.write("async ");
        }
        self.write("function ");
        self.write(name);
        self.write("(");
        if json_params {
            self.write("options: any = {}");
        } else {
            self.emit_params(params, true)?;
        }
        self.write(")");
        let ret = return_type
            .as_ref()
            .map(render_type)
            .unwrap_or_else(|| "any".to_string());
        self.write(&format!(": {} ", ret));
        self.write("{\n");
        self.indent += 1;
        if json_params {
            self.emit_json_params_prelude(name, params)?;
        }
        let mut bound = param_binding_names(params);
        if json_params {
            bound.push("options".to_string());
        }
        match &body.kind {
            IrKind::Block(stmts) => self.emit_scope_excluding(stmts, false, &bound)?,
            _ => self.emit_stmt(body)?,
        }
        self.indent -= 1;
        self.write_indent();
        self.write("}");
        if expr_ctx {
            self.write(")");
        }
        Ok(())
    }

    /// Keyword-style parameters destructure a guarded options object
    fn emit_json_params_prelude(&mut self, fn_name: &str, params: &[Param]) -> Result<(), Diagnostic> {
        self.write_indent();
        self.write("if (typeof options !== \"object\" || options === null) {\n");
        self.indent += 1;
        self.write_indent();
        self.write(&format!(
            "throw new TypeError({});\n",
            serde_json::to_string(&format!("{}: expected an options object", fn_name))
                .expect("message serializes")
        ));
        self.indent -= 1;
        self.write_indent();
        self.write("}\n");
        self.write_indent();
        self.write("const { ");
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.emit_pattern(&p.pattern)?;
            if let Some(d) = &p.default {
                self.write(" = ");
                self.emit_expr(d, prec::ASSIGNMENT)?;
            }
        }
        self.write(" } = options;\n");
        Ok(())
    }

    fn emit_function_expr(&mut self, node: &IrNode) -> Result<(), Diagnostic> {
        let IrKind::Function {
            name,
            params,
            body,
            uses_this,
            is_async,
            is_generator,
            ..
        } = &node.kind
        else {
            return Err(self.unknown(node, "function expression"));
        };

        self.map_to(&node.pos, name.as_deref());
        if *uses_this || name.is_some() || *is_generator {
            if *is_async {
                self.write("async ");
            }
            self.write("function");
            if *is_generator {
                self.write("*");
            }
            if let Some(n) = name {
                self.write(" ");
                self.write(n);
            }
            self.write("(");
            self.emit_params(params, false)?;
            self.write(") {\n");
            self.indent += 1;
            let bound = param_binding_names(params);
            match &body.kind {
                IrKind::Block(stmts) => self.emit_scope_excluding(stmts, false, &bound)?,
                _ => self.emit_stmt(body)?,
            }
            self.indent -= 1;
            self.write_indent();
            self.write("}");
            return Ok(());
        }

        // Arrow form; single-return bodies emit concisely
        if *is_async {
            self.write("async ");
        }
        self.write("(");
        self.emit_params(params, false)?;
        self.write(") => ");
        if let IrKind::Block(stmts) = &body.kind {
            if let [only] = stmts.as_slice() {
                if let IrKind::Return(Some(value)) = &only.kind {
                    let wrap = matches!(value.kind, IrKind::ObjectLit(_) | IrKind::Sequence(_));
                    if wrap {
                        self.write("(");
                        self.emit_expr_inner(value)?;
                        self.write(")");
                    } else {
                        self.emit_expr(value, prec::ASSIGNMENT)?;
                    }
                    return Ok(());
                }
            }
            self.write("{\n");
            self.indent += 1;
            let bound = param_binding_names(params);
            self.emit_scope_excluding(stmts, false, &bound)?;
            self.indent -= 1;
            self.write_indent();
            self.write("}");
            return Ok(());
        }
        self.emit_stmt(body)
    }

    // ========================================================================
    // Classes and Enums
    // ========================================================================

    fn emit_class(&mut self, node: &IrNode, expr_ctx: bool) -> Result<(), Diagnostic> {
        let IrKind::ClassDecl {
            name,
            superclass,
            fields,
            ctor,
            methods,
        } = &node.kind
        else {
            return Err(self.unknown(node, "class declaration"));
        };

        self.map_to(&node.pos, Some(name));
        if expr_ctx {
            self.write("(");
            self.write(name);
            self.write(" = ");
        }
        self.write("class ");
        self.write(name);
        if let Some(sup) = superclass {
            self.write(" extends ");
            self.emit_expr(sup, prec::MEMBER)?;
        }
        self.write(" {\n");
        self.indent += 1;

        for field in fields {
            self.write_indent();
            if field.is_static {
                self.write("static ");
            }
            self.write(&field.name);
            if let Some(ty) = &field.ty {
                self.write(": ");
                self.write(&render_type(ty));
            }
            if let Some(v) = &field.value {
                self.write(" = ");
                self.emit_expr(v, prec::ASSIGNMENT)?;
            }
            self.write(";\n");
        }

        if let Some(c) = ctor {
            self.write_indent();
            self.write("constructor(");
            self.emit_params(&c.params, false)?;
            self.write(") {\n");
            self.indent += 1;
            let bound = param_binding_names(&c.params);
            match &c.body.kind {
                IrKind::Block(stmts) => self.emit_scope_excluding(stmts, false, &bound)?,
                _ => self.emit_stmt(&c.body)?,
            }
            self.indent -= 1;
            self.write_indent();
            self.write("}\n");
        }

        for m in methods {
            self.emit_method(m)?;
        }

        self.indent -= 1;
        self.write_indent();
        self.write("}");
        if expr_ctx {
            self.write(")");
        }
        Ok(())
    }

    fn emit_method(&mut self, m: &ClassMethod) -> Result<(), Diagnostic> {
        self.write_indent();
        if m.is_static {
            self.write("static ");
        }
        if m.is_async {
            self.write("async ");
        }
        match m.kind {
            MethodKind::Getter => self.write("get "),
            MethodKind::Setter => self.write("set "),
            MethodKind::Method => {}
        }
        self.write(&m.name);
        self.write("(");
        self.emit_params(&m.params, false)?;
        self.write(") {\n");
        self.indent += 1;
        let bound = param_binding_names(&m.params);
        match &m.body.kind {
            IrKind::Block(stmts) => self.emit_scope_excluding(stmts, false, &bound)?,
            _ => self.emit_stmt(&m.body)?,
        }
        self.indent -= 1;
        self.write_indent();
        self.write("}\n");
        Ok(())
    }

    /// Enums without associated values freeze a plain object; cases with
    /// fields turn the enum into a class with one static factory per case
    fn emit_enum(&mut self, node: &IrNode, expr_ctx: bool) -> Result<(), Diagnostic> {
        let IrKind::EnumDecl { name, variants } = &node.kind else {
            return Err(self.unknown(node, "enum declaration"));
        };
        let has_associated = variants.iter().any(|v| v.fields.is_some());

        self.map_to(&node.pos, Some(name));
        if has_associated {
            if expr_ctx {
                self.write("(");
                self.write(name);
                self.write(" = ");
            }
            self.emit_enum_class(name, variants)?;
            if expr_ctx {
                self.write(")");
            }
            return Ok(());
        }

        if expr_ctx {
            self.write("(");
            self.write(name);
            self.write(" = Object.freeze({ ");
        } else {
            self.write("const ");
            self.write(name);
            self.write(" = Object.freeze({ ");
        }
        for (i, v) in variants.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.write(&v.name);
            self.write(": ");
            match &v.value {
                Some(value) => self.emit_expr(value, prec::ASSIGNMENT)?,
                None => self.write(&serde_json::to_string(&v.name).expect("name serializes")),
            }
        }
        self.write(" })");
        if expr_ctx {
            self.write(")");
        } else {
            self.write(";");
        }
        Ok(())
    }

    fn emit_enum_class(&mut self, name: &str, variants: &[EnumVariant]) -> Result<(), Diagnostic> {
        self.write("class ");
        self.write(name);
        self.write(" {\n");
        self.indent += 1;

        self.write_indent();
        self.write("tag: string;\n");
        self.write_indent();
        self.write("constructor(tag: string, fields: any = {}) {\n");
        self.indent += 1;
        self.write_indent();
        self.write("this.tag = tag;\n");
        self.write_indent();
        self.write("Object.assign(this, fields);\n");
        self.indent -= 1;
        self.write_indent();
        self.write("}\n");

        for v in variants {
            self.write_indent();
            match &v.fields {
                Some(fields) => {
                    let args: Vec<String> = fields.iter().map(|f| format!("{}: any", f)).collect();
                    self.write(&format!(
                        "static {}({}): {} {{\n",
                        v.name,
                        args.join(", "),
                        name
                    ));
                    self.indent += 1;
                    self.write_indent();
                    self.write(&format!(
                        "return new {}({}, {{ {} }});\n",
                        name,
                        serde_json::to_string(&v.name).expect("name serializes"),
                        fields.join(", ")
                    ));
                    self.indent -= 1;
                    self.write_indent();
                    self.write("}\n");
                }
                None => {
                    self.write(&format!(
                        "static {} = new {}({});\n",
                        v.name,
                        name,
                        serde_json::to_string(&v.name).expect("name serializes")
                    ));
                }
            }
        }

        self.indent -= 1;
        self.write_indent();
        self.write("}");
        Ok(())
    }

    fn emit_type_params(&mut self, params: &[String]) {
        if !params.is_empty() {
            self.write("<");
            self.write(&params.join(", "));
            self.write(">");
        }
    }
}

/// Every name a parameter list binds, including through patterns
fn param_binding_names(params: &[Param]) -> Vec<String> {
    let mut names = Vec::new();
    for p in params {
        hoist::pattern_names(&p.pattern, &mut names);
    }
    names
}

/// Compiled artifacts import compiled artifacts
fn rewrite_import_path(source: &str) -> String {
    match source.strip_suffix(".quill") {
        Some(stem) => format!("{}.ts", stem),
        None => source.to_string(),
    }
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c == '$' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
}

fn escape_template(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => out.push_str("\\`"),
            '\\' => out.push_str("\\\\"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower_module;
    use crate::optimize::optimize_module;
    use crate::reader::read_program;

    pub(crate) fn emit_str(text: &str) -> EmitOutput {
        let forms = read_program(text, "test.quill").expect("parse");
        let module = lower_module(&forms).expect("lower");
        let module = optimize_module(module);
        let options = CompilerOptions::default();
        emit_module(&module, "test.quill", "test.ts", &options).expect("emit")
    }

    #[test]
    fn test_simple_function_with_inferred_signature() {
        let out = emit_str("(fn add [a b] (+ a b)) (add 2 3)");
        assert!(out.code.contains("function add(a: any, b: any): any {"), "{}", out.code);
        assert!(out.code.contains("return a + b;"), "{}", out.code);
        assert!(out.code.contains("add(2, 3);"), "{}", out.code);
    }

    #[test]
    fn test_hoisting_expression_declarations() {
        let out = emit_str("(let x 3) (let y (+ 1 (let z 2) z)) y");
        assert!(out.code.contains("let x, y, z;"), "{}", out.code);
        assert!(out.code.contains("x = 3;"), "{}", out.code);
        assert!(out.code.contains("(z = 2)"), "{}", out.code);
    }

    #[test]
    fn test_precedence_parens() {
        let out = emit_str("(* (+ 1 2) 3)");
        assert!(out.code.contains("(1 + 2) * 3"), "{}", out.code);

        let out = emit_str("(+ 1 (* 2 3))");
        assert!(out.code.contains("1 + 2 * 3"), "{}", out.code);
    }

    #[test]
    fn test_exponent_right_associativity() {
        let out = emit_str("(** (** a b) c)");
        assert!(out.code.contains("(a ** b) ** c"), "{}", out.code);

        let out = emit_str("(** a (** b c))");
        assert!(out.code.contains("a ** b ** c"), "{}", out.code);
    }

    #[test]
    fn test_arrow_in_operator_parenthesized() {
        let out = emit_str("(?? maybe-fn (fn [x] x))");
        assert!(out.code.contains("maybe_fn ?? ((x) => x)"), "{}", out.code);
    }

    #[test]
    fn test_helper_import_and_tracking() {
        let out = emit_str("(for [x (range 10)] (console.log x))");
        assert!(out.used_helpers.contains(&"range".to_string()));
        assert!(out.used_helpers.contains(&"toSequence".to_string()));
        assert!(
            out.code.starts_with("import { "),
            "helper import first: {}",
            out.code
        );
        assert!(out.code.contains("from \"./runtime.ts\""), "{}", out.code);
    }

    #[test]
    fn test_interop_get_two_path() {
        let out = emit_str("(.length s)");
        assert!(
            out.code
                .contains("((o) => typeof o.length === \"function\" ? o.length() : o.length)(s)"),
            "{}",
            out.code
        );
    }

    #[test]
    fn test_interop_call_uses_dynamic_call() {
        let out = emit_str("(.slice xs 1 2)");
        assert!(out.code.contains("dynamicCall(xs, \"slice\", [1, 2]"), "{}", out.code);
        assert!(out.used_helpers.contains(&"dynamicCall".to_string()));
    }

    #[test]
    fn test_throw_in_expression_position() {
        let out = emit_str("(let x (?? y (throw (new Error \"missing\"))))");
        assert!(
            out.code.contains("(() => { throw new Error(\"missing\"); })()"),
            "{}",
            out.code
        );
    }

    #[test]
    fn test_template_literal() {
        let out = emit_str(r#"(let msg "hi ${name}!")"#);
        assert!(out.code.contains("`hi ${name}!`"), "{}", out.code);
    }

    #[test]
    fn test_class_emission() {
        let out = emit_str(
            "(class Point
               (field x 0)
               (constructor [x] (set! this.x x))
               (method show [] (console.log this.x)))",
        );
        assert!(out.code.contains("class Point {"), "{}", out.code);
        assert!(out.code.contains("x = 0;"), "{}", out.code);
        assert!(out.code.contains("constructor(x) {"), "{}", out.code);
        assert!(out.code.contains("show() {"), "{}", out.code);
    }

    #[test]
    fn test_plain_enum_freezes_object() {
        let out = emit_str("(enum Color Red Green)");
        assert!(
            out.code.contains("const Color = Object.freeze({ Red: \"Red\", Green: \"Green\" });"),
            "{}",
            out.code
        );
    }

    #[test]
    fn test_associated_enum_becomes_class_with_factories() {
        let out = emit_str("(enum Shape (Circle [radius]) (Rect [w h]))");
        assert!(out.code.contains("class Shape {"), "{}", out.code);
        assert!(out.code.contains("static Circle(radius: any): Shape {"), "{}", out.code);
        assert!(out.code.contains("new Shape(\"Circle\", { radius })"), "{}", out.code);
    }

    #[test]
    fn test_json_params_guard() {
        let out = emit_str("(fn config {host \"localhost\" port 8080} host)");
        assert!(out.code.contains("function config(options: any = {}): any {"), "{}", out.code);
        assert!(
            out.code.contains("if (typeof options !== \"object\" || options === null) {"),
            "{}",
            out.code
        );
        assert!(
            out.code.contains("const { host = \"localhost\", port = 8080 } = options;"),
            "{}",
            out.code
        );
    }

    #[test]
    fn test_import_export_emission() {
        let out = emit_str("(import [parse, run as exec] from \"./tool.quill\") (export [parse])");
        assert!(
            out.code.contains("import { parse, run as exec } from \"./tool.ts\";"),
            "{}",
            out.code
        );
        assert!(out.code.contains("export { parse };"), "{}", out.code);
    }

    #[test]
    fn test_export_binding() {
        let out = emit_str("(export \"answer\" 42)");
        assert!(out.code.contains("export const answer = 42;"), "{}", out.code);
    }

    #[test]
    fn test_self_tco_emits_loop() {
        let out = emit_str("(fn sum [n acc] (if (= n 0) acc (sum (- n 1) (+ acc n))))");
        assert!(out.code.contains("while (true) {"), "{}", out.code);
        assert!(out.code.contains("[n, acc] = [n - 1, acc + n];"), "{}", out.code);
        assert!(out.code.contains("continue;"), "{}", out.code);
    }

    #[test]
    fn test_mutual_tco_emits_thunks_and_trampoline() {
        let out = emit_str(
            "(fn is-even [n] (if (= n 0) true (is-odd (- n 1))))
             (fn is-odd [n] (if (= n 0) false (is-even (- n 1))))
             (is-even 10000)",
        );
        assert!(out.code.contains("() => is_odd(n - 1)"), "{}", out.code);
        assert!(out.code.contains("trampoline(() => is_even(10000))"), "{}", out.code);
        assert!(out.used_helpers.contains(&"trampoline".to_string()));
    }

    #[test]
    fn test_renamed_identifier_keeps_original_in_map(){
        let out = emit_str("(fn my-fn [] 1) (my-fn)");
        assert!(out.code.contains("function my_fn"), "{}", out.code);
        assert!(out.map_json.contains("my-fn"), "{}", out.map_json);
    }

    #[test]
    fn test_mappings_cover_identifiers() {
        let out = emit_str("(let answer 42)");
        assert!(!out.mappings.is_empty());
        assert!(out.map_json.contains("\"version\":3"));
        assert!(out.map_json.contains("test.quill"));
    }

    #[test]
    fn test_raw_node_is_codegen_error() {
        use crate::ast::Position;
        let module = IrModule {
            body: vec![IrNode::new(IrKind::Raw("junk".into()), Position::synthetic())],
            exports: Vec::new(),
        };
        let options = CompilerOptions::default();
        let err = emit_module(&module, "x.quill", "x.ts", &options).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INTERNAL);
        assert!(err.to_string().contains("Raw"));
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        let out = emit_str("(?? (?. user name) \"anon\")");
        assert!(out.code.contains("user?.name ?? \"anon\""), "{}", out.code);
    }

    #[test]
    fn test_sequence_comma_operator() {
        let out = emit_str("(let y (do (set! a 1) a))");
        assert!(out.code.contains("y = (a = 1, a);"), "{}", out.code);
    }
}
